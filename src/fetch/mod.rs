//! Dependency acquisition for the render pipeline.
//!
//! Downloads the rendering engine distribution and the Pix3D dataset archive
//! over HTTP and extracts them to known filesystem locations. There is no
//! checksum verification and no retry: a failed download fails the run.

mod download;
mod extract;

pub use download::{archive_name_from_url, Downloader};
pub use extract::{extract_archive, ArchiveKind};
