//! viewforge: Pix3D render pipeline.
//!
//! This library provides the stages of a linear batch pipeline that fetches
//! a rendering engine and the Pix3D dataset, clusters camera viewpoints,
//! renders views headlessly, archives the output and publishes it as a
//! tagged release.

// Core modules
pub mod archive;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod preprocess;
pub mod publish;
pub mod render;

// Re-export commonly used error types
pub use error::{
    ArchiveError, FetchError, MetadataError, PreprocessError, PublishError, RenderError,
};
