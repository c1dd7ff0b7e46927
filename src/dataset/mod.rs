//! Pix3D dataset metadata.
//!
//! Models the records of the dataset's `pix3d.json` file and the validation
//! and filtering applied before preprocessing.

mod metadata;

pub use metadata::{MetadataOptions, Pix3dMetadata, Pix3dRecord};

/// The nine Pix3D object categories.
pub const CATEGORIES: [&str; 9] = [
    "bed", "bookcase", "chair", "desk", "misc", "sofa", "table", "tool", "wardrobe",
];

/// Image paths dropped by default (corrupt files in the upstream dataset).
pub const DEFAULT_DROP_IMAGES: [&str; 2] = ["img/table/1749.jpg", "img/table/0045.png"];
