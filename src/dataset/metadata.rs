//! Loading, validation and filtering of `pix3d.json` metadata.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MetadataError;

use super::{CATEGORIES, DEFAULT_DROP_IMAGES};

/// One image/object record from `pix3d.json`.
///
/// Only the fields the pipeline consumes are modeled explicitly; the
/// remaining upstream fields (keypoints, voxels, occlusion flags, ...) are
/// preserved in `extra` so records round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pix3dRecord {
    /// Image path relative to the dataset root, e.g. `img/chair/0001.jpg`.
    pub img: String,
    /// Object category, one of [`CATEGORIES`].
    pub category: String,
    /// Image size as `[width, height]`.
    pub img_size: [u32; 2],
    /// Bounding box as `[x0, y0, x1, y1]`.
    pub bbox: [f64; 4],
    /// Segmentation mask path relative to the dataset root.
    pub mask: String,
    /// 3D model path relative to the dataset root, e.g. `model/chair/.../model.obj`.
    pub model: String,
    /// Object rotation, a 3x3 matrix.
    pub rot_mat: [[f64; 3]; 3],
    /// Object translation, a 3-vector.
    pub trans_mat: [f64; 3],
    /// Camera focal length in millimeters.
    pub focal_length: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Filtering options applied after validation.
#[derive(Debug, Clone)]
pub struct MetadataOptions {
    /// Image paths to drop.
    pub drop_images: Vec<String>,
    /// Keep only records whose image fits within `(width, height)`.
    pub max_image_size: Option<(u32, u32)>,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            drop_images: DEFAULT_DROP_IMAGES.iter().map(|s| s.to_string()).collect(),
            max_image_size: None,
        }
    }
}

/// The full parsed metadata array.
#[derive(Debug, Clone)]
pub struct Pix3dMetadata {
    pub records: Vec<Pix3dRecord>,
}

impl Pix3dMetadata {
    /// Load metadata from a `pix3d.json` file without validation.
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        if !path.is_file() {
            return Err(MetadataError::NotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let records: Vec<Pix3dRecord> = serde_json::from_reader(std::io::BufReader::new(file))?;
        debug!(path = %path.display(), records = records.len(), "metadata parsed");
        Ok(Self { records })
    }

    /// Load, validate and filter metadata in one step.
    pub fn load_with(path: &Path, options: &MetadataOptions) -> Result<Self, MetadataError> {
        let metadata = Self::load(path)?;
        metadata.validate()?;
        let filtered = metadata.filter(options);
        info!(
            path = %path.display(),
            records = filtered.len(),
            categories = filtered.category_counts().len(),
            "metadata loaded"
        );
        Ok(filtered)
    }

    /// Validate structural invariants of the metadata.
    ///
    /// Every image path must be unique, every bounding box ordered, and
    /// every category one of the nine known Pix3D categories.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let mut seen = HashSet::new();
        for record in &self.records {
            if !seen.insert(record.img.as_str()) {
                return Err(MetadataError::DuplicateImage(record.img.clone()));
            }
            let [x0, y0, x1, y1] = record.bbox;
            if x0 > x1 || y0 > y1 {
                return Err(MetadataError::InvalidBbox {
                    img: record.img.clone(),
                    x0,
                    y0,
                    x1,
                    y1,
                });
            }
            if !CATEGORIES.contains(&record.category.as_str()) {
                return Err(MetadataError::UnknownCategory {
                    category: record.category.clone(),
                    img: record.img.clone(),
                });
            }
        }
        Ok(())
    }

    /// Apply the drop-list and maximum image size filters.
    pub fn filter(self, options: &MetadataOptions) -> Self {
        let before = self.records.len();
        let records: Vec<Pix3dRecord> = self
            .records
            .into_iter()
            .filter(|r| !options.drop_images.iter().any(|d| d == &r.img))
            .filter(|r| match options.max_image_size {
                Some((w, h)) => r.img_size[0] <= w && r.img_size[1] <= h,
                None => true,
            })
            .collect();
        if records.len() != before {
            debug!(dropped = before - records.len(), "metadata records filtered");
        }
        Self { records }
    }

    /// Number of records per category, sorted by category name.
    pub fn category_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Sorted, de-duplicated model paths referenced by the records.
    pub fn model_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .records
            .iter()
            .map(|r| r.model.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
