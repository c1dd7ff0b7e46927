//! Viewpoint preprocessing.
//!
//! Groups dataset records by category, converts object rotations to unit
//! quaternions and clusters them to a small set of representative camera
//! viewpoints per category. The result is written as
//! `pix3d_clustered_viewpoints.json`, the file the render script consumes:
//! a map from category name to parallel `rot_mat`, `trans_vec` and `quat`
//! arrays.

pub mod cluster;

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{arr1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{MetadataOptions, Pix3dMetadata, Pix3dRecord};
use crate::error::PreprocessError;

use self::cluster::{nearest_row, KMeans};

/// Clustered viewpoints for one category. The three arrays are parallel:
/// entry `k` describes the k-th representative viewpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryViewpoints {
    pub rot_mat: Vec<[[f64; 3]; 3]>,
    pub trans_vec: Vec<[f64; 3]>,
    pub quat: Vec<[f64; 4]>,
}

/// Viewpoints keyed by category name, in deterministic order.
pub type ViewpointsByCategory = BTreeMap<String, CategoryViewpoints>;

/// Preprocessing options.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    /// Number of representative viewpoints per category (clamped to the
    /// number of records in the category).
    pub num_views: usize,
    /// Seed for the clustering initialization.
    pub seed: u64,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            num_views: 16,
            seed: 42,
        }
    }
}

/// Summary of a preprocessing run.
#[derive(Debug)]
pub struct PreprocessSummary {
    pub records: usize,
    pub categories: usize,
}

/// Convert a rotation matrix to a normalized quaternion `[w, x, y, z]`.
///
/// The sign is canonicalized so `w >= 0`, which keeps antipodal
/// representations of the same rotation from landing in separate clusters.
pub fn quaternion_from_rotation(m: &[[f64; 3]; 3]) -> [f64; 4] {
    let trace = m[0][0] + m[1][1] + m[2][2];

    let (w, x, y, z) = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        (
            s / 4.0,
            (m[2][1] - m[1][2]) / s,
            (m[0][2] - m[2][0]) / s,
            (m[1][0] - m[0][1]) / s,
        )
    } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
        let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
        (
            (m[2][1] - m[1][2]) / s,
            s / 4.0,
            (m[0][1] + m[1][0]) / s,
            (m[0][2] + m[2][0]) / s,
        )
    } else if m[1][1] > m[2][2] {
        let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
        (
            (m[0][2] - m[2][0]) / s,
            (m[0][1] + m[1][0]) / s,
            s / 4.0,
            (m[1][2] + m[2][1]) / s,
        )
    } else {
        let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
        (
            (m[1][0] - m[0][1]) / s,
            (m[0][2] + m[2][0]) / s,
            (m[1][2] + m[2][1]) / s,
            s / 4.0,
        )
    };

    let norm = (w * w + x * x + y * y + z * z).sqrt();
    let sign = if w < 0.0 { -1.0 } else { 1.0 };
    [
        sign * w / norm,
        sign * x / norm,
        sign * y / norm,
        sign * z / norm,
    ]
}

fn rotation_determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn validated_quaternion(record: &Pix3dRecord) -> Result<[f64; 4], PreprocessError> {
    let det = rotation_determinant(&record.rot_mat);
    if !det.is_finite() || (det - 1.0).abs() > 1e-2 {
        return Err(PreprocessError::InvalidRotation {
            img: record.img.clone(),
            reason: format!("determinant {det:.4}"),
        });
    }
    Ok(quaternion_from_rotation(&record.rot_mat))
}

/// Cluster the viewpoints of every category present in the metadata.
///
/// Each cluster is represented by the real record nearest its centroid, so
/// the emitted rotation matrices remain valid rotations.
pub fn cluster_viewpoints(
    metadata: &Pix3dMetadata,
    options: &PreprocessOptions,
) -> Result<ViewpointsByCategory, PreprocessError> {
    if metadata.is_empty() {
        return Err(PreprocessError::NoRecords);
    }

    let mut groups: BTreeMap<&str, Vec<&Pix3dRecord>> = BTreeMap::new();
    for record in &metadata.records {
        groups.entry(record.category.as_str()).or_default().push(record);
    }

    let mut viewpoints = ViewpointsByCategory::new();
    for (category, records) in groups {
        let mut quats = Array2::zeros((records.len(), 4));
        for (i, record) in records.iter().enumerate() {
            let q = validated_quaternion(record)?;
            quats.row_mut(i).assign(&arr1(&q));
        }

        let result = KMeans::new(options.num_views, options.seed).fit(&quats);

        let mut category_views = CategoryViewpoints {
            rot_mat: Vec::with_capacity(result.centroids.nrows()),
            trans_vec: Vec::with_capacity(result.centroids.nrows()),
            quat: Vec::with_capacity(result.centroids.nrows()),
        };
        for centroid in result.centroids.rows() {
            let idx = nearest_row(centroid, &quats);
            let representative = records[idx];
            category_views.rot_mat.push(representative.rot_mat);
            category_views.trans_vec.push(representative.trans_mat);
            category_views
                .quat
                .push(quaternion_from_rotation(&representative.rot_mat));
        }

        debug!(
            category,
            records = records.len(),
            views = category_views.rot_mat.len(),
            "viewpoints clustered"
        );
        viewpoints.insert(category.to_string(), category_views);
    }

    Ok(viewpoints)
}

/// Write clustered viewpoints as pretty-printed JSON.
pub fn write_viewpoints(
    path: &Path,
    viewpoints: &ViewpointsByCategory,
) -> Result<(), PreprocessError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), viewpoints)?;
    Ok(())
}

/// Run the full preprocessing stage: load and validate metadata, cluster
/// viewpoints and write the viewpoints file.
pub fn run(
    metadata_path: &Path,
    viewpoints_path: &Path,
    metadata_options: &MetadataOptions,
    options: &PreprocessOptions,
) -> Result<PreprocessSummary, PreprocessError> {
    let metadata = Pix3dMetadata::load_with(metadata_path, metadata_options)?;
    let viewpoints = cluster_viewpoints(&metadata, options)?;
    write_viewpoints(viewpoints_path, &viewpoints)?;

    info!(
        viewpoints = %viewpoints_path.display(),
        categories = viewpoints.len(),
        records = metadata.len(),
        "preprocessing complete"
    );
    Ok(PreprocessSummary {
        records: metadata.len(),
        categories: viewpoints.len(),
    })
}
