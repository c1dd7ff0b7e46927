//! Error types for viewforge operations.
//!
//! Defines error types for the major pipeline subsystems:
//! - Dependency fetching and archive extraction
//! - Dataset metadata loading and validation
//! - Viewpoint preprocessing
//! - Headless engine rendering
//! - Output archiving
//! - Release publishing

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching and extracting dependencies.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to download {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Download of {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive entry '{0}' escapes the extraction directory")]
    UnsafeEntry(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading dataset metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata file not found: {0}")]
    NotFound(PathBuf),

    #[error("Duplicate image path in metadata: {0}")]
    DuplicateImage(String),

    #[error("Invalid bounding box for '{img}': [{x0}, {y0}, {x1}, {y1}]")]
    InvalidBbox {
        img: String,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    },

    #[error("Unknown category '{category}' for '{img}'")]
    UnknownCategory { category: String, img: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during viewpoint preprocessing.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("No records available for clustering")]
    NoRecords,

    #[error("Invalid rotation matrix for '{img}': {reason}")]
    InvalidRotation { img: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while running the rendering engine.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Engine binary not found at {0}")]
    EngineNotFound(PathBuf),

    #[error("Render script not found at {0}")]
    ScriptNotFound(PathBuf),

    #[error("Invalid render mode '{0}': must be 'synthetic-views' or 'ground-truth-views'")]
    InvalidMode(String),

    #[error("Failed to spawn engine: {0}")]
    SpawnFailed(String),

    #[error("Engine exited with code {code}: {stderr}")]
    EngineFailed { code: i32, stderr: String },

    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while archiving render output.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Output directory not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while publishing a release.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Missing release token")]
    MissingToken,

    #[error("Invalid commit identifier: {0}")]
    InvalidCommit(String),

    #[error("Release '{0}' already exists")]
    ReleaseExists(String),

    #[error("Release API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
