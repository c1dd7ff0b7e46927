//! Pipeline orchestration for the render workflow.
//!
//! The pipeline consists of six stages executed strictly in order:
//!
//! 1. **Fetch**: download and extract the rendering engine and the dataset
//! 2. **Metadata**: load, validate and filter the dataset metadata
//! 3. **Preprocess**: cluster camera viewpoints per category
//! 4. **Render**: run the engine headlessly over the clustered viewpoints
//! 5. **Archive**: pack the render output into an uncompressed tar
//! 6. **Publish**: create a tagged release with the archive attached
//!
//! Any stage failure aborts the remaining stages; there is no retry, no
//! partial-failure recovery and no parallelism across stages.

pub mod config;
pub mod orchestrator;

// Re-export main types for convenience
pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{
    PipelineError, PipelineOrchestrator, PipelineRun, PipelineStats, Stage, StageReport,
    StageStatus,
};
