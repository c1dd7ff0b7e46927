//! Pipeline orchestrator.
//!
//! Runs the six stages strictly in order, records a per-stage report and
//! aborts remaining stages on the first failure.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::archive::pack_dir;
use crate::dataset::{MetadataOptions, Pix3dMetadata};
use crate::error::{
    ArchiveError, FetchError, MetadataError, PreprocessError, PublishError, RenderError,
};
use crate::fetch::Downloader;
use crate::preprocess::{cluster_viewpoints, write_viewpoints, PreprocessOptions};
use crate::publish::{PublishConfig, ReleasePublisher};
use crate::render::{BlenderEngine, RenderEngine, RenderJob};

use super::config::{ConfigError, PipelineConfig};

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fetch error.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Metadata error.
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Preprocess error.
    #[error("Preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),

    /// Render error.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Archive error.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Publish error.
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Metadata,
    Preprocess,
    Render,
    Archive,
    Publish,
}

impl Stage {
    /// All stages, in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Fetch,
        Stage::Metadata,
        Stage::Preprocess,
        Stage::Render,
        Stage::Archive,
        Stage::Publish,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Metadata => write!(f, "metadata"),
            Stage::Preprocess => write!(f, "preprocess"),
            Stage::Render => write!(f, "render"),
            Stage::Archive => write!(f, "archive"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

/// Status of a stage execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage completed successfully.
    Completed,
    /// Stage failed with an error.
    Failed,
    /// Stage did not run (earlier failure or disabled by configuration).
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of a single stage.
#[derive(Debug)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub duration: Duration,
    pub error: Option<String>,
}

impl StageReport {
    fn completed(stage: Stage, duration: Duration) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            duration,
            error: None,
        }
    }

    fn failed(stage: Stage, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            duration,
            error: Some(error.into()),
        }
    }

    fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Aggregate statistics about a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total_duration: Duration,
}

impl PipelineStats {
    fn record(&mut self, report: &StageReport) {
        match report.status {
            StageStatus::Completed => self.completed += 1,
            StageStatus::Failed => self.failed += 1,
            StageStatus::Skipped => self.skipped += 1,
        }
        self.total_duration += report.duration;
    }
}

/// Result of a pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub reports: Vec<StageReport>,
    pub stats: PipelineStats,
}

impl PipelineRun {
    /// A run succeeded when no stage failed.
    pub fn succeeded(&self) -> bool {
        self.stats.failed == 0
    }

    /// The error of the first failed stage, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.reports
            .iter()
            .find(|r| r.status == StageStatus::Failed)
            .and_then(|r| r.error.as_deref())
    }
}

/// The main pipeline coordinator.
///
/// Holds the loaded metadata between the metadata and preprocess stages;
/// every other hand-off between stages goes through the filesystem, exactly
/// as the stages do when invoked individually.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    engine: Box<dyn RenderEngine>,
    metadata: Option<Pix3dMetadata>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator with the Blender engine adapter.
    pub fn new(config: PipelineConfig) -> Self {
        let engine = Box::new(BlenderEngine::new(
            config.engine_binary.clone(),
            config.render_script.clone(),
        ));
        Self {
            config,
            engine,
            metadata: None,
        }
    }

    /// Creates an orchestrator with a custom engine adapter.
    pub fn with_engine(config: PipelineConfig, engine: Box<dyn RenderEngine>) -> Self {
        Self {
            config,
            engine,
            metadata: None,
        }
    }

    /// Runs all stages in order, failing fast.
    ///
    /// Returns the run report; use [`PipelineRun::succeeded`] to check the
    /// outcome.
    pub async fn run(&mut self) -> PipelineRun {
        let run_id = format!("run-{}", Uuid::new_v4());
        let started_at = Utc::now();
        info!(run_id, "starting pipeline");

        let mut reports = Vec::with_capacity(Stage::ALL.len());
        let mut stats = PipelineStats::default();
        let mut aborted = false;

        for stage in Stage::ALL {
            if aborted {
                let report = StageReport::skipped(stage);
                stats.record(&report);
                reports.push(report);
                continue;
            }

            if stage == Stage::Fetch && self.config.skip_fetch {
                info!(%stage, "stage disabled by configuration");
                let report = StageReport::skipped(stage);
                stats.record(&report);
                reports.push(report);
                continue;
            }
            if stage == Stage::Publish && !self.config.publish {
                info!(%stage, "stage disabled by configuration");
                let report = StageReport::skipped(stage);
                stats.record(&report);
                reports.push(report);
                continue;
            }

            info!(%stage, "starting stage");
            let start = Instant::now();
            let report = match self.execute(stage).await {
                Ok(()) => {
                    let duration = start.elapsed();
                    info!(%stage, ?duration, "stage complete");
                    StageReport::completed(stage, duration)
                }
                Err(e) => {
                    error!(%stage, error = %e, "stage failed, aborting pipeline");
                    aborted = true;
                    StageReport::failed(stage, start.elapsed(), e.to_string())
                }
            };
            stats.record(&report);
            reports.push(report);
        }

        info!(
            run_id,
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            "pipeline finished"
        );
        PipelineRun {
            run_id,
            started_at,
            reports,
            stats,
        }
    }

    async fn execute(&mut self, stage: Stage) -> Result<(), PipelineError> {
        match stage {
            Stage::Fetch => self.fetch().await,
            Stage::Metadata => self.load_metadata(),
            Stage::Preprocess => self.preprocess(),
            Stage::Render => self.render().await,
            Stage::Archive => self.archive(),
            Stage::Publish => self.publish().await,
        }
    }

    async fn fetch(&self) -> Result<(), PipelineError> {
        let downloader = Downloader::new();
        // The engine distribution nests everything under a versioned top
        // directory; the dataset archive layout is preserved.
        downloader
            .fetch_archive(&self.config.engine_url, &self.config.engine_dir, 1)
            .await?;
        downloader
            .fetch_archive(&self.config.dataset_url, &self.config.dataset_dir, 0)
            .await?;
        Ok(())
    }

    fn load_metadata(&mut self) -> Result<(), PipelineError> {
        let options = MetadataOptions {
            drop_images: self.config.drop_images.clone(),
            max_image_size: self.config.max_image_size,
        };
        let metadata = Pix3dMetadata::load_with(&self.config.metadata_path, &options)?;
        self.metadata = Some(metadata);
        Ok(())
    }

    fn preprocess(&self) -> Result<(), PipelineError> {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| PipelineError::Internal("metadata stage did not run".to_string()))?;
        let options = PreprocessOptions {
            num_views: self.config.num_views,
            seed: self.config.seed,
        };
        let viewpoints = cluster_viewpoints(metadata, &options).map_err(PipelineError::from)?;
        write_viewpoints(&self.config.viewpoints_path, &viewpoints)
            .map_err(PipelineError::from)?;
        Ok(())
    }

    async fn render(&self) -> Result<(), PipelineError> {
        let job = RenderJob {
            metadata_path: self.config.metadata_path.clone(),
            output_dir: self.config.render_output_dir.clone(),
            viewpoints_path: self.config.viewpoints_path.clone(),
            mode: self.config.render_mode,
            seed: self.config.seed,
            timeout: self.config.engine_timeout,
        };
        let outcome = self.engine.render(&job).await?;
        info!(
            exit_code = outcome.exit_code,
            duration = ?outcome.duration,
            "engine run complete"
        );
        Ok(())
    }

    fn archive(&self) -> Result<(), PipelineError> {
        let summary = pack_dir(&self.config.render_output_dir, &self.config.archive_path)?;
        info!(entries = summary.entries, bytes = summary.bytes, "render output archived");
        Ok(())
    }

    async fn publish(&self) -> Result<(), PipelineError> {
        let token = self
            .config
            .github_token
            .clone()
            .ok_or(PublishError::MissingToken)?;
        let publisher = ReleasePublisher::new(PublishConfig {
            repo: self.config.github_repo.clone(),
            token,
            commit_sha: self.config.commit_sha.clone(),
        });
        let release = publisher.publish(&self.config.archive_path).await?;
        info!(tag = release.tag, url = release.url, "release published");
        Ok(())
    }
}
