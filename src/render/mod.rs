//! Headless engine invocation for view rendering.
//!
//! The rendering engine (Blender plus the repo's render script) is an
//! external collaborator: this module owns building the invocation, running
//! it with a timeout and capturing its output, not the rendering itself.

use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::RenderError;

/// The render mode selected for a run.
///
/// Exactly one of the two mode flags is always passed to the render script;
/// there is no other mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Render synthetic views from the clustered viewpoints.
    #[default]
    SyntheticViews,
    /// Render views from the ground-truth camera poses.
    GroundTruthViews,
}

impl RenderMode {
    /// The command-line flag passed to the render script.
    pub fn flag(&self) -> &'static str {
        match self {
            RenderMode::SyntheticViews => "--render-synthetic-views",
            RenderMode::GroundTruthViews => "--render-ground-truth-views",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::SyntheticViews => "synthetic-views",
            RenderMode::GroundTruthViews => "ground-truth-views",
        }
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderMode {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synthetic-views" | "synthetic" => Ok(RenderMode::SyntheticViews),
            "ground-truth-views" | "ground-truth" => Ok(RenderMode::GroundTruthViews),
            other => Err(RenderError::InvalidMode(other.to_string())),
        }
    }
}

/// One render invocation.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub metadata_path: PathBuf,
    pub output_dir: PathBuf,
    pub viewpoints_path: PathBuf,
    pub mode: RenderMode,
    pub seed: u64,
    pub timeout: Duration,
}

/// Captured result of a completed render run.
#[derive(Debug)]
pub struct RenderOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Adapter over the external rendering engine.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Build the program and arguments for a job without running anything.
    fn invocation(&self, job: &RenderJob) -> (PathBuf, Vec<String>);

    /// Run the engine headlessly for the given job.
    async fn render(&self, job: &RenderJob) -> Result<RenderOutcome, RenderError>;

    /// Whether the engine binary responds on this machine.
    async fn is_available(&self) -> bool;
}

/// Blender invoked in background mode with the render script.
pub struct BlenderEngine {
    binary: PathBuf,
    script: PathBuf,
}

impl BlenderEngine {
    pub fn new(binary: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            script: script.into(),
        }
    }
}

#[async_trait]
impl RenderEngine for BlenderEngine {
    fn invocation(&self, job: &RenderJob) -> (PathBuf, Vec<String>) {
        let args = vec![
            "-noaudio".to_string(),
            "--background".to_string(),
            "--python".to_string(),
            self.script.display().to_string(),
            "--".to_string(),
            "--input-path".to_string(),
            job.metadata_path.display().to_string(),
            "--output-path".to_string(),
            job.output_dir.display().to_string(),
            "--viewpoints-path".to_string(),
            job.viewpoints_path.display().to_string(),
            "--seed".to_string(),
            job.seed.to_string(),
            job.mode.flag().to_string(),
        ];
        (self.binary.clone(), args)
    }

    async fn render(&self, job: &RenderJob) -> Result<RenderOutcome, RenderError> {
        if !self.binary.is_file() {
            return Err(RenderError::EngineNotFound(self.binary.clone()));
        }
        if !self.script.is_file() {
            return Err(RenderError::ScriptNotFound(self.script.clone()));
        }
        std::fs::create_dir_all(&job.output_dir)?;

        let (program, args) = self.invocation(job);
        debug!(program = %program.display(), ?args, "engine invocation");

        let mut cmd = Command::new(&program);
        cmd.args(&args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        info!(
            engine = %program.display(),
            mode = %job.mode,
            output = %job.output_dir.display(),
            "starting render"
        );

        let start = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| RenderError::SpawnFailed(e.to_string()))?;

        let timeout_result = tokio::time::timeout(job.timeout, child.wait_with_output()).await;
        let duration = start.elapsed();

        match timeout_result {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();

                if !output.status.success() {
                    return Err(RenderError::EngineFailed {
                        code: exit_code,
                        stderr,
                    });
                }

                info!(exit_code, ?duration, "render complete");
                Ok(RenderOutcome {
                    exit_code,
                    stdout,
                    stderr,
                    duration,
                })
            }
            Ok(Err(e)) => Err(RenderError::Io(e)),
            Err(_) => Err(RenderError::Timeout(job.timeout)),
        }
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job(mode: RenderMode) -> RenderJob {
        RenderJob {
            metadata_path: PathBuf::from("/data/pix3d/pix3d.json"),
            output_dir: PathBuf::from("/data/pix3d_renders"),
            viewpoints_path: PathBuf::from("/data/pix3d/pix3d_clustered_viewpoints.json"),
            mode,
            seed: 42,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_mode_flags_are_exclusive() {
        assert_eq!(RenderMode::SyntheticViews.flag(), "--render-synthetic-views");
        assert_eq!(
            RenderMode::GroundTruthViews.flag(),
            "--render-ground-truth-views"
        );
        assert_ne!(
            RenderMode::SyntheticViews.flag(),
            RenderMode::GroundTruthViews.flag()
        );
    }

    #[test]
    fn test_mode_parse_roundtrip() {
        assert_eq!(
            "synthetic-views".parse::<RenderMode>().unwrap(),
            RenderMode::SyntheticViews
        );
        assert_eq!(
            "ground-truth-views".parse::<RenderMode>().unwrap(),
            RenderMode::GroundTruthViews
        );
        assert_eq!(
            RenderMode::SyntheticViews.as_str().parse::<RenderMode>().unwrap(),
            RenderMode::SyntheticViews
        );
        assert!(matches!(
            "depth".parse::<RenderMode>(),
            Err(RenderError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_invocation_arguments() {
        let engine = BlenderEngine::new("/opt/engine/blender", "render_pix3d.py");
        let (program, args) = engine.invocation(&test_job(RenderMode::SyntheticViews));

        assert_eq!(program, PathBuf::from("/opt/engine/blender"));
        assert_eq!(
            args,
            vec![
                "-noaudio",
                "--background",
                "--python",
                "render_pix3d.py",
                "--",
                "--input-path",
                "/data/pix3d/pix3d.json",
                "--output-path",
                "/data/pix3d_renders",
                "--viewpoints-path",
                "/data/pix3d/pix3d_clustered_viewpoints.json",
                "--seed",
                "42",
                "--render-synthetic-views",
            ]
        );
    }

    #[test]
    fn test_invocation_ground_truth_mode() {
        let engine = BlenderEngine::new("/opt/engine/blender", "render_pix3d.py");
        let (_, args) = engine.invocation(&test_job(RenderMode::GroundTruthViews));
        assert_eq!(args.last().map(String::as_str), Some("--render-ground-truth-views"));
        assert!(!args.iter().any(|a| a == "--render-synthetic-views"));
    }

    #[tokio::test]
    async fn test_render_missing_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = BlenderEngine::new(dir.path().join("missing"), dir.path().join("script.py"));
        let result = engine.render(&test_job(RenderMode::SyntheticViews)).await;
        assert!(matches!(result, Err(RenderError::EngineNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_render_runs_engine_process() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("render_pix3d.py");
        std::fs::write(&script, "# stub").unwrap();

        // /bin/true accepts and ignores the blender-style arguments.
        let engine = BlenderEngine::new("/bin/true", &script);
        let mut job = test_job(RenderMode::SyntheticViews);
        job.output_dir = dir.path().join("renders");

        let outcome = engine.render(&job).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(job.output_dir.is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_render_surfaces_engine_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("render_pix3d.py");
        std::fs::write(&script, "# stub").unwrap();

        let engine = BlenderEngine::new("/bin/false", &script);
        let mut job = test_job(RenderMode::SyntheticViews);
        job.output_dir = dir.path().join("renders");

        let result = engine.render(&job).await;
        assert!(matches!(result, Err(RenderError::EngineFailed { .. })));
    }
}
