//! CLI command definitions for viewforge.
//!
//! The `run` command executes the whole pipeline; the remaining commands
//! expose each stage individually with the same configuration surface.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use crate::archive::pack_dir;
use crate::dataset::MetadataOptions;
use crate::fetch::Downloader;
use crate::pipeline::{PipelineConfig, PipelineOrchestrator};
use crate::preprocess::{self, PreprocessOptions};
use crate::publish::{PublishConfig, ReleasePublisher};
use crate::render::{BlenderEngine, RenderEngine, RenderJob, RenderMode};

/// Default number of clustered viewpoints per category.
const DEFAULT_NUM_VIEWS: &str = "16";

/// Default seed shared by clustering and the render script.
const DEFAULT_SEED: &str = "42";

/// Default engine timeout in seconds.
const DEFAULT_ENGINE_TIMEOUT_SECS: &str = "21600";

/// Pix3D render pipeline.
#[derive(Parser)]
#[command(name = "viewforge")]
#[command(about = "Fetch, preprocess, render and publish Pix3D synthetic views")]
#[command(version)]
#[command(
    long_about = "viewforge runs a linear batch pipeline: it downloads a rendering engine \
and the Pix3D dataset, clusters camera viewpoints per category, renders views headlessly, \
packs the output into a tar archive and publishes it as a tagged release.\n\nExample usage:\n  \
viewforge run --engine-url https://example.org/blender.tar.gz --no-publish"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline: fetch, preprocess, render, archive, publish.
    Run(RunArgs),

    /// Download and extract the rendering engine and the dataset.
    Fetch(FetchArgs),

    /// Cluster camera viewpoints and write the viewpoints file.
    #[command(alias = "prep")]
    Preprocess(PreprocessArgs),

    /// Run the rendering engine headlessly over the clustered viewpoints.
    Render(RenderArgs),

    /// Pack the render output directory into an uncompressed tar archive.
    Archive(ArchiveArgs),

    /// Create a tagged release and upload the archive as its asset.
    Publish(PublishArgs),
}

/// Arguments for `viewforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Rendering engine archive URL (tar/tar.gz/zip).
    #[arg(long, env = "VIEWFORGE_ENGINE_URL")]
    pub engine_url: Option<String>,

    /// Dataset archive URL.
    #[arg(long, env = "VIEWFORGE_DATASET_URL", default_value = crate::pipeline::config::DEFAULT_DATASET_URL)]
    pub dataset_url: String,

    /// Directory the engine is extracted into.
    #[arg(long, default_value = "./engine")]
    pub engine_dir: PathBuf,

    /// Directory the dataset is extracted into.
    #[arg(long, default_value = "./pix3d")]
    pub dataset_dir: PathBuf,

    /// Skip the fetch stage (engine and dataset already on disk).
    #[arg(long)]
    pub skip_fetch: bool,

    /// Dataset metadata file.
    #[arg(short = 'i', long, default_value = "./pix3d/pix3d.json")]
    pub metadata: PathBuf,

    /// Clustered viewpoints file.
    #[arg(long, default_value = "./pix3d/pix3d_clustered_viewpoints.json")]
    pub viewpoints_path: PathBuf,

    /// Clustered viewpoints per category.
    #[arg(long, default_value = DEFAULT_NUM_VIEWS)]
    pub num_views: usize,

    /// Seed for clustering and the render script.
    #[arg(long, default_value = DEFAULT_SEED)]
    pub seed: u64,

    /// Engine binary path.
    #[arg(long, default_value = "./engine/blender")]
    pub engine_binary: PathBuf,

    /// Render script passed to the engine.
    #[arg(long, default_value = "./render_pix3d.py")]
    pub render_script: PathBuf,

    /// Render mode: synthetic-views or ground-truth-views.
    #[arg(long, default_value = "synthetic-views")]
    pub mode: String,

    /// Render output directory.
    #[arg(short = 'o', long, default_value = "./pix3d_renders")]
    pub output: PathBuf,

    /// Engine timeout in seconds.
    #[arg(long, default_value = DEFAULT_ENGINE_TIMEOUT_SECS)]
    pub engine_timeout_secs: u64,

    /// Output archive path.
    #[arg(long, default_value = "./pix3d_renders.tar")]
    pub archive: PathBuf,

    /// Keep only records whose image fits within WIDTHxHEIGHT.
    #[arg(long)]
    pub max_image_size: Option<String>,

    /// Skip the publish stage.
    #[arg(long)]
    pub no_publish: bool,

    /// Repository the release is created in (owner/name).
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repo: Option<String>,

    /// Release API token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Commit identifier keying the release tag.
    #[arg(long, env = "GITHUB_SHA")]
    pub sha: Option<String>,
}

/// Arguments for `viewforge fetch`.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Rendering engine archive URL (tar/tar.gz/zip).
    #[arg(long, env = "VIEWFORGE_ENGINE_URL")]
    pub engine_url: String,

    /// Dataset archive URL.
    #[arg(long, env = "VIEWFORGE_DATASET_URL", default_value = crate::pipeline::config::DEFAULT_DATASET_URL)]
    pub dataset_url: String,

    /// Directory the engine is extracted into.
    #[arg(long, default_value = "./engine")]
    pub engine_dir: PathBuf,

    /// Directory the dataset is extracted into.
    #[arg(long, default_value = "./pix3d")]
    pub dataset_dir: PathBuf,
}

/// Arguments for `viewforge preprocess`.
#[derive(Parser, Debug)]
pub struct PreprocessArgs {
    /// Dataset metadata file.
    #[arg(short = 'i', long, default_value = "./pix3d/pix3d.json")]
    pub metadata: PathBuf,

    /// Clustered viewpoints output file.
    #[arg(long, default_value = "./pix3d/pix3d_clustered_viewpoints.json")]
    pub viewpoints_path: PathBuf,

    /// Clustered viewpoints per category.
    #[arg(long, default_value = DEFAULT_NUM_VIEWS)]
    pub num_views: usize,

    /// Clustering seed.
    #[arg(long, default_value = DEFAULT_SEED)]
    pub seed: u64,

    /// Keep only records whose image fits within WIDTHxHEIGHT.
    #[arg(long)]
    pub max_image_size: Option<String>,
}

/// Arguments for `viewforge render`.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Dataset metadata file.
    #[arg(short = 'i', long, default_value = "./pix3d/pix3d.json")]
    pub metadata: PathBuf,

    /// Render output directory.
    #[arg(short = 'o', long, default_value = "./pix3d_renders")]
    pub output: PathBuf,

    /// Clustered viewpoints file.
    #[arg(long, default_value = "./pix3d/pix3d_clustered_viewpoints.json")]
    pub viewpoints_path: PathBuf,

    /// Engine binary path.
    #[arg(long, default_value = "./engine/blender")]
    pub engine_binary: PathBuf,

    /// Render script passed to the engine.
    #[arg(long, default_value = "./render_pix3d.py")]
    pub render_script: PathBuf,

    /// Render mode: synthetic-views or ground-truth-views.
    #[arg(long, default_value = "synthetic-views")]
    pub mode: String,

    /// Seed passed to the render script.
    #[arg(long, default_value = DEFAULT_SEED)]
    pub seed: u64,

    /// Engine timeout in seconds.
    #[arg(long, default_value = DEFAULT_ENGINE_TIMEOUT_SECS)]
    pub engine_timeout_secs: u64,
}

/// Arguments for `viewforge archive`.
#[derive(Parser, Debug)]
pub struct ArchiveArgs {
    /// Render output directory to pack.
    #[arg(short = 'i', long, default_value = "./pix3d_renders")]
    pub input: PathBuf,

    /// Output archive path.
    #[arg(short = 'o', long, default_value = "./pix3d_renders.tar")]
    pub output: PathBuf,
}

/// Arguments for `viewforge publish`.
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Archive to upload.
    #[arg(long, default_value = "./pix3d_renders.tar")]
    pub archive: PathBuf,

    /// Repository the release is created in (owner/name).
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repo: String,

    /// Release API token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Commit identifier keying the release tag.
    #[arg(long, env = "GITHUB_SHA")]
    pub sha: String,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse and run the CLI.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run with already-parsed CLI arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Fetch(args) => run_fetch(args).await,
        Commands::Preprocess(args) => run_preprocess(args),
        Commands::Render(args) => run_render(args).await,
        Commands::Archive(args) => run_archive(args),
        Commands::Publish(args) => run_publish(args).await,
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let mode: RenderMode = args.mode.parse()?;

    let mut config = PipelineConfig::new()
        .with_engine_url(args.engine_url.unwrap_or_default())
        .with_dataset_url(args.dataset_url)
        .with_skip_fetch(args.skip_fetch)
        .with_metadata_path(args.metadata)
        .with_viewpoints_path(args.viewpoints_path)
        .with_num_views(args.num_views)
        .with_seed(args.seed)
        .with_engine_binary(args.engine_binary)
        .with_render_script(args.render_script)
        .with_render_mode(mode)
        .with_render_output_dir(args.output)
        .with_engine_timeout(Duration::from_secs(args.engine_timeout_secs))
        .with_archive_path(args.archive)
        .with_publish(!args.no_publish)
        .with_github_repo(args.repo.unwrap_or_default())
        .with_commit_sha(args.sha.unwrap_or_default());
    config.engine_dir = args.engine_dir;
    config.dataset_dir = args.dataset_dir;
    if let Some(token) = args.token {
        config = config.with_github_token(token);
    }
    if let Some(size) = args.max_image_size.as_deref() {
        config.max_image_size = Some(parse_max_image_size(size)?);
    }
    config.validate()?;

    let mut orchestrator = PipelineOrchestrator::new(config);
    let run = orchestrator.run().await;

    println!("pipeline {} ({})", run.run_id, run.started_at.to_rfc3339());
    for report in &run.reports {
        match &report.error {
            Some(error) => println!(
                "  {:<11} {:<10} {:>8.1}s  {}",
                report.stage.to_string(),
                report.status.to_string(),
                report.duration.as_secs_f64(),
                error
            ),
            None => println!(
                "  {:<11} {:<10} {:>8.1}s",
                report.stage.to_string(),
                report.status.to_string(),
                report.duration.as_secs_f64()
            ),
        }
    }

    if !run.succeeded() {
        bail!(
            "pipeline failed: {}",
            run.first_error().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn run_fetch(args: FetchArgs) -> anyhow::Result<()> {
    let downloader = Downloader::new();
    downloader
        .fetch_archive(&args.engine_url, &args.engine_dir, 1)
        .await
        .context("Failed to fetch the rendering engine")?;
    downloader
        .fetch_archive(&args.dataset_url, &args.dataset_dir, 0)
        .await
        .context("Failed to fetch the dataset")?;
    info!(
        engine_dir = %args.engine_dir.display(),
        dataset_dir = %args.dataset_dir.display(),
        "fetch complete"
    );
    Ok(())
}

fn run_preprocess(args: PreprocessArgs) -> anyhow::Result<()> {
    let mut metadata_options = MetadataOptions::default();
    if let Some(size) = args.max_image_size.as_deref() {
        metadata_options.max_image_size = Some(parse_max_image_size(size)?);
    }
    let options = PreprocessOptions {
        num_views: args.num_views,
        seed: args.seed,
    };

    let summary = preprocess::run(
        &args.metadata,
        &args.viewpoints_path,
        &metadata_options,
        &options,
    )?;
    println!(
        "clustered {} records into viewpoints for {} categories -> {}",
        summary.records,
        summary.categories,
        args.viewpoints_path.display()
    );
    Ok(())
}

async fn run_render(args: RenderArgs) -> anyhow::Result<()> {
    let mode: RenderMode = args.mode.parse()?;
    let engine = BlenderEngine::new(args.engine_binary, args.render_script);
    let job = RenderJob {
        metadata_path: args.metadata,
        output_dir: args.output.clone(),
        viewpoints_path: args.viewpoints_path,
        mode,
        seed: args.seed,
        timeout: Duration::from_secs(args.engine_timeout_secs),
    };

    let outcome = engine.render(&job).await?;
    println!(
        "render complete in {:.1}s -> {}",
        outcome.duration.as_secs_f64(),
        args.output.display()
    );
    Ok(())
}

fn run_archive(args: ArchiveArgs) -> anyhow::Result<()> {
    let summary = pack_dir(&args.input, &args.output)?;
    println!(
        "packed {} files ({} bytes) -> {}",
        summary.entries,
        summary.bytes,
        summary.path.display()
    );
    Ok(())
}

async fn run_publish(args: PublishArgs) -> anyhow::Result<()> {
    let publisher = ReleasePublisher::new(PublishConfig {
        repo: args.repo,
        token: args.token,
        commit_sha: args.sha,
    });
    let release = publisher.publish(&args.archive).await?;
    println!("published {} ({})", release.tag, release.url);
    println!("  asset: {} (sha256 {})", release.asset_name, release.sha256);
    Ok(())
}

/// Parse a `WIDTHxHEIGHT` string.
fn parse_max_image_size(value: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("invalid size '{value}': expected WIDTHxHEIGHT"))?;
    let width = w
        .trim()
        .parse()
        .with_context(|| format!("invalid width in '{value}'"))?;
    let height = h
        .trim()
        .parse()
        .with_context(|| format!("invalid height in '{value}'"))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_image_size() {
        assert_eq!(parse_max_image_size("640x480").unwrap(), (640, 480));
        assert_eq!(parse_max_image_size("1920X1080").unwrap(), (1920, 1080));
        assert!(parse_max_image_size("640").is_err());
        assert!(parse_max_image_size("wxh").is_err());
    }

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::try_parse_from([
            "viewforge",
            "run",
            "--engine-url",
            "https://example.org/engine.tar.gz",
            "--no-publish",
            "--mode",
            "ground-truth-views",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(
                    args.engine_url.as_deref(),
                    Some("https://example.org/engine.tar.gz")
                );
                assert!(args.no_publish);
                assert_eq!(args.mode, "ground-truth-views");
                assert_eq!(args.num_views, 16);
                assert_eq!(args.seed, 42);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_parses_archive_command() {
        let cli = Cli::try_parse_from([
            "viewforge",
            "archive",
            "-i",
            "/tmp/renders",
            "-o",
            "/tmp/renders.tar",
        ])
        .unwrap();

        match cli.command {
            Commands::Archive(args) => {
                assert_eq!(args.input, PathBuf::from("/tmp/renders"));
                assert_eq!(args.output, PathBuf::from("/tmp/renders.tar"));
            }
            _ => panic!("expected archive command"),
        }
    }
}
