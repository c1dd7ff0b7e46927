//! Pipeline configuration.
//!
//! Every knob of the pipeline is an explicit, validated configuration
//! option: acquisition URLs and directories, dataset filtering, clustering
//! parameters, the render mode, and release publishing credentials.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::render::RenderMode;

/// Default Pix3D dataset archive URL.
pub const DEFAULT_DATASET_URL: &str = "http://pix3d.csail.mit.edu/data/pix3d.zip";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Acquisition settings
    /// URL of the rendering engine distribution (tar/tar.gz/zip).
    pub engine_url: String,
    /// URL of the dataset archive.
    pub dataset_url: String,
    /// Directory the engine archive is extracted into (one leading path
    /// component stripped).
    pub engine_dir: PathBuf,
    /// Directory the dataset archive is extracted into.
    pub dataset_dir: PathBuf,
    /// Skip the fetch stage entirely (engine and dataset already on disk).
    pub skip_fetch: bool,

    // Dataset settings
    /// Path of the dataset metadata file.
    pub metadata_path: PathBuf,
    /// Image paths excluded from processing.
    pub drop_images: Vec<String>,
    /// Keep only records whose image fits within `(width, height)`.
    pub max_image_size: Option<(u32, u32)>,

    // Preprocess settings
    /// Path the clustered viewpoints file is written to.
    pub viewpoints_path: PathBuf,
    /// Representative viewpoints per category.
    pub num_views: usize,
    /// Seed for clustering and the render script.
    pub seed: u64,

    // Render settings
    /// Path of the engine binary.
    pub engine_binary: PathBuf,
    /// Path of the render script passed to the engine.
    pub render_script: PathBuf,
    /// Render mode.
    pub render_mode: RenderMode,
    /// Directory the renderer writes views into.
    pub render_output_dir: PathBuf,
    /// Timeout for the engine run.
    pub engine_timeout: Duration,

    // Archive settings
    /// Path of the packed output archive.
    pub archive_path: PathBuf,

    // Publish settings
    /// Whether to publish a release after archiving.
    pub publish: bool,
    /// Repository in `owner/name` form.
    pub github_repo: String,
    /// Release API token.
    pub github_token: Option<String>,
    /// Commit identifier keying the release tag.
    pub commit_sha: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // Acquisition defaults
            engine_url: String::new(),
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            engine_dir: PathBuf::from("./engine"),
            dataset_dir: PathBuf::from("./pix3d"),
            skip_fetch: false,

            // Dataset defaults
            metadata_path: PathBuf::from("./pix3d/pix3d.json"),
            drop_images: crate::dataset::DEFAULT_DROP_IMAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_image_size: None,

            // Preprocess defaults
            viewpoints_path: PathBuf::from("./pix3d/pix3d_clustered_viewpoints.json"),
            num_views: 16,
            seed: 42,

            // Render defaults
            engine_binary: PathBuf::from("./engine/blender"),
            render_script: PathBuf::from("./render_pix3d.py"),
            render_mode: RenderMode::SyntheticViews,
            render_output_dir: PathBuf::from("./pix3d_renders"),
            engine_timeout: Duration::from_secs(21_600), // 6 hours

            // Archive defaults
            archive_path: PathBuf::from("./pix3d_renders.tar"),

            // Publish defaults
            publish: true,
            github_repo: String::new(),
            github_token: None,
            commit_sha: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `VIEWFORGE_ENGINE_URL`: engine archive URL (required unless skipping fetch)
    /// - `VIEWFORGE_DATASET_URL`: dataset archive URL
    /// - `VIEWFORGE_ENGINE_DIR`: engine extraction directory (default: ./engine)
    /// - `VIEWFORGE_DATASET_DIR`: dataset extraction directory (default: ./pix3d)
    /// - `VIEWFORGE_SKIP_FETCH`: skip the fetch stage (default: false)
    /// - `VIEWFORGE_METADATA_PATH`: metadata file path (default: ./pix3d/pix3d.json)
    /// - `VIEWFORGE_VIEWPOINTS_PATH`: clustered viewpoints output path
    /// - `VIEWFORGE_NUM_VIEWS`: viewpoints per category (default: 16)
    /// - `VIEWFORGE_SEED`: clustering/render seed (default: 42)
    /// - `VIEWFORGE_ENGINE_BINARY`: engine binary path (default: ./engine/blender)
    /// - `VIEWFORGE_RENDER_SCRIPT`: render script path (default: ./render_pix3d.py)
    /// - `VIEWFORGE_RENDER_MODE`: `synthetic-views` or `ground-truth-views`
    /// - `VIEWFORGE_RENDER_OUTPUT_DIR`: render output directory
    /// - `VIEWFORGE_ENGINE_TIMEOUT_SECS`: engine timeout in seconds (default: 21600)
    /// - `VIEWFORGE_ARCHIVE_PATH`: output archive path (default: ./pix3d_renders.tar)
    /// - `VIEWFORGE_PUBLISH`: publish a release (default: true)
    /// - `GITHUB_REPOSITORY`: repository in owner/name form (publish)
    /// - `GITHUB_TOKEN`: release API token (publish)
    /// - `GITHUB_SHA`: commit identifier (publish)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if variables have invalid values or validation
    /// fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Acquisition settings
        if let Ok(val) = std::env::var("VIEWFORGE_ENGINE_URL") {
            config.engine_url = val;
        }
        if let Ok(val) = std::env::var("VIEWFORGE_DATASET_URL") {
            config.dataset_url = val;
        }
        if let Ok(val) = std::env::var("VIEWFORGE_ENGINE_DIR") {
            config.engine_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("VIEWFORGE_DATASET_DIR") {
            config.dataset_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("VIEWFORGE_SKIP_FETCH") {
            config.skip_fetch = parse_env_bool(&val, "VIEWFORGE_SKIP_FETCH")?;
        }

        // Dataset settings
        if let Ok(val) = std::env::var("VIEWFORGE_METADATA_PATH") {
            config.metadata_path = PathBuf::from(val);
        }

        // Preprocess settings
        if let Ok(val) = std::env::var("VIEWFORGE_VIEWPOINTS_PATH") {
            config.viewpoints_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("VIEWFORGE_NUM_VIEWS") {
            config.num_views = parse_env_value(&val, "VIEWFORGE_NUM_VIEWS")?;
        }
        if let Ok(val) = std::env::var("VIEWFORGE_SEED") {
            config.seed = parse_env_value(&val, "VIEWFORGE_SEED")?;
        }

        // Render settings
        if let Ok(val) = std::env::var("VIEWFORGE_ENGINE_BINARY") {
            config.engine_binary = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("VIEWFORGE_RENDER_SCRIPT") {
            config.render_script = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("VIEWFORGE_RENDER_MODE") {
            config.render_mode = val.parse().map_err(|_| ConfigError::InvalidValue {
                key: "VIEWFORGE_RENDER_MODE".to_string(),
                message: format!("could not parse '{}'", val),
            })?;
        }
        if let Ok(val) = std::env::var("VIEWFORGE_RENDER_OUTPUT_DIR") {
            config.render_output_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("VIEWFORGE_ENGINE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "VIEWFORGE_ENGINE_TIMEOUT_SECS")?;
            config.engine_timeout = Duration::from_secs(secs);
        }

        // Archive settings
        if let Ok(val) = std::env::var("VIEWFORGE_ARCHIVE_PATH") {
            config.archive_path = PathBuf::from(val);
        }

        // Publish settings
        if let Ok(val) = std::env::var("VIEWFORGE_PUBLISH") {
            config.publish = parse_env_bool(&val, "VIEWFORGE_PUBLISH")?;
        }
        if let Ok(val) = std::env::var("GITHUB_REPOSITORY") {
            config.github_repo = val;
        }
        if let Ok(val) = std::env::var("GITHUB_TOKEN") {
            config.github_token = Some(val);
        }
        if let Ok(val) = std::env::var("GITHUB_SHA") {
            config.commit_sha = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Acquisition validation
        if !self.skip_fetch {
            if self.engine_url.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "engine_url must be set unless fetch is skipped".to_string(),
                ));
            }
            if self.dataset_url.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "dataset_url must be set unless fetch is skipped".to_string(),
                ));
            }
        }

        // Preprocess validation
        if self.num_views == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_views must be greater than 0".to_string(),
            ));
        }

        // Render validation
        if self.engine_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "engine_timeout must be greater than 0".to_string(),
            ));
        }
        if self.engine_binary.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "engine_binary cannot be empty".to_string(),
            ));
        }
        if self.render_script.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "render_script cannot be empty".to_string(),
            ));
        }

        // Publish validation
        if self.publish {
            if !self.github_repo.contains('/') {
                return Err(ConfigError::ValidationFailed(
                    "github_repo must be in owner/name form".to_string(),
                ));
            }
            if self.github_token.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "github_token must be set when publishing".to_string(),
                ));
            }
            if self.commit_sha.len() < 7
                || !self.commit_sha.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(ConfigError::ValidationFailed(
                    "commit_sha must be a hexadecimal commit identifier".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Builder method to set the engine URL.
    pub fn with_engine_url(mut self, url: impl Into<String>) -> Self {
        self.engine_url = url.into();
        self
    }

    /// Builder method to set the dataset URL.
    pub fn with_dataset_url(mut self, url: impl Into<String>) -> Self {
        self.dataset_url = url.into();
        self
    }

    /// Builder method to skip the fetch stage.
    pub fn with_skip_fetch(mut self, skip: bool) -> Self {
        self.skip_fetch = skip;
        self
    }

    /// Builder method to set the metadata path.
    pub fn with_metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = path.into();
        self
    }

    /// Builder method to set the viewpoints path.
    pub fn with_viewpoints_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.viewpoints_path = path.into();
        self
    }

    /// Builder method to set the number of views per category.
    pub fn with_num_views(mut self, num_views: usize) -> Self {
        self.num_views = num_views;
        self
    }

    /// Builder method to set the clustering/render seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to set the engine binary path.
    pub fn with_engine_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_binary = path.into();
        self
    }

    /// Builder method to set the render script path.
    pub fn with_render_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.render_script = path.into();
        self
    }

    /// Builder method to set the render mode.
    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    /// Builder method to set the render output directory.
    pub fn with_render_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.render_output_dir = path.into();
        self
    }

    /// Builder method to set the engine timeout.
    pub fn with_engine_timeout(mut self, timeout: Duration) -> Self {
        self.engine_timeout = timeout;
        self
    }

    /// Builder method to set the archive path.
    pub fn with_archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_path = path.into();
        self
    }

    /// Builder method to enable or disable publishing.
    pub fn with_publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    /// Builder method to set the repository.
    pub fn with_github_repo(mut self, repo: impl Into<String>) -> Self {
        self.github_repo = repo.into();
        self
    }

    /// Builder method to set the release token.
    pub fn with_github_token(mut self, token: impl Into<String>) -> Self {
        self.github_token = Some(token.into());
        self
    }

    /// Builder method to set the commit identifier.
    pub fn with_commit_sha(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = sha.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publishable() -> PipelineConfig {
        PipelineConfig::default()
            .with_engine_url("https://example.org/engine.tar.gz")
            .with_github_repo("example/pix3d-renders")
            .with_github_token("ghp_test")
            .with_commit_sha("0123456789abcdef0123456789abcdef01234567")
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.dataset_url, DEFAULT_DATASET_URL);
        assert_eq!(config.num_views, 16);
        assert_eq!(config.seed, 42);
        assert_eq!(config.render_mode, RenderMode::SyntheticViews);
        assert_eq!(config.engine_timeout, Duration::from_secs(21_600));
        assert!(config.publish);
        assert!(!config.skip_fetch);
        assert_eq!(config.drop_images.len(), 2);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_engine_url("https://example.org/engine.tar.gz")
            .with_dataset_url("https://example.org/pix3d.zip")
            .with_num_views(8)
            .with_seed(7)
            .with_render_mode(RenderMode::GroundTruthViews)
            .with_engine_timeout(Duration::from_secs(60))
            .with_publish(false);

        assert_eq!(config.engine_url, "https://example.org/engine.tar.gz");
        assert_eq!(config.dataset_url, "https://example.org/pix3d.zip");
        assert_eq!(config.num_views, 8);
        assert_eq!(config.seed, 7);
        assert_eq!(config.render_mode, RenderMode::GroundTruthViews);
        assert_eq!(config.engine_timeout, Duration::from_secs(60));
        assert!(!config.publish);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(publishable().validate().is_ok());
    }

    #[test]
    fn test_validation_requires_engine_url() {
        let config = publishable().with_engine_url("");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("engine_url"));
    }

    #[test]
    fn test_validation_skip_fetch_allows_empty_urls() {
        let config = publishable()
            .with_engine_url("")
            .with_dataset_url("")
            .with_skip_fetch(true);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_num_views() {
        let config = publishable().with_num_views(0);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("num_views"));
    }

    #[test]
    fn test_validation_invalid_timeout() {
        let config = publishable().with_engine_timeout(Duration::from_secs(0));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("engine_timeout"));
    }

    #[test]
    fn test_validation_publish_requires_repo() {
        let config = publishable().with_github_repo("not-a-repo");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("github_repo"));
    }

    #[test]
    fn test_validation_publish_requires_token() {
        let mut config = publishable();
        config.github_token = None;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("github_token"));
    }

    #[test]
    fn test_validation_publish_requires_hex_sha() {
        let config = publishable().with_commit_sha("zzzz");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("commit_sha"));
    }

    #[test]
    fn test_validation_disabled_publish_skips_credentials() {
        let config = PipelineConfig::default()
            .with_engine_url("https://example.org/engine.tar.gz")
            .with_publish(false);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("yes", "test").unwrap());
        assert!(parse_env_bool("TRUE", "test").unwrap());

        assert!(!parse_env_bool("false", "test").unwrap());
        assert!(!parse_env_bool("0", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());

        assert!(parse_env_bool("invalid", "test").is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingEnvVar("TEST_VAR".to_string());
        assert!(err.to_string().contains("TEST_VAR"));

        let err = ConfigError::InvalidValue {
            key: "KEY".to_string(),
            message: "bad value".to_string(),
        };
        assert!(err.to_string().contains("KEY"));
        assert!(err.to_string().contains("bad value"));
    }
}
