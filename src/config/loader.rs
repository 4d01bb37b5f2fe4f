//! Configuration Loader
//!
//! Environment-aware loading: a base TOML file, an optional per-environment
//! overlay, then `STEPWISE__*` environment variables. Later sources override
//! earlier ones key by key.

use super::error::{ConfigResult, ConfigurationError};
use super::StepwiseConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const BASE_FILE: &str = "stepwise.toml";
const ENVIRONMENTS_DIR: &str = "environments";
const ENV_PREFIX: &str = "STEPWISE";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: StepwiseConfig,
    environment: String,
    config_directory: PathBuf,
    /// Files that existed and were merged, in merge order
    sources: Vec<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    ///
    /// Useful for tests that must not touch process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let base = config_directory.join(BASE_FILE);
        let overlay = config_directory
            .join(ENVIRONMENTS_DIR)
            .join(format!("{environment}.toml"));
        let sources: Vec<PathBuf> = [&base, &overlay]
            .into_iter()
            .filter(|path| path.is_file())
            .cloned()
            .collect();

        let config = Self::build(&base, &overlay)?;
        config.validate()?;

        tracing::info!(
            environment = %environment,
            sources = sources.len(),
            chunk_size = config.step.chunk_size,
            concurrency_limit = config.step.concurrency_limit,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
            sources,
        }))
    }

    fn build(base: &Path, overlay: &Path) -> ConfigResult<StepwiseConfig> {
        Config::builder()
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(File::from(overlay).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(ConfigurationError::load_error)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &StepwiseConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// `STEPWISE_ENV`, then `APP_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        crate::logging::get_environment().to_lowercase()
    }

    /// `STEPWISE_CONFIG_DIR` if set, otherwise `./config`
    fn default_config_directory() -> PathBuf {
        std::env::var("STEPWISE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}
