use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use reconcile::{ArtifactFormat, HashAlgorithm, ListOptions};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    #[serde(default = "default_max_concurrent_fingerprints")]
    pub max_concurrent_fingerprints: usize,
    #[serde(default)]
    pub follow_links: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: ArtifactFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
            rotation: LogRotation::Never,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            max_concurrent_fingerprints: default_max_concurrent_fingerprints(),
            follow_links: false,
        }
    }
}

impl CliConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Unknown log level '{}', expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            );
        }

        if self.scan.max_concurrent_fingerprints == 0 {
            anyhow::bail!("max_concurrent_fingerprints must be at least 1");
        }

        Ok(())
    }

    pub fn list_options(&self) -> ListOptions {
        ListOptions {
            hash_algorithm: self.scan.hash_algorithm,
            max_concurrency: self.scan.max_concurrent_fingerprints,
            follow_links: self.scan.follow_links,
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_max_concurrent_fingerprints() -> usize { 16 }
