//! Artifact text formats and artifact I/O through backends

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use url::Url;

use crate::backend::WriteMode;
use crate::error::{ReconcileError, Result};
use crate::registry::BackendRegistry;

/// Text form used to exchange artifacts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Json,
    Yaml,
}

impl ArtifactFormat {
    /// Render an artifact as text
    pub fn format<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            ArtifactFormat::Json => Ok(serde_json::to_string_pretty(value)?),
            ArtifactFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }

    /// Read an artifact back from text
    pub fn parse<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        match self {
            ArtifactFormat::Json => Ok(serde_json::from_str(text)?),
            ArtifactFormat::Yaml => Ok(serde_yaml::from_str(text)?),
        }
    }
}

impl std::str::FromStr for ArtifactFormat {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ArtifactFormat::Json),
            "yaml" | "yml" => Ok(ArtifactFormat::Yaml),
            _ => Err(ReconcileError::UnknownFormat(s.to_string())),
        }
    }
}

/// Full text stored at `uri`
pub async fn read_text(registry: &BackendRegistry, uri: &Url) -> Result<String> {
    let backend = registry.resolve_for(uri)?;
    let mut reader = backend.open_read(uri).await?;

    let mut text = String::new();
    reader.read_to_string(&mut text).await?;
    debug!(%uri, bytes = text.len(), "Read artifact");
    Ok(text)
}

/// Write `text` and a trailing newline to `output`, or to stdout when none is given
///
/// Backends publish the destination only after a successful shutdown, so a
/// failed write leaves any previous artifact in place.
pub async fn write_text(
    registry: &BackendRegistry,
    output: Option<&Url>,
    text: &str,
) -> Result<()> {
    match output {
        Some(uri) => {
            let backend = registry.resolve_for(uri)?;
            let mut writer = backend.open_write(uri, WriteMode::MustExist).await?;
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.shutdown().await?;
            debug!(%uri, bytes = text.len(), "Wrote artifact");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(text.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
