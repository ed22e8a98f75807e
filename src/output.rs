//! Conversion results and the "save the download" side effect.
//!
//! A successful convert call hands its artifact to an [`ArtifactSink`]. The
//! CLI and library default is [`DirectorySink`], which writes into one
//! directory atomically (temp file + rename) so an interrupted run never
//! leaves a half-written spreadsheet behind.

use crate::api::ConvertedArtifact;
use crate::config::ClientConfig;
use crate::error::TabularisError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a converted artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedArtifact {
    /// File name reported by the service.
    pub filename: String,
    /// Location the sink wrote to; `None` for sinks without a file system.
    pub location: Option<PathBuf>,
    pub size_bytes: usize,
}

/// Per-file result of a conversion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Succeeded {
        /// Name of the source PDF.
        source: String,
        artifact: SavedArtifact,
    },
    Failed {
        /// Name of the source PDF.
        source: String,
        message: String,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Succeeded { .. })
    }

    pub fn source(&self) -> &str {
        match self {
            ConversionOutcome::Succeeded { source, .. } | ConversionOutcome::Failed { source, .. } => {
                source
            }
        }
    }
}

/// Receives converted artifacts (the client-side "download").
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save(&self, artifact: &ConvertedArtifact) -> Result<SavedArtifact, TabularisError>;
}

/// Saves artifacts into a directory, creating it on first use.
///
/// Existing files with the same name are replaced. An artifact without a
/// usable name is saved as `converted.<extension>`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    extension: String,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "xlsx".to_string(),
        }
    }

    /// Output directory and fallback extension from the client config.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.output_dir).with_extension(&config.artifact_extension)
    }

    pub fn with_extension(mut self, ext: impl AsRef<str>) -> Self {
        self.extension = ext.as_ref().trim_start_matches('.').to_string();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target path for an artifact name, confined to the sink directory.
    fn target(&self, filename: &str) -> PathBuf {
        let base = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("converted.{}", self.extension));
        self.dir.join(base)
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(&self, artifact: &ConvertedArtifact) -> Result<SavedArtifact, TabularisError> {
        let path = self.target(&artifact.filename);
        let dir = self.dir.clone();
        let bytes = artifact.bytes.clone();
        let target = path.clone();

        // Blocking file I/O runs off the async executor.
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
            .await
            .map_err(|e| TabularisError::Internal(format!("save task panicked: {e}")))?
            .map_err(|e| TabularisError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        debug!("Saved {} ({} bytes)", path.display(), artifact.bytes.len());
        Ok(SavedArtifact {
            filename: artifact.filename.clone(),
            location: Some(path),
            size_bytes: artifact.bytes.len(),
        })
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn artifact(name: &str, bytes: &[u8]) -> ConvertedArtifact {
        ConvertedArtifact {
            filename: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn saves_into_new_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path().join("out/nested"));
        let saved = assert_ok!(sink.save(&artifact("report.xlsx", b"PK\x03\x04")).await);

        let path = saved.location.clone().unwrap();
        assert_eq!(path, tmp.path().join("out/nested/report.xlsx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04");
        assert_eq!(saved.size_bytes, 4);
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path());
        assert_ok!(sink.save(&artifact("a.xlsx", b"old")).await);
        assert_ok!(sink.save(&artifact("a.xlsx", b"new contents")).await);
        assert_eq!(
            std::fs::read(tmp.path().join("a.xlsx")).unwrap(),
            b"new contents"
        );
    }

    #[tokio::test]
    async fn confines_to_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path());
        let saved = assert_ok!(sink.save(&artifact("../escape.xlsx", b"x")).await);
        assert_eq!(saved.location.unwrap(), tmp.path().join("escape.xlsx"));
    }

    #[tokio::test]
    async fn nameless_artifact_uses_configured_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ClientConfig::builder()
            .output_dir(tmp.path())
            .artifact_extension("csv")
            .build()
            .unwrap();
        let sink = DirectorySink::from_config(&config);

        let saved = assert_ok!(sink.save(&artifact("", b"a,b")).await);
        assert_eq!(saved.location.unwrap(), tmp.path().join("converted.csv"));
        let saved = assert_ok!(sink.save(&artifact("../", b"a,b")).await);
        assert_eq!(saved.location.unwrap(), tmp.path().join("converted.csv"));

        let default = DirectorySink::new(tmp.path());
        let saved = assert_ok!(default.save(&artifact("  ", b"PK")).await);
        assert_eq!(saved.location.unwrap(), tmp.path().join("converted.xlsx"));
    }

    #[test]
    fn outcome_serialises_with_status_tag() {
        let o = ConversionOutcome::Failed {
            source: "b.pdf".into(),
            message: "boom".into(),
        };
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["source"], "b.pdf");
        assert!(!o.is_success());
        assert_eq!(o.source(), "b.pdf");
    }
}
