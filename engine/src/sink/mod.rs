//! Sink collaborator: where exported collections are written.
//!
//! - [`FileSink`] - files under an output directory
//! - [`MemorySink`] - payloads kept in memory, for tests and dry runs

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

use crate::api::logs::log_success;
use crate::error::{SinkError, SinkResult};

/// Durable destination for export payloads.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(&self, filename: &str, payload: &[u8]) -> SinkResult<()>;
}

/// A relative path with no parent or root components.
fn checked_relative(filename: &str) -> SinkResult<PathBuf> {
    let path = Path::new(filename);
    let safe = !filename.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if safe {
        Ok(path.to_path_buf())
    } else {
        Err(SinkError::InvalidFilename(filename.to_string()))
    }
}

// =============================================================================
// File Sink
// =============================================================================

/// Writes files below a root directory, creating directories as needed.
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn write(&self, filename: &str, payload: &[u8]) -> SinkResult<()> {
        let target = self.root.join(checked_relative(filename)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, payload).await?;
        log_success(format!("Wrote {} ({} bytes)", target.display(), payload.len()));
        Ok(())
    }
}

// =============================================================================
// Memory Sink
// =============================================================================

/// Keeps the last payload written per filename.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, filename: &str) -> Option<Vec<u8>> {
        self.files.read().await.get(filename).cloned()
    }

    /// Written filenames, sorted.
    pub async fn filenames(&self) -> Vec<String> {
        self.files.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, filename: &str, payload: &[u8]) -> SinkResult<()> {
        checked_relative(filename)?;
        self.files
            .write()
            .await
            .insert(filename.to_string(), payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sink_writes_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        sink.write("exports/2024/tracks.json", b"[]").await.unwrap();
        let written = std::fs::read(dir.path().join("exports/2024/tracks.json")).unwrap();
        assert_eq!(written, b"[]");
    }

    #[tokio::test]
    async fn test_file_sink_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());

        for name in ["../evil.json", "/etc/passwd", "a/../../b", ""] {
            let err = sink.write(name, b"x").await.unwrap_err();
            assert!(matches!(err, SinkError::InvalidFilename(_)), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_memory_sink_keeps_last_payload() {
        let sink = MemorySink::new();
        sink.write("a.csv", b"one").await.unwrap();
        sink.write("a.csv", b"two").await.unwrap();
        sink.write("b.csv", b"three").await.unwrap();

        assert_eq!(sink.get("a.csv").await.unwrap(), b"two");
        assert_eq!(sink.filenames().await, vec!["a.csv", "b.csv"]);
        assert!(sink.get("c.csv").await.is_none());
    }
}
