//! In-memory backend (`mem:///path`)
//!
//! Files live in a store shared by every clone of the backend. Directories
//! exist implicitly as ancestors of stored files, or explicitly through
//! [`MemoryBackend::create_dir`]. Writers publish their buffer on shutdown;
//! a writer dropped before that leaves the store untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::io::AsyncWrite;
use tracing::debug;
use url::Url;

use super::{
    path_fragments, relative_fragments, with_fragments, Backend, ReadStream, WriteMode,
    WriteStream,
};
use crate::error::{ReconcileError, Result};
use crate::fingerprint::HashAlgorithm;
use crate::model::{FileDescription, StorageTier};

/// Default scheme served by [`MemoryBackend`]
pub const MEMORY_SCHEME: &str = "mem";

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryStore {
    files: BTreeMap<Url, StoredFile>,
    dirs: BTreeSet<Url>,
}

impl MemoryStore {
    fn put(&mut self, key: Url, content: Vec<u8>) -> Result<()> {
        self.add_ancestors(&key)?;

        let now = Utc::now();
        match self.files.get_mut(&key) {
            Some(file) => {
                file.content = content;
                file.modified_at = now;
            }
            None => {
                self.files.insert(
                    key,
                    StoredFile {
                        content,
                        created_at: now,
                        modified_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    fn add_ancestors(&mut self, key: &Url) -> Result<()> {
        let fragments = path_fragments(key)?;
        for depth in 0..fragments.len() {
            self.dirs.insert(with_fragments(key, &fragments[..depth])?);
        }
        Ok(())
    }

    fn is_dir(&self, key: &Url) -> bool {
        key.path() == "/" || self.dirs.contains(key)
    }
}

/// Backend keeping file content in memory
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    scheme: String,
    algorithm: HashAlgorithm,
    store: Arc<Mutex<MemoryStore>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(MEMORY_SCHEME, HashAlgorithm::default())
    }
}

impl MemoryBackend {
    /// Create an empty store serving `scheme`
    pub fn new(scheme: impl Into<String>, algorithm: HashAlgorithm) -> Self {
        Self {
            scheme: scheme.into().to_lowercase(),
            algorithm,
            store: Arc::new(Mutex::new(MemoryStore::default())),
        }
    }

    /// Store `content` at `uri`, creating ancestors
    pub fn insert(&self, uri: &Url, content: impl Into<Vec<u8>>) -> Result<()> {
        let key = self.key(uri)?;
        self.store.lock().put(key, content.into())
    }

    /// Register `uri` and its ancestors as directories
    pub fn create_dir(&self, uri: &Url) -> Result<()> {
        let key = self.key(uri)?;
        let mut store = self.store.lock();
        store.add_ancestors(&key)?;
        store.dirs.insert(key);
        Ok(())
    }

    /// Content stored at `uri`
    pub fn read(&self, uri: &Url) -> Result<Vec<u8>> {
        let key = self.key(uri)?;
        self.store
            .lock()
            .files
            .get(&key)
            .map(|file| file.content.clone())
            .ok_or_else(|| ReconcileError::not_found(uri))
    }

    /// Normalized lookup key of an identifier
    fn key(&self, uri: &Url) -> Result<Url> {
        self.check_scheme(uri)?;
        with_fragments(uri, &path_fragments(uri)?)
    }

    fn describe(&self, full_name: Url, file: &StoredFile) -> FileDescription {
        FileDescription {
            full_name,
            content_fingerprint: self.algorithm.digest(&file.content),
            size: Some(file.content.len() as u64),
            created_at: Some(file.created_at),
            modified_at: Some(file.modified_at),
            tier: StorageTier::Hot,
            tags: Vec::new(),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn list(&self, root: &Url) -> Result<Vec<FileDescription>> {
        let root_key = self.key(root)?;
        let store = self.store.lock();

        if !store.is_dir(&root_key) {
            return Err(ReconcileError::not_found(root));
        }

        let mut entries = Vec::new();
        for (key, file) in &store.files {
            let Ok(fragments) = relative_fragments(&root_key, key) else {
                continue;
            };
            let full_name = self.compute_path(root, &fragments)?;
            entries.push(self.describe(full_name, file));
        }

        debug!(%root, entries = entries.len(), "List");
        Ok(entries)
    }

    async fn get_file_description(&self, uri: &Url) -> Result<FileDescription> {
        let key = self.key(uri)?;
        let store = self.store.lock();
        let file = store
            .files
            .get(&key)
            .ok_or_else(|| ReconcileError::not_found(uri))?;
        Ok(self.describe(uri.clone(), file))
    }

    async fn open_read(&self, uri: &Url) -> Result<ReadStream> {
        let content = self.read(uri)?;
        Ok(Box::new(Cursor::new(content)))
    }

    async fn open_write(&self, uri: &Url, mode: WriteMode) -> Result<WriteStream> {
        let key = self.key(uri)?;
        let fragments = path_fragments(&key)?;
        let parent = with_fragments(&key, &fragments[..fragments.len().saturating_sub(1)])?;

        let mut store = self.store.lock();
        match mode {
            WriteMode::CreateDirs => store.add_ancestors(&key)?,
            WriteMode::MustExist | WriteMode::Append => {
                if !store.is_dir(&parent) {
                    return Err(ReconcileError::not_found(parent));
                }
            }
        }

        let buffer = match mode {
            WriteMode::Append => store
                .files
                .get(&key)
                .map(|file| file.content.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        Ok(Box::new(MemoryWriter {
            store: Arc::clone(&self.store),
            key,
            buffer,
        }))
    }
}

/// Writer publishing its buffer into the shared store on shutdown
struct MemoryWriter {
    store: Arc<Mutex<MemoryStore>>,
    key: Url,
    buffer: Vec<u8>,
}

impl MemoryWriter {
    fn commit(&self) -> std::io::Result<()> {
        self.store
            .lock()
            .put(self.key.clone(), self.buffer.clone())
            .map_err(std::io::Error::other)
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(self.commit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_list_only_under_root() {
        let backend = MemoryBackend::default();
        backend.insert(&uri("mem:///left/1.txt"), "a").unwrap();
        backend.insert(&uri("mem:///left/sub/2.txt"), "b").unwrap();
        backend.insert(&uri("mem:///right/1.txt"), "a").unwrap();

        let root = uri("mem:///left");
        let mut entries = backend.list(&root).await.unwrap();
        entries.sort_by(|a, b| a.full_name.cmp(&b.full_name));

        let names: Vec<&str> = entries.iter().map(|e| e.full_name.as_str()).collect();
        assert_eq!(names, vec!["mem:///left/1.txt", "mem:///left/sub/2.txt"]);
        assert_eq!(entries[0].content_fingerprint, HashAlgorithm::default().digest(b"a"));
    }

    #[tokio::test]
    async fn test_list_unknown_root_is_not_found() {
        let backend = MemoryBackend::default();
        let err = backend.list(&uri("mem:///nothing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let backend = MemoryBackend::default();
        backend.create_dir(&uri("mem:///empty")).unwrap();
        assert!(backend.list(&uri("mem:///empty")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scheme_mismatch() {
        let backend = MemoryBackend::default();
        let err = backend
            .get_file_description(&uri("fs:///a.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::SchemeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let backend = MemoryBackend::default();
        backend.create_dir(&uri("mem:///out")).unwrap();
        let target = uri("mem:///out/result.json");

        let mut writer = backend.open_write(&target, WriteMode::MustExist).await.unwrap();
        writer.write_all(b"{}").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        let mut reader = backend.open_read(&target).await.unwrap();
        let mut content = String::new();
        reader.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "{}");
    }

    #[tokio::test]
    async fn test_write_must_exist_without_parent() {
        let backend = MemoryBackend::default();
        let result = backend
            .open_write(&uri("mem:///absent/result.json"), WriteMode::MustExist)
            .await;
        assert!(matches!(result, Err(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_append_keeps_existing_content() {
        let backend = MemoryBackend::default();
        let target = uri("mem:///log.txt");
        backend.insert(&target, "one\n").unwrap();

        let mut writer = backend.open_write(&target, WriteMode::Append).await.unwrap();
        writer.write_all(b"two\n").await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(backend.read(&target).unwrap(), b"one\ntwo\n");
    }

    #[tokio::test]
    async fn test_abandoned_writer_leaves_store_untouched() {
        let backend = MemoryBackend::default();
        let existing = uri("mem:///out/kept.json");
        let fresh = uri("mem:///out/fresh.json");
        backend.insert(&existing, "previous").unwrap();

        for target in [&existing, &fresh] {
            let mut writer = backend.open_write(target, WriteMode::MustExist).await.unwrap();
            writer.write_all(b"half").await.unwrap();
            writer.flush().await.unwrap();
            drop(writer);
        }

        assert_eq!(backend.read(&existing).unwrap(), b"previous");
        assert!(backend.read(&fresh).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clones_share_the_store() {
        let backend = MemoryBackend::default();
        let clone = backend.clone();
        backend.insert(&uri("mem:///shared/a"), "x").unwrap();

        let description = clone.get_file_description(&uri("mem:///shared/a")).await.unwrap();
        assert_eq!(description.size, Some(1));
    }
}
