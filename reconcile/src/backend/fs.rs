//! Local filesystem backend (`fs:///absolute/path`) using walkdir and tokio::fs

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::fs;
use tokio::io::AsyncWrite;
use tracing::{debug, trace};
use url::Url;
use walkdir::WalkDir;

use super::{relative_fragments, Backend, ListOptions, ReadStream, WriteMode, WriteStream};
use crate::error::{ReconcileError, Result};
use crate::model::{FileDescription, StorageTier};

/// Scheme served by [`FsBackend`]
pub const FS_SCHEME: &str = "fs";

/// Backend over the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsBackend {
    options: ListOptions,
}

impl FsBackend {
    pub fn new(options: ListOptions) -> Self {
        Self { options }
    }

    /// Identifier of an absolute local path
    pub fn uri_for(path: &Path) -> Result<Url> {
        let file_url = Url::from_file_path(path).map_err(|_| {
            ReconcileError::invalid_uri(path.display(), "path is not absolute")
        })?;

        let mut uri = Url::parse("fs:///")?;
        uri.set_path(file_url.path());
        Ok(uri)
    }

    /// Local path behind an identifier
    pub fn local_path(&self, uri: &Url) -> Result<PathBuf> {
        self.check_scheme(uri)?;

        match uri.host_str() {
            None | Some("") | Some("localhost") => {}
            Some(host) => {
                return Err(ReconcileError::invalid_uri(
                    uri,
                    format!("unexpected host '{}', expected fs:///absolute/path", host),
                ))
            }
        }

        let mut file_url = Url::parse("file:///")?;
        file_url.set_path(uri.path());
        file_url
            .to_file_path()
            .map_err(|_| ReconcileError::invalid_uri(uri, "not a local path"))
    }

    /// Recursively collect regular files under `root` on a blocking thread
    async fn walk(&self, root: PathBuf) -> Result<Vec<PathBuf>> {
        let follow_links = self.options.follow_links;

        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();

            for entry in WalkDir::new(&root).follow_links(follow_links) {
                let entry = entry.map_err(|e| {
                    ReconcileError::scan_error(&root, format!("Walk error: {}", e))
                })?;

                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }

            Ok(files)
        })
        .await
        .map_err(|e| ReconcileError::Io(std::io::Error::other(e)))?
    }

    /// Describe a local file under the given identifier
    async fn describe(&self, path: &Path, full_name: Url) -> Result<FileDescription> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReconcileError::not_found(&full_name))
            }
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() {
            return Err(ReconcileError::invalid_uri(&full_name, "not a regular file"));
        }

        let mut file = fs::File::open(path)
            .await
            .map_err(|e| {
                ReconcileError::hash_error(&full_name, format!("Failed to open file: {}", e))
            })?;

        let content_fingerprint = self
            .options
            .hash_algorithm
            .digest_reader(&mut file)
            .await
            .map_err(|e| {
                ReconcileError::hash_error(&full_name, format!("Failed to read file: {}", e))
            })?;

        trace!(%full_name, %content_fingerprint, "Fingerprinted");

        Ok(FileDescription {
            full_name,
            content_fingerprint,
            size: Some(metadata.len()),
            created_at: metadata.created().ok().map(DateTime::<Utc>::from),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            tier: StorageTier::NotSupported,
            tags: Vec::new(),
        })
    }
}

#[async_trait]
impl Backend for FsBackend {
    fn scheme(&self) -> &str {
        FS_SCHEME
    }

    async fn list(&self, root: &Url) -> Result<Vec<FileDescription>> {
        let root_path = self.local_path(root)?;
        debug!(%root, path = %root_path.display(), "List");

        match fs::metadata(&root_path).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(ReconcileError::scan_error(&root_path, "Path is not a directory")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReconcileError::not_found(root))
            }
            Err(e) => return Err(e.into()),
        }

        let files = self.walk(root_path.clone()).await?;
        debug!(%root, files = files.len(), "Walk finished");

        // Fragments are taken relative to the canonical form of the root so
        // that the produced identifiers always round-trip through compute_path.
        let base = Self::uri_for(&root_path)?;
        let base = &base;

        stream::iter(files)
            .map(|path| async move {
                let fragments = relative_fragments(base, &Self::uri_for(&path)?)?;
                let full_name = self.compute_path(root, &fragments)?;
                self.describe(&path, full_name).await
            })
            .buffer_unordered(self.options.max_concurrency.max(1))
            .try_collect()
            .await
    }

    async fn get_file_description(&self, uri: &Url) -> Result<FileDescription> {
        let path = self.local_path(uri)?;
        self.describe(&path, uri.clone()).await
    }

    async fn open_read(&self, uri: &Url) -> Result<ReadStream> {
        let path = self.local_path(uri)?;

        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ReconcileError::not_found(uri))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_write(&self, uri: &Url, mode: WriteMode) -> Result<WriteStream> {
        let path = self.local_path(uri)?;

        if let Some(parent) = path.parent() {
            match mode {
                WriteMode::CreateDirs => fs::create_dir_all(parent).await?,
                WriteMode::MustExist | WriteMode::Append => match fs::metadata(parent).await {
                    Ok(metadata) if metadata.is_dir() => {}
                    _ => return Err(ReconcileError::not_found(parent.display())),
                },
            }
        }

        if mode == WriteMode::Append {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            debug!(%uri, ?mode, "Opened for appending");
            return Ok(Box::new(file));
        }

        let staging = staging_path(&path);
        let file = fs::File::create(&staging).await?;
        debug!(%uri, ?mode, staging = %staging.display(), "Opened for writing");

        Ok(Box::new(StagedFile {
            file,
            staging,
            destination: path,
            rename: None,
            committed: false,
        }))
    }
}

/// Sibling of `path` that receives content until the writer is shut down
fn staging_path(path: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = NEXT.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}-{}.partial", name, std::process::id(), id))
}

/// Writer that replaces its destination only once shut down successfully
///
/// Dropping it earlier removes the staging file and leaves the destination
/// untouched.
struct StagedFile {
    file: fs::File,
    staging: PathBuf,
    destination: PathBuf,
    rename: Option<Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>>,
    committed: bool,
}

impl AsyncWrite for StagedFile {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.committed {
            return Poll::Ready(Ok(()));
        }

        if this.rename.is_none() {
            ready!(Pin::new(&mut this.file).poll_shutdown(cx))?;
        }

        let (staging, destination) = (this.staging.clone(), this.destination.clone());
        let rename = this
            .rename
            .get_or_insert_with(|| Box::pin(fs::rename(staging, destination)));
        let result = ready!(rename.as_mut().poll(cx));

        this.rename = None;
        this.committed = result.is_ok();
        Poll::Ready(result)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.staging);
        }
    }
}
