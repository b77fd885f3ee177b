//! Storage backends addressed by URI scheme
//!
//! A backend translates one scheme's storage into the uniform vocabulary the
//! diff and resolve stages work with: [`FileDescription`]s, byte streams and
//! path fragments. Fragments are the percent-encoded path segments of an
//! identifier below a root; they are the only identity that is comparable
//! across backends.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

use crate::error::{ReconcileError, Result};
use crate::fingerprint::HashAlgorithm;
use crate::model::FileDescription;

pub mod fs;
pub mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

/// Readable byte stream owned by the caller
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Writable byte stream owned by the caller
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// How `open_write` treats the target and its ancestors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create or truncate; every ancestor directory must already exist
    MustExist,
    /// Create or truncate; missing ancestor directories are created
    CreateDirs,
    /// Append to the entry, creating it if needed; ancestors must exist
    Append,
}

/// Options shared by listing backends
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Digest used for content fingerprints
    pub hash_algorithm: HashAlgorithm,
    /// Upper bound of entries fingerprinted at the same time
    pub max_concurrency: usize,
    /// Follow symbolic links while walking
    pub follow_links: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            max_concurrency: 16,
            follow_links: false,
        }
    }
}

/// Capability set implemented once per URI scheme
#[async_trait]
pub trait Backend: Send + Sync {
    /// Scheme served by this backend, lowercase
    fn scheme(&self) -> &str;

    /// Reject identifiers of any other scheme
    fn check_scheme(&self, uri: &Url) -> Result<()> {
        if uri.scheme() != self.scheme() {
            return Err(ReconcileError::scheme_mismatch(self.scheme(), uri));
        }
        Ok(())
    }

    /// Every file reachable under `root`, fingerprinted at call time
    async fn list(&self, root: &Url) -> Result<Vec<FileDescription>>;

    /// Describe exactly one entry
    async fn get_file_description(&self, uri: &Url) -> Result<FileDescription>;

    async fn open_read(&self, uri: &Url) -> Result<ReadStream>;

    async fn open_write(&self, uri: &Url, mode: WriteMode) -> Result<WriteStream>;

    /// Join `root` with `fragments`; inverse of [`Backend::get_relative_fragments`]
    fn compute_path(&self, root: &Url, fragments: &[String]) -> Result<Url> {
        self.check_scheme(root)?;
        join_fragments(root, fragments)
    }

    /// Path components of `uri` below `root`
    fn get_relative_fragments(&self, root: &Url, uri: &Url) -> Result<Vec<String>> {
        self.check_scheme(root)?;
        self.check_scheme(uri)?;
        relative_fragments(root, uri)
    }
}

/// Non-empty path segments of an identifier, percent-encoded as in the URI
pub fn path_fragments(uri: &Url) -> Result<Vec<String>> {
    let segments = uri
        .path_segments()
        .ok_or_else(|| ReconcileError::invalid_uri(uri, "identifier has no hierarchical path"))?;

    Ok(segments
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect())
}

/// Identifier on the same scheme and host as `base` whose path is exactly `fragments`
pub fn with_fragments(base: &Url, fragments: &[String]) -> Result<Url> {
    let mut path = String::new();
    for fragment in fragments {
        validate_fragment(base, fragment)?;
        path.push('/');
        path.push_str(fragment);
    }
    if path.is_empty() {
        path.push('/');
    }

    let mut uri = base.clone();
    uri.set_path(&path);
    uri.set_query(None);
    uri.set_fragment(None);
    Ok(uri)
}

/// Append `fragments` below `root`
pub fn join_fragments(root: &Url, fragments: &[String]) -> Result<Url> {
    let mut all = path_fragments(root)?;
    all.extend(fragments.iter().cloned());
    with_fragments(root, &all)
}

/// Fragments of `uri` after stripping the fragments of `root`
pub fn relative_fragments(root: &Url, uri: &Url) -> Result<Vec<String>> {
    if root.scheme() != uri.scheme() || root.host_str() != uri.host_str() {
        return Err(ReconcileError::outside_root(root, uri));
    }

    let root_fragments = path_fragments(root)?;
    let fragments = path_fragments(uri)?;

    if !fragments.starts_with(&root_fragments) {
        return Err(ReconcileError::outside_root(root, uri));
    }

    Ok(fragments[root_fragments.len()..].to_vec())
}

/// Key joining entries of two listings: fragments separated by `/`
pub fn join_key(fragments: &[String]) -> String {
    fragments.join("/")
}

fn validate_fragment(base: &Url, fragment: &str) -> Result<()> {
    if fragment.is_empty() || fragment == "." || fragment == ".." || fragment.contains('/') {
        return Err(ReconcileError::invalid_uri(
            base,
            format!("'{}' is not a valid path fragment", fragment),
        ));
    }
    Ok(())
}
