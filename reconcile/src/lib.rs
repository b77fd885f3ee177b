//! Reconcile Library
//!
//! Compares two file trees that may live on different storage backends and
//! plans how to bring them together:
//! - Backends addressed by URI scheme (`fs`, `mem`) behind one trait
//! - Content fingerprints with blake3 or sha256
//! - Diff engine joining entries by relative path fragments
//! - Resolution engine turning a diff and per-category strategies into a plan
//! - JSON and YAML artifacts read and written through backends
//!
//! Nothing here executes the planned operations.

pub mod artifact;
pub mod backend;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod registry;
pub mod resolve;

// Re-export main types and functions
pub use artifact::{read_text, write_text, ArtifactFormat};
pub use backend::{Backend, FsBackend, ListOptions, MemoryBackend, WriteMode};
pub use diff::{classify, index_listing, Classification, DiffEngine};
pub use error::{ReconcileError, Result};
pub use fingerprint::HashAlgorithm;
pub use model::{
    BothEntry, DiffArtifact, FileDescription, FileOperation, OperationType, ResolveArtifact,
    StorageTier,
};
pub use registry::BackendRegistry;
pub use resolve::{Category, ResolveStrategies, Resolver};

use std::sync::Arc;

use url::Url;

/// Diff two roots resolved through `registry`
pub async fn diff_roots(
    registry: Arc<BackendRegistry>,
    source: &Url,
    target: &Url,
) -> Result<DiffArtifact> {
    DiffEngine::new(registry).diff(source, target).await
}

/// Read a diff artifact from `patch` and plan its resolution
pub async fn resolve_patch(
    registry: Arc<BackendRegistry>,
    patch: &Url,
    format: ArtifactFormat,
    strategies: &ResolveStrategies,
) -> Result<ResolveArtifact> {
    // strategy errors are reported before any I/O
    strategies.validate()?;

    let text = read_text(&registry, patch).await?;
    let diff: DiffArtifact = format.parse(&text)?;
    Resolver::new(registry).resolve(&diff, strategies)
}

#[cfg(test)]
mod integration_tests;
