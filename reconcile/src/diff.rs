//! Diff engine: classify two listings by relative path and content fingerprint

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, trace};
use url::Url;

use crate::backend::{join_key, Backend};
use crate::error::{ReconcileError, Result};
use crate::model::{created_now, BothEntry, DiffArtifact, FileDescription};
use crate::registry::BackendRegistry;

/// Entries of one listing keyed by their joined relative fragments
pub type ListingIndex = BTreeMap<String, FileDescription>;

/// Three-way classification of two indexed listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub only_on_source: Vec<FileDescription>,
    pub only_on_target: Vec<FileDescription>,
    pub both: Vec<BothEntry>,
}

/// Diff engine resolving roots through a backend registry
pub struct DiffEngine {
    registry: Arc<BackendRegistry>,
}

impl DiffEngine {
    /// Create a new diff engine
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    /// List both roots concurrently and classify their entries
    ///
    /// Any listing or fingerprinting failure aborts the whole diff.
    #[instrument(skip_all, fields(%source, %target))]
    pub async fn diff(&self, source: &Url, target: &Url) -> Result<DiffArtifact> {
        let source_backend = self.registry.resolve_for(source)?;
        let target_backend = self.registry.resolve_for(target)?;

        let (source_list, target_list) =
            tokio::try_join!(source_backend.list(source), target_backend.list(target))?;

        debug!(
            source_count = source_list.len(),
            target_count = target_list.len(),
            "Listings complete"
        );

        let source_index = index_listing(source_backend.as_ref(), source, source_list)?;
        let target_index = index_listing(target_backend.as_ref(), target, target_list)?;
        let classification = classify(source_index, target_index);

        let artifact = DiffArtifact {
            source: source.clone(),
            target: target.clone(),
            created: created_now(),
            only_on_target: classification.only_on_target,
            only_on_source: classification.only_on_source,
            both: classification.both,
        };

        let summary = artifact.summary();
        info!(
            only_on_source = summary.only_on_source,
            only_on_target = summary.only_on_target,
            both = summary.both,
            "Diff computed"
        );

        Ok(artifact)
    }
}

/// Key every entry by its fragments relative to `root`
///
/// Two entries normalizing to the same key are rejected rather than merged.
pub fn index_listing(
    backend: &dyn Backend,
    root: &Url,
    entries: Vec<FileDescription>,
) -> Result<ListingIndex> {
    let mut index = ListingIndex::new();

    for entry in entries {
        let key = join_key(&backend.get_relative_fragments(root, &entry.full_name)?);
        trace!(%key, full_name = %entry.full_name, "Indexed");

        if let Some(existing) = index.get(&key) {
            return Err(ReconcileError::JoinKeyCollision {
                key,
                first: existing.full_name.to_string(),
                second: entry.full_name.to_string(),
            });
        }
        index.insert(key, entry);
    }

    Ok(index)
}

/// Split two indexes into source-only, target-only and differing pairs
///
/// Pairs with equal fingerprints need no resolution and are dropped. Output
/// is ordered by join key.
pub fn classify(source: ListingIndex, mut target: ListingIndex) -> Classification {
    let mut classification = Classification::default();

    for (key, source_entry) in source {
        match target.remove(&key) {
            Some(target_entry) => {
                if source_entry.content_fingerprint != target_entry.content_fingerprint {
                    classification.both.push(BothEntry {
                        source: source_entry,
                        target: target_entry,
                    });
                }
            }
            None => classification.only_on_source.push(source_entry),
        }
    }

    classification.only_on_target = target.into_values().collect();
    classification
}
