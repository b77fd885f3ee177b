//! Resolution engine: turn a diff artifact and per-category strategies into a plan

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use url::Url;

use crate::backend::Backend;
use crate::error::{ReconcileError, Result};
use crate::model::{
    created_now, BothEntry, DiffArtifact, FileDescription, FileOperation, OperationType,
    ResolveArtifact,
};
use crate::registry::BackendRegistry;

/// Categories of a diff artifact, each resolved by its own strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    OnlyOnSource,
    OnlyOnTarget,
    Both,
}

impl Category {
    /// Operation kinds accepted as a strategy, `Unknown` standing for "none"
    pub fn allowed_operations(&self) -> &'static [OperationType] {
        match self {
            Category::OnlyOnSource => &[
                OperationType::Unknown,
                OperationType::CopyToTarget,
                OperationType::DeleteAtSource,
            ],
            Category::OnlyOnTarget => &[
                OperationType::Unknown,
                OperationType::CopyToSource,
                OperationType::DeleteAtTarget,
            ],
            Category::Both => &[
                OperationType::Unknown,
                OperationType::DeleteAtSource,
                OperationType::DeleteAtTarget,
                OperationType::OverwriteAtSource,
                OperationType::OverwriteAtTarget,
                OperationType::AppendAtSource,
                OperationType::AppendAtTarget,
            ],
        }
    }

    pub fn allows(&self, operation: OperationType) -> bool {
        self.allowed_operations().contains(&operation)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::OnlyOnSource => "OnlyOnSource",
            Category::OnlyOnTarget => "OnlyOnTarget",
            Category::Both => "Both",
        };
        f.write_str(name)
    }
}

/// One strategy per category; the default resolves nothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStrategies {
    pub only_on_source: OperationType,
    pub only_on_target: OperationType,
    pub both: OperationType,
}

impl ResolveStrategies {
    /// Reject any strategy not permitted for its category
    pub fn validate(&self) -> Result<()> {
        for (category, operation) in [
            (Category::OnlyOnSource, self.only_on_source),
            (Category::OnlyOnTarget, self.only_on_target),
            (Category::Both, self.both),
        ] {
            if !category.allows(operation) {
                return Err(ReconcileError::invalid_strategy(category, operation));
            }
        }
        Ok(())
    }
}

/// Plans file operations without executing them
pub struct Resolver {
    registry: Arc<BackendRegistry>,
}

impl Resolver {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    /// Build the ordered plan: source-only, then target-only, then both-differ
    #[instrument(skip_all, fields(source = %diff.source, target = %diff.target))]
    pub fn resolve(
        &self,
        diff: &DiffArtifact,
        strategies: &ResolveStrategies,
    ) -> Result<ResolveArtifact> {
        strategies.validate()?;

        debug!(
            only_on_source = diff.only_on_source.len(),
            only_on_target = diff.only_on_target.len(),
            both = diff.both.len(),
            ?strategies,
            "Resolving"
        );

        let mut operations = self.resolve_only_on_source(diff, strategies.only_on_source)?;
        operations.extend(self.resolve_only_on_target(diff, strategies.only_on_target)?);
        operations.extend(resolve_both(&diff.both, strategies.both));

        let artifact = ResolveArtifact {
            source: diff.source.clone(),
            target: diff.target.clone(),
            created: created_now(),
            operations,
        };

        let summary = artifact.summary();
        info!(
            total = summary.total,
            copies = summary.copies,
            deletes = summary.deletes,
            overwrites = summary.overwrites,
            appends = summary.appends,
            "All resolved"
        );

        Ok(artifact)
    }

    fn resolve_only_on_source(
        &self,
        diff: &DiffArtifact,
        strategy: OperationType,
    ) -> Result<Vec<FileOperation>> {
        match strategy {
            OperationType::CopyToTarget => {
                let source_backend = self.registry.resolve_for(&diff.source)?;
                let target_backend = self.registry.resolve_for(&diff.target)?;

                diff.only_on_source
                    .iter()
                    .map(|entry| -> Result<FileOperation> {
                        let planned = counterpart(
                            source_backend.as_ref(),
                            &diff.source,
                            target_backend.as_ref(),
                            &diff.target,
                            entry,
                        )?;
                        Ok(FileOperation {
                            operation: strategy,
                            source: Some(entry.clone()),
                            target: Some(planned),
                        })
                    })
                    .collect()
            }
            OperationType::DeleteAtSource => Ok(diff
                .only_on_source
                .iter()
                .map(|entry| FileOperation {
                    operation: strategy,
                    source: Some(entry.clone()),
                    target: None,
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn resolve_only_on_target(
        &self,
        diff: &DiffArtifact,
        strategy: OperationType,
    ) -> Result<Vec<FileOperation>> {
        match strategy {
            OperationType::CopyToSource => {
                let source_backend = self.registry.resolve_for(&diff.source)?;
                let target_backend = self.registry.resolve_for(&diff.target)?;

                diff.only_on_target
                    .iter()
                    .map(|entry| -> Result<FileOperation> {
                        let planned = counterpart(
                            target_backend.as_ref(),
                            &diff.target,
                            source_backend.as_ref(),
                            &diff.source,
                            entry,
                        )?;
                        Ok(FileOperation {
                            operation: strategy,
                            source: Some(planned),
                            target: Some(entry.clone()),
                        })
                    })
                    .collect()
            }
            OperationType::DeleteAtTarget => Ok(diff
                .only_on_target
                .iter()
                .map(|entry| FileOperation {
                    operation: strategy,
                    source: None,
                    target: Some(entry.clone()),
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}

/// Both sides exist already, so every pair maps to one operation as is
fn resolve_both(both: &[BothEntry], strategy: OperationType) -> Vec<FileOperation> {
    if strategy.is_none() {
        return Vec::new();
    }

    both.iter()
        .map(|pair| FileOperation {
            operation: strategy,
            source: Some(pair.source.clone()),
            target: Some(pair.target.clone()),
        })
        .collect()
}

/// Planned description of `entry` mirrored from one root onto the other
fn counterpart(
    from_backend: &dyn Backend,
    from_root: &Url,
    to_backend: &dyn Backend,
    to_root: &Url,
    entry: &FileDescription,
) -> Result<FileDescription> {
    let fragments = from_backend.get_relative_fragments(from_root, &entry.full_name)?;
    let full_name = to_backend.compute_path(to_root, &fragments)?;
    Ok(FileDescription::planned(full_name))
}
