//! Data model shared by the diff and resolve stages

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ReconcileError;

/// Textual format of every `Created` timestamp
pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC time rendered with [`CREATED_FORMAT`]
pub fn created_now() -> String {
    Utc::now().format(CREATED_FORMAT).to_string()
}

/// Storage tier reported by a backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StorageTier {
    #[default]
    NotSupported,
    Hot,
    Cool,
    Archive,
}

/// Identity and content summary of one entry
///
/// Only `full_name` and `content_fingerprint` take part in comparison, the
/// remaining fields are informational.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FileDescription {
    /// Absolute identifier, scheme included
    pub full_name: Url,
    /// Hex digest of the content, empty while a copy is only planned
    pub content_fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tier: StorageTier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl FileDescription {
    /// Description carrying only identity and fingerprint
    pub fn new(full_name: Url, content_fingerprint: impl Into<String>) -> Self {
        Self {
            full_name,
            content_fingerprint: content_fingerprint.into(),
            size: None,
            created_at: None,
            modified_at: None,
            tier: StorageTier::NotSupported,
            tags: Vec::new(),
        }
    }

    /// Counterpart of a file that does not exist yet
    pub fn planned(full_name: Url) -> Self {
        Self::new(full_name, String::new())
    }
}

/// Pair of entries present on both sides with different content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct BothEntry {
    pub source: FileDescription,
    pub target: FileDescription,
}

/// Result of one reconciliation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DiffArtifact {
    pub source: Url,
    pub target: Url,
    pub created: String,
    #[serde(default)]
    pub only_on_target: Vec<FileDescription>,
    #[serde(default)]
    pub only_on_source: Vec<FileDescription>,
    #[serde(default)]
    pub both: Vec<BothEntry>,
}

/// Counts of a diff artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub only_on_source: usize,
    pub only_on_target: usize,
    pub both: usize,
}

impl DiffArtifact {
    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            only_on_source: self.only_on_source.len(),
            only_on_target: self.only_on_target.len(),
            both: self.both.len(),
        }
    }

    /// True when the two trees hold the same files with the same content
    pub fn is_empty(&self) -> bool {
        self.only_on_source.is_empty() && self.only_on_target.is_empty() && self.both.is_empty()
    }
}

/// Directive kinds of a resolution plan
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationType {
    #[default]
    Unknown,
    CopyToSource,
    CopyToTarget,
    OverwriteAtSource,
    OverwriteAtTarget,
    DeleteAtSource,
    DeleteAtTarget,
    AppendAtSource,
    AppendAtTarget,
    Skip,
}

impl OperationType {
    pub const ALL: [OperationType; 10] = [
        OperationType::Unknown,
        OperationType::CopyToSource,
        OperationType::CopyToTarget,
        OperationType::OverwriteAtSource,
        OperationType::OverwriteAtTarget,
        OperationType::DeleteAtSource,
        OperationType::DeleteAtTarget,
        OperationType::AppendAtSource,
        OperationType::AppendAtTarget,
        OperationType::Skip,
    ];

    /// Symbolic name, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Unknown => "Unknown",
            OperationType::CopyToSource => "CopyToSource",
            OperationType::CopyToTarget => "CopyToTarget",
            OperationType::OverwriteAtSource => "OverwriteAtSource",
            OperationType::OverwriteAtTarget => "OverwriteAtTarget",
            OperationType::DeleteAtSource => "DeleteAtSource",
            OperationType::DeleteAtTarget => "DeleteAtTarget",
            OperationType::AppendAtSource => "AppendAtSource",
            OperationType::AppendAtTarget => "AppendAtTarget",
            OperationType::Skip => "Skip",
        }
    }

    /// Whether this value selects the "none" strategy
    pub fn is_none(&self) -> bool {
        matches!(self, OperationType::Unknown)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = ReconcileError;

    /// Accepts `CopyToTarget`, `copy-to-target`, `copy_to_target` and `none`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        if normalized == "none" {
            return Ok(OperationType::Unknown);
        }

        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str().to_lowercase() == normalized)
            .ok_or_else(|| ReconcileError::UnknownOperation(s.to_string()))
    }
}

/// One unit of the resolution plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FileOperation {
    pub operation: OperationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<FileDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<FileDescription>,
}

/// Ordered plan of file operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResolveArtifact {
    pub source: Url,
    pub target: Url,
    pub created: String,
    #[serde(default)]
    pub operations: Vec<FileOperation>,
}

/// Counts of a resolve artifact by directive family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationSummary {
    pub total: usize,
    pub copies: usize,
    pub overwrites: usize,
    pub appends: usize,
    pub deletes: usize,
    pub skips: usize,
}

impl ResolveArtifact {
    pub fn summary(&self) -> OperationSummary {
        let mut summary = OperationSummary {
            total: self.operations.len(),
            ..Default::default()
        };

        for op in &self.operations {
            match op.operation {
                OperationType::CopyToSource | OperationType::CopyToTarget => summary.copies += 1,
                OperationType::OverwriteAtSource | OperationType::OverwriteAtTarget => {
                    summary.overwrites += 1
                }
                OperationType::AppendAtSource | OperationType::AppendAtTarget => {
                    summary.appends += 1
                }
                OperationType::DeleteAtSource | OperationType::DeleteAtTarget => {
                    summary.deletes += 1
                }
                OperationType::Skip | OperationType::Unknown => summary.skips += 1,
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("CopyToTarget", OperationType::CopyToTarget)]
    #[test_case("copy-to-target", OperationType::CopyToTarget)]
    #[test_case("overwrite_at_source", OperationType::OverwriteAtSource)]
    #[test_case("DELETE-AT-TARGET", OperationType::DeleteAtTarget)]
    #[test_case("none", OperationType::Unknown)]
    #[test_case("unknown", OperationType::Unknown)]
    #[test_case("skip", OperationType::Skip)]
    fn test_parse_operation(input: &str, expected: OperationType) {
        assert_eq!(input.parse::<OperationType>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_operation() {
        let err = "move-to-target".parse::<OperationType>().unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownOperation(s) if s == "move-to-target"));
    }

    #[test]
    fn test_display_matches_serialized_name() {
        for op in OperationType::ALL {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op));
        }
    }

    #[test]
    fn test_created_format() {
        let created = created_now();
        assert!(created.ends_with('Z'));
        assert!(chrono::NaiveDateTime::parse_from_str(&created, CREATED_FORMAT).is_ok());
    }

    #[test]
    fn test_file_description_field_names() {
        let mut description = FileDescription::new(
            Url::parse("fs:///data/1.txt").unwrap(),
            "abc",
        );
        description.size = Some(3);

        let value = serde_json::to_value(&description).unwrap();
        assert_eq!(value["FullName"], "fs:///data/1.txt");
        assert_eq!(value["ContentFingerprint"], "abc");
        assert_eq!(value["Size"], 3);
        assert_eq!(value["Tier"], "NotSupported");
        assert!(value.get("CreatedAt").is_none());
        assert!(value.get("Tags").is_none());
    }

    #[test]
    fn test_file_operation_omits_missing_side() {
        let op = FileOperation {
            operation: OperationType::DeleteAtSource,
            source: Some(FileDescription::new(Url::parse("fs:///s/a").unwrap(), "1")),
            target: None,
        };

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["Operation"], "DeleteAtSource");
        assert!(value.get("Target").is_none());
    }

    #[test]
    fn test_resolve_summary() {
        let description = FileDescription::new(Url::parse("fs:///s/a").unwrap(), "1");
        let op = |operation| FileOperation {
            operation,
            source: Some(description.clone()),
            target: None,
        };

        let artifact = ResolveArtifact {
            source: Url::parse("fs:///s").unwrap(),
            target: Url::parse("fs:///t").unwrap(),
            created: created_now(),
            operations: vec![
                op(OperationType::CopyToTarget),
                op(OperationType::CopyToSource),
                op(OperationType::DeleteAtTarget),
                op(OperationType::OverwriteAtSource),
                op(OperationType::AppendAtTarget),
            ],
        };

        let summary = artifact.summary();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.copies, 2);
        assert_eq!(summary.deletes, 1);
        assert_eq!(summary.overwrites, 1);
        assert_eq!(summary.appends, 1);
        assert_eq!(summary.skips, 0);
    }
}
