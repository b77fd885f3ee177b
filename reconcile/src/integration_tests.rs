//! End-to-end tests over temporary directory trees

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use url::Url;

use crate::backend::{Backend, FsBackend, MemoryBackend};
use crate::{
    diff_roots, read_text, resolve_patch, write_text, ArtifactFormat, BackendRegistry,
    DiffArtifact, ListOptions, OperationType, ResolveArtifact, ResolveStrategies,
};

/// Source and target trees plus an output directory, removed on drop
struct TestTrees {
    _dir: TempDir,
    source: PathBuf,
    target: PathBuf,
    output: PathBuf,
}

impl TestTrees {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        let target = dir.path().join("target");
        let output = dir.path().join("out");
        for path in [&source, &target, &output] {
            fs::create_dir_all(path).unwrap();
        }
        Self {
            _dir: dir,
            source,
            target,
            output,
        }
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Source and target of the reference scenario
    fn reference() -> Self {
        let trees = Self::new();
        Self::write(&trees.source, "1.txt", "one");
        Self::write(&trees.source, "2.txt", "two");
        Self::write(&trees.source, "docs/3.txt", "three");
        Self::write(&trees.target, "1.txt", "one");
        Self::write(&trees.target, "2.txt", "TWO");
        Self::write(&trees.target, "4.txt", "four");
        trees
    }

    fn source_uri(&self) -> Url {
        FsBackend::uri_for(&self.source).unwrap()
    }

    fn target_uri(&self) -> Url {
        FsBackend::uri_for(&self.target).unwrap()
    }

    fn output_uri(&self, name: &str) -> Url {
        FsBackend::uri_for(&self.output.join(name)).unwrap()
    }
}

fn fs_registry() -> Arc<BackendRegistry> {
    Arc::new(BackendRegistry::with_defaults(ListOptions::default()))
}

fn relative(registry: &BackendRegistry, root: &Url, full_name: &Url) -> String {
    registry
        .resolve_for(root)
        .unwrap()
        .get_relative_fragments(root, full_name)
        .unwrap()
        .join("/")
}

#[test_log::test(tokio::test)]
async fn test_diff_write_resolve_round() {
    let trees = TestTrees::reference();
    let registry = fs_registry();

    let diff = diff_roots(registry.clone(), &trees.source_uri(), &trees.target_uri())
        .await
        .unwrap();

    let summary = diff.summary();
    assert_eq!(summary.only_on_source, 1);
    assert_eq!(summary.only_on_target, 1);
    assert_eq!(summary.both, 1);
    assert_eq!(
        relative(&registry, &diff.source, &diff.only_on_source[0].full_name),
        "docs/3.txt"
    );
    assert_eq!(
        relative(&registry, &diff.target, &diff.only_on_target[0].full_name),
        "4.txt"
    );

    let patch = trees.output_uri("diff.json");
    let text = ArtifactFormat::Json.format(&diff).unwrap();
    write_text(&registry, Some(&patch), &text).await.unwrap();
    assert!(trees.output.join("diff.json").exists());

    let strategies = ResolveStrategies {
        only_on_source: OperationType::CopyToTarget,
        only_on_target: OperationType::DeleteAtTarget,
        both: OperationType::OverwriteAtTarget,
    };
    let plan = resolve_patch(registry.clone(), &patch, ArtifactFormat::Json, &strategies)
        .await
        .unwrap();

    assert_eq!(plan.source, diff.source);
    assert_eq!(plan.target, diff.target);
    assert_eq!(plan.operations.len(), 3);

    let copy = &plan.operations[0];
    assert_eq!(copy.operation, OperationType::CopyToTarget);
    let planned = copy.target.as_ref().unwrap();
    assert_eq!(relative(&registry, &plan.target, &planned.full_name), "docs/3.txt");
    assert!(planned.content_fingerprint.is_empty());
    assert!(!trees.target.join("docs/3.txt").exists(), "plans are never executed");

    assert_eq!(plan.operations[1].operation, OperationType::DeleteAtTarget);
    assert_eq!(plan.operations[2].operation, OperationType::OverwriteAtTarget);
    assert!(trees.target.join("4.txt").exists());
}

#[tokio::test]
async fn test_yaml_artifacts() {
    let trees = TestTrees::reference();
    let registry = fs_registry();

    let diff = diff_roots(registry.clone(), &trees.source_uri(), &trees.target_uri())
        .await
        .unwrap();

    let patch = trees.output_uri("diff.yaml");
    write_text(&registry, Some(&patch), &ArtifactFormat::Yaml.format(&diff).unwrap())
        .await
        .unwrap();

    let text = read_text(&registry, &patch).await.unwrap();
    assert!(text.contains("OnlyOnSource:"));
    let parsed: DiffArtifact = ArtifactFormat::Yaml.parse(&text).unwrap();
    assert_eq!(parsed, diff);

    let plan = resolve_patch(
        registry.clone(),
        &patch,
        ArtifactFormat::Yaml,
        &ResolveStrategies {
            only_on_target: OperationType::CopyToSource,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let output = trees.output_uri("plan.yaml");
    write_text(&registry, Some(&output), &ArtifactFormat::Yaml.format(&plan).unwrap())
        .await
        .unwrap();
    let written: ResolveArtifact =
        ArtifactFormat::Yaml.parse(&read_text(&registry, &output).await.unwrap()).unwrap();
    assert_eq!(written.operations.len(), 1);
    assert_eq!(written.operations[0].operation, OperationType::CopyToSource);
}

#[tokio::test]
async fn test_output_overwrites_existing_file() {
    let trees = TestTrees::reference();
    let registry = fs_registry();
    fs::write(trees.output.join("diff.json"), "x".repeat(4096)).unwrap();

    let diff = diff_roots(registry.clone(), &trees.source_uri(), &trees.target_uri())
        .await
        .unwrap();
    let patch = trees.output_uri("diff.json");
    write_text(&registry, Some(&patch), &ArtifactFormat::Json.format(&diff).unwrap())
        .await
        .unwrap();

    let text = fs::read_to_string(trees.output.join("diff.json")).unwrap();
    let parsed: DiffArtifact = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, diff);
}

#[tokio::test]
async fn test_output_into_missing_directory_fails() {
    let trees = TestTrees::reference();
    let registry = fs_registry();

    let output = FsBackend::uri_for(&trees.output.join("nested/diff.json")).unwrap();
    let err = write_text(&registry, Some(&output), "{}").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_identical_trees_yield_empty_diff() {
    let trees = TestTrees::new();
    for root in [&trees.source, &trees.target] {
        TestTrees::write(root, "a.txt", "same");
        TestTrees::write(root, "nested/deeper/b.bin", "bytes");
    }

    let diff = diff_roots(fs_registry(), &trees.source_uri(), &trees.target_uri())
        .await
        .unwrap();
    assert!(diff.is_empty());
}

#[tokio::test]
async fn test_patch_stored_in_memory_backend() {
    let trees = TestTrees::reference();
    let memory = MemoryBackend::default();
    memory.create_dir(&Url::parse("mem:///patches").unwrap()).unwrap();

    let mut registry = BackendRegistry::with_defaults(ListOptions::default());
    registry.register(Arc::new(memory.clone()));
    let registry = Arc::new(registry);

    let diff = diff_roots(registry.clone(), &trees.source_uri(), &trees.target_uri())
        .await
        .unwrap();
    let patch = Url::parse("mem:///patches/diff.json").unwrap();
    write_text(&registry, Some(&patch), &ArtifactFormat::Json.format(&diff).unwrap())
        .await
        .unwrap();
    assert!(!memory.read(&patch).unwrap().is_empty());

    let plan = resolve_patch(
        registry,
        &patch,
        ArtifactFormat::Json,
        &ResolveStrategies {
            both: OperationType::AppendAtSource,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(plan.operations.len(), 1);
    assert_eq!(plan.operations[0].operation, OperationType::AppendAtSource);
    assert!(memory.list(&Url::parse("mem:///patches").unwrap()).await.unwrap().len() == 1);
}
