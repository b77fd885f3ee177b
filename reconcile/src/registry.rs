//! Scheme to backend lookup

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;
use url::Url;

use crate::backend::{Backend, FsBackend, ListOptions};
use crate::error::{ReconcileError, Result};

/// Registered backends keyed by scheme
///
/// Unknown schemes always fail; there is no fallback backend.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving the `fs` scheme
    pub fn with_defaults(options: ListOptions) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FsBackend::new(options)));
        registry
    }

    /// Register a backend under its scheme, returning the one it replaces
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> Option<Arc<dyn Backend>> {
        let scheme = backend.scheme().to_lowercase();
        self.backends.insert(scheme, backend)
    }

    /// Backend serving `scheme`
    pub fn resolve(&self, scheme: &str) -> Result<Arc<dyn Backend>> {
        trace!(scheme, "Resolve backend");
        self.backends
            .get(&scheme.to_lowercase())
            .cloned()
            .ok_or_else(|| ReconcileError::UnsupportedScheme(scheme.to_string()))
    }

    /// Backend serving the scheme of `uri`
    pub fn resolve_for(&self, uri: &Url) -> Result<Arc<dyn Backend>> {
        self.resolve(uri.scheme())
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn test_defaults_serve_fs() {
        let registry = BackendRegistry::with_defaults(ListOptions::default());
        assert_eq!(registry.resolve("fs").unwrap().scheme(), "fs");
        assert_eq!(registry.schemes(), vec!["fs"]);
    }

    #[test]
    fn test_unknown_scheme_fails() {
        let registry = BackendRegistry::with_defaults(ListOptions::default());
        let err = registry.resolve("s3").err().unwrap();
        assert!(matches!(err, ReconcileError::UnsupportedScheme(ref s) if s == "s3"));
    }

    #[test]
    fn test_empty_registry_has_no_default() {
        let registry = BackendRegistry::new();
        assert!(registry.resolve("fs").is_err());
    }

    #[test]
    fn test_resolve_for_uri_and_replace() {
        let mut registry = BackendRegistry::new();
        assert!(registry.register(Arc::new(MemoryBackend::default())).is_none());
        assert!(registry.register(Arc::new(MemoryBackend::default())).is_some());

        let uri = Url::parse("MEM:///data/file").unwrap();
        assert_eq!(registry.resolve_for(&uri).unwrap().scheme(), "mem");
    }
}
