//! Error types for the reconcile library

use std::path::PathBuf;

use url::Url;

/// Result type alias for reconcile operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Comprehensive error type for reconcile operations
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested entry or root does not exist
    #[error("Not found: {uri}")]
    NotFound { uri: String },

    /// An identifier was handed to a backend of another scheme
    #[error("Scheme '{actual}' not supported by the '{expected}' backend (uri: {uri})")]
    SchemeMismatch {
        expected: String,
        actual: String,
        uri: String,
    },

    /// No backend registered for the scheme
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Strategy not permitted for its category
    #[error("Strategy for {category} cannot have value {operation}")]
    InvalidStrategy { category: String, operation: String },

    /// Text that names no operation kind
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Artifact format name that is neither json nor yaml
    #[error("Unknown artifact format '{0}', expected json or yaml")]
    UnknownFormat(String),

    /// Identifier is not located under the given root
    #[error("'{uri}' is not located under root '{root}'")]
    OutsideRoot { root: String, uri: String },

    /// Two distinct entries normalize to the same relative path
    #[error("Join key '{key}' is shared by '{first}' and '{second}'")]
    JoinKeyCollision {
        key: String,
        first: String,
        second: String,
    },

    /// Identifier cannot be mapped onto the backend's storage
    #[error("Invalid uri '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    /// URL parse errors
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Directory scanning errors
    #[error("Directory scan error at '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// Hash computation errors
    #[error("Hash computation error for '{uri}': {message}")]
    Hash { uri: String, message: String },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization/deserialization errors
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ReconcileError {
    /// Create a new not-found error
    pub fn not_found(uri: impl ToString) -> Self {
        Self::NotFound {
            uri: uri.to_string(),
        }
    }

    /// Create a new scheme mismatch error
    pub fn scheme_mismatch(expected: impl Into<String>, uri: &Url) -> Self {
        Self::SchemeMismatch {
            expected: expected.into(),
            actual: uri.scheme().to_string(),
            uri: uri.to_string(),
        }
    }

    /// Create a new invalid strategy error
    pub fn invalid_strategy(category: impl ToString, operation: impl ToString) -> Self {
        Self::InvalidStrategy {
            category: category.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Create a new outside-root error
    pub fn outside_root(root: &Url, uri: &Url) -> Self {
        Self::OutsideRoot {
            root: root.to_string(),
            uri: uri.to_string(),
        }
    }

    /// Create a new invalid uri error
    pub fn invalid_uri(uri: impl ToString, message: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.to_string(),
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new hash error
    pub fn hash_error(uri: impl ToString, message: impl Into<String>) -> Self {
        Self::Hash {
            uri: uri.to_string(),
            message: message.into(),
        }
    }

    /// Whether this error means the entry does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
