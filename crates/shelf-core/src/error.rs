//! Error types for the shelf control layer

use thiserror::Error;

/// Result type for shelf operations
pub type Result<T> = std::result::Result<T, ShelfError>;

/// Errors that can occur while sequencing calls into an object store engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShelfError {
    /// The host environment provides no storage engine
    #[error("storage engine unsupported: {0}")]
    Unsupported(String),

    /// Empty store name, malformed key or range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Required object store is absent after open
    #[error("object store '{0}' does not exist")]
    StoreNotFound(String),

    /// The value does not carry the store's in-line key field
    #[error("object store '{store}' uses in-line keys and the value has no '{key_path}' field")]
    KeyPathMismatch { store: String, key_path: String },

    /// Another open connection prevents the version change
    #[error("upgrade of '{database}' to version {version} blocked by an open connection")]
    UpgradeBlocked { database: String, version: u64 },

    /// Opaque failure reported by the engine, carried verbatim
    #[error("{name}: {message}")]
    Engine { name: String, message: String },

    /// Value conversion at the host boundary failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ShelfError {
    /// Build an engine error from a DOMException-style name and message.
    pub fn engine(name: impl Into<String>, message: impl Into<String>) -> Self {
        ShelfError::Engine {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Taxonomy name used when the error crosses into JavaScript.
    pub fn kind(&self) -> &'static str {
        match self {
            ShelfError::Unsupported(_) => "CapabilityUnsupportedError",
            ShelfError::InvalidArgument(_) => "InvalidArgumentError",
            ShelfError::StoreNotFound(_) => "StoreNotFoundError",
            ShelfError::KeyPathMismatch { .. } => "KeyPathMismatchError",
            ShelfError::UpgradeBlocked { .. } => "UpgradeBlockedError",
            ShelfError::Engine { .. } => "EngineOperationError",
            ShelfError::Serialization(_) => "SerializationError",
        }
    }

    /// Engine error name (`DataError`, `VersionError`, ...) if this is an engine failure.
    pub fn engine_name(&self) -> Option<&str> {
        match self {
            ShelfError::Engine { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_store_not_found(&self) -> bool {
        matches!(self, ShelfError::StoreNotFound(_))
    }
}

impl From<serde_json::Error> for ShelfError {
    fn from(err: serde_json::Error) -> Self {
        ShelfError::Serialization(err.to_string())
    }
}
