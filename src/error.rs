//! Error types for the tree adapter

use thiserror::Error;

use crate::model::NodeId;

pub type Result<T> = std::result::Result<T, AdapterError>;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Persistence manager not initialized")]
    NotInitialized,

    #[error("Persistence manager already initialized")]
    AlreadyInitialized,

    /// Identity resolves to no known node shape.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("No such property: {0}")]
    NoSuchProperty(String),

    #[error("No references to node: {0}")]
    NoReferences(NodeId),

    #[error("Node has no resolvable external identifier: {0}")]
    Unresolved(NodeId),

    #[error("External identifier '{pid}' already owned by {owner}, cannot assign to {node}")]
    IdentifierCollision {
        pid: String,
        owner: NodeId,
        node: NodeId,
    },

    // Connector failures
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Object already exists: {0}")]
    ObjectExists(String),

    #[error("Stream '{stream}' not found on {pid}")]
    StreamNotFound { pid: String, stream: String },

    #[error("Property '{uri}' not found on {pid}")]
    PropertyNotFound { pid: String, uri: String },

    #[error("Invalid external identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Malformed literal: {0}")]
    MalformedLiteral(String),

    // Query errors
    #[error("Query parse error at {pos}: {message}")]
    QueryParse { pos: usize, message: String },

    #[error("Query translation failed: {}", .0.join("; "))]
    QueryTranslation(Vec<String>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdapterError {
    /// Stable error code for callers that surface errors across a boundary
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::NotInitialized => "NOT_INITIALIZED",
            AdapterError::AlreadyInitialized => "ALREADY_INITIALIZED",
            AdapterError::UnknownNode(_) => "UNKNOWN_NODE",
            AdapterError::NoSuchProperty(_) => "NO_SUCH_PROPERTY",
            AdapterError::NoReferences(_) => "NO_REFERENCES",
            AdapterError::Unresolved(_) => "UNRESOLVED",
            AdapterError::IdentifierCollision { .. } => "IDENTIFIER_COLLISION",
            AdapterError::ObjectNotFound(_)
            | AdapterError::ObjectExists(_)
            | AdapterError::StreamNotFound { .. }
            | AdapterError::PropertyNotFound { .. }
            | AdapterError::InvalidIdentifier(_) => "CONNECTOR_FAILURE",
            AdapterError::QueryParse { .. } => "QUERY_PARSE",
            AdapterError::QueryTranslation(_) => "QUERY_TRANSLATION",
            AdapterError::InvalidConfig(_) => "INVALID_CONFIG",
            _ => "INTERNAL_ERROR",
        }
    }

    /// True for failures reported by the external repository
    pub fn is_connector_failure(&self) -> bool {
        self.code() == "CONNECTOR_FAILURE"
    }
}

impl<T> From<std::sync::PoisonError<T>> for AdapterError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        AdapterError::LockPoisoned
    }
}
