use thiserror::Error;

/// Core error type for the Taskflow graph runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Node not found in the active graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node with the same id is already part of the graph
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// Remote resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Remote persistence rejected or failed an operation
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Transport-level failure talking to the persistence service
    #[error("Communication error: {0}")]
    CommunicationError(String),

    /// Layout computation error
    #[error("Layout error: {0}")]
    LayoutError(String),

    /// Background sync error
    #[error("Sync error: {0}")]
    SyncError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    IOError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IOError(err.to_string())
    }
}

impl From<crate::domain::layout::LayoutError> for CoreError {
    fn from(err: crate::domain::layout::LayoutError) -> Self {
        CoreError::LayoutError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
