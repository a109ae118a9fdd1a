use thiserror::Error;

/// Main error type for the DNP3 port/router stack
#[derive(Error, Debug)]
pub enum DnpError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Frame invalid: {0}")]
    FrameInvalid(String),

    /// A name or address is already registered
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A name or address is not registered
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation is not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The owner of a channel or handle has gone away
    #[error("Closed: {0}")]
    Closed(String),
}

impl DnpError {
    /// Check if the error is a registration conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, DnpError::Conflict(_))
    }

    /// Check if the error is a missing registration
    pub fn is_not_found(&self) -> bool {
        matches!(self, DnpError::NotFound(_))
    }
}

/// Result type alias for DNP3 stack operations
pub type DnpResult<T> = Result<T, DnpError>;
