pub use dispatcher_shared::*;

/// Errores del dominio
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("Recipient not found: {recipient}")]
    RecipientNotFound { recipient: RecipientId },

    #[error("Broker transport error: {message}")]
    BrokerTransport { message: String },

    #[error("Unexpected broker response status: {status}")]
    UnexpectedBrokerResponse { status: u16 },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Deadline exceeded while waiting for a rate limit token")]
    DeadlineExceeded,

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: RunId },

    #[error("Run {run_id} is not a satellite run and cannot be canceled")]
    RunCancelType { run_id: RunId },

    #[error("Run {run_id} is not running and cannot be canceled")]
    RunNotCancelable { run_id: RunId },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Artifact fetch error: {message}")]
    Fetch { message: String },

    #[error("Failed to produce message to {topic}: {message}")]
    Producer { topic: String, message: String },

    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
