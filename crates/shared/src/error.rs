#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid run status: {value}")]
    InvalidRunStatus { value: String },

    #[error("Invalid identifier {value}: {reason}")]
    InvalidIdentifier { value: String, reason: String },
}
