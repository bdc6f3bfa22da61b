use thiserror::Error;

/// Service-level error taxonomy. The HTTP layer maps these onto status codes:
/// Validation → 400, NotArmed → 403, InsufficientApprovals → 400,
/// NotFound → 404, Internal → 500.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Action plane is not armed")]
    NotArmed,

    #[error("Insufficient approvals ({approved}/{required})")]
    InsufficientApprovals { approved: u32, required: u32 },

    #[error("{0}")]
    Internal(String),
}

pub type OpsResult<T> = Result<T, OpsError>;
