use thiserror::Error;

/// The supervisor's core error taxonomy.
///
/// Variants map 1:1 onto the error-kind table of the control loop design:
/// each carries the recovery policy in its name, not just its message, so
/// the driver can match on `SupervisorError` directly rather than inspect
/// strings.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("queue is empty")]
    QueueEmpty,

    #[error("provider call failed transiently: {0}")]
    ProviderTransient(String),

    #[error("provider quota exhausted: {0}")]
    ProviderQuotaExhausted(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("validation is ambiguous: {0}")]
    ValidationAmbiguous(String),

    #[error("agent asked a question instead of completing: {0}")]
    AgentAskedQuestion(String),

    #[error("state integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("task schema invalid: {0}")]
    TaskSchemaInvalid(String),

    #[error("state store error: {0}")]
    StateStore(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    /// The `halt_reason` string the driver should record when this error
    /// is unrecoverable. Returns `None` for kinds handled by retry/backoff
    /// without halting.
    #[must_use]
    pub fn halt_reason(&self) -> Option<&'static str> {
        match self {
            Self::ValidationAmbiguous(_) => Some("AMBIGUITY"),
            Self::AgentAskedQuestion(_) => Some("ASKED_QUESTION"),
            Self::ProviderQuotaExhausted(_) => Some("RESOURCE_EXHAUSTED"),
            Self::IntegrityViolation(_) | Self::Internal(_) => Some("INTERNAL_ERROR"),
            Self::IoFailure(_) => Some("INTERNAL_ERROR"),
            Self::QueueEmpty
            | Self::ProviderTransient(_)
            | Self::ValidationFailed(_)
            | Self::TaskSchemaInvalid(_)
            | Self::StateStore(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
