pub mod collaborators;
pub mod identity;
pub mod money;

/// Central error taxonomy for the order engine.
///
/// `Validation`, `NotFound` and `InvalidTransition` indicate caller misuse
/// and surface directly. `ConcurrentModification` surfaces only after the
/// engine has exhausted its internal retries. `Dependency` failures from
/// side-effect collaborators are logged and suppressed, never failing the
/// primary state transition. `Persistence` on the primary write is fatal to
/// the operation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
    #[error("Persistence failure: {0}")]
    Persistence(String),
    #[error("Collaborator call failed: {0}")]
    Dependency(String),
}

impl EngineError {
    pub fn invalid_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
