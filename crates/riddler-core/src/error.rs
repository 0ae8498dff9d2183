use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiddleError {
    // Graph construction errors
    #[error("Step name '{0}' is already used")]
    DuplicateStep(String),

    #[error("Step name '{0}' is reserved")]
    ReservedName(String),

    #[error("Step name '{0}' is not a valid identifier")]
    InvalidName(String),

    #[error("Step '{step}' depends on non-existent step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Circular dependency detected involving step: {0}")]
    CircularDependency(String),

    #[error("Step '{0}' has merge function but no 'after' dependencies")]
    MergeWithoutDependency(String),

    #[error("Yield point '{0}' has no step to follow")]
    YieldWithoutStep(String),

    // Execution errors
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    // Session protocol errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Step mismatch: expected {expected}, session is at {actual}")]
    StepMismatch { expected: String, actual: String },

    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Search errors
    #[error("Search failed: {0}")]
    Search(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RiddleError {
    /// Whether this error was raised while declaring or validating a graph.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            RiddleError::DuplicateStep(_)
                | RiddleError::ReservedName(_)
                | RiddleError::InvalidName(_)
                | RiddleError::UnknownDependency { .. }
                | RiddleError::CircularDependency(_)
                | RiddleError::MergeWithoutDependency(_)
                | RiddleError::YieldWithoutStep(_)
        )
    }

    /// Whether this error reflects a caller driving a session out of order.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            RiddleError::SessionNotFound(_) | RiddleError::StepMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RiddleError>;
