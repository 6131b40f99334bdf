//! Rota Executor Error Types

use rota_core::{ErrorClass, RotaError};
use thiserror::Error;

/// Rota Executor Result type
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Rota Executor Error
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Engine rejection, reason preserved
    #[error(transparent)]
    Engine(#[from] RotaError),

    /// Pricing still unavailable after every retry
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: RotaError },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ExecutorError {
    /// Underlying engine error, if any
    pub fn engine_error(&self) -> Option<&RotaError> {
        match self {
            ExecutorError::Engine(e) => Some(e),
            ExecutorError::RetryExhausted { last_error, .. } => Some(last_error),
            ExecutorError::Configuration(_) => None,
        }
    }

    /// Failure class of the underlying engine error
    pub fn class(&self) -> ErrorClass {
        self.engine_error()
            .map(RotaError::class)
            .unwrap_or(ErrorClass::Internal)
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutorError::Engine(e) if e.is_retryable())
    }
}
