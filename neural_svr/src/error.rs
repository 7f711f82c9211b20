//! Error types for neural_svr.

use svr_core::CoreError;
use thiserror::Error;

/// Errors raised while configuring, training or querying a reconstruction.
#[derive(Error, Debug)]
pub enum NeuralSvrError {
    /// The configuration is invalid; detected before any optimisation.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// Input stacks or slices are missing or malformed.
    #[error("invalid input data: {message}")]
    DataValidation {
        /// Description of the data problem.
        message: String,
    },

    /// A NaN or infinity appeared in the loss or the gradients.
    #[error("numerical divergence at iteration {iteration}: non-finite {quantity}")]
    NumericalDivergence {
        /// Iteration at which the value was observed.
        iteration: usize,
        /// Which quantity went non-finite.
        quantity: String,
    },

    /// The run would not fit the configured memory budget.
    #[error("resource exhaustion: {required_bytes} bytes required, {available_bytes} available")]
    ResourceExhaustion {
        /// Estimated peak bytes.
        required_bytes: u64,
        /// Configured budget.
        available_bytes: u64,
    },

    /// An operation was requested in the wrong trainer state.
    #[error("cannot {action} while {state}")]
    InvalidState {
        /// Current trainer state.
        state: String,
        /// Rejected action.
        action: String,
    },

    /// Snapshot bytes could not be produced or decoded.
    #[error("snapshot error: {message}")]
    Snapshot {
        /// Description of the error.
        message: String,
    },
}

impl NeuralSvrError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a data validation error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::DataValidation {
            message: message.into(),
        }
    }
}

impl From<CoreError> for NeuralSvrError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidMilestones { .. } | CoreError::InvalidParameter { .. } => {
                Self::config(err.to_string())
            }
            _ => Self::data(err.to_string()),
        }
    }
}

/// Result type for neural_svr operations.
pub type Result<T> = std::result::Result<T, NeuralSvrError>;
