use thiserror::Error;

use crate::config::LoadError;

/// Failures during process startup (configuration + telemetry).
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("configuration error: {0}")]
    Config(#[from] LoadError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
