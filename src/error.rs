//! Domain-specific error types for earnings-war-room

use thiserror::Error;

use crate::clients::traits::ModelError;
use crate::extract::ExtractionError;

/// Main error type for the insight generation pipeline
#[derive(Error, Debug)]
pub enum WarRoomError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Data load error ({source_name}): {message}")]
    DataLoad {
        source_name: String,
        message: String,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("{workflow} generation is already in flight")]
    InFlight { workflow: String },

    #[error("{workflow} result discarded: superseded by a newer selection")]
    Superseded { workflow: String },

    #[error("No question selected")]
    NoQuestionSelected,

    #[error("Reference data unavailable: {message}")]
    DataUnavailable { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WarRoomError {
    /// True for the failures the session swallows into a fallback artifact.
    pub fn is_generation_failure(&self) -> bool {
        matches!(self, WarRoomError::Model(_) | WarRoomError::Extraction(_))
    }
}

impl From<anyhow::Error> for WarRoomError {
    fn from(err: anyhow::Error) -> Self {
        WarRoomError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for WarRoomError {
    fn from(err: serde_json::Error) -> Self {
        WarRoomError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for WarRoomError {
    fn from(err: std::io::Error) -> Self {
        WarRoomError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<toml::de::Error> for WarRoomError {
    fn from(err: toml::de::Error) -> Self {
        WarRoomError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for war-room operations
pub type Result<T> = std::result::Result<T, WarRoomError>;
