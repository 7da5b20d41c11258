//! Error types shared across Beacon crates
//!
//! Errors carry the resource they concern so that a failed pass can be
//! attributed without re-reading logs.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Beacon operations
#[derive(Debug, Error)]
pub enum Error {
    /// Validation error for a BeaconAgent spec
    #[error("validation error for {agent}: {message}")]
    Validation {
        /// Name of the BeaconAgent with invalid configuration
        agent: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.features.dogstatsd")
        field: Option<String>,
    },

    /// Legacy schema could not be mapped onto the current schema
    #[error("conversion error for {agent}: {message}")]
    Conversion {
        /// Name of the BeaconAgent being converted
        agent: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "telemetry", "render")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            agent: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with agent context and field path
    pub fn validation_for_field(
        agent: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            agent: agent.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a conversion error for a legacy BeaconAgent
    pub fn conversion(agent: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conversion {
            agent: agent.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error for a specific resource kind
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Name of the BeaconAgent this error concerns, if known
    pub fn agent(&self) -> Option<&str> {
        match self {
            Self::Validation { agent, .. } | Self::Conversion { agent, .. } => {
                if agent == UNKNOWN_CONTEXT {
                    None
                } else {
                    Some(agent)
                }
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
