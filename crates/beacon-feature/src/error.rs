//! Error types for the composition engine

use thiserror::Error;

use crate::feature::FeatureId;
use crate::store::ObjectKind;

/// Errors raised while registering, composing, or driving features
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Two features registered under the same identifier
    #[error("feature '{id}' is already registered")]
    DuplicateFeature {
        /// The colliding identifier
        id: FeatureId,
    },

    /// A feature could not interpret the spec it was given
    #[error("feature '{feature}' rejected the spec: {message}")]
    InvalidSpec {
        /// Feature that failed to configure
        feature: FeatureId,
        /// What was wrong with the spec
        message: String,
    },

    /// A merge policy cannot be applied to this kind of entry
    #[error("cannot merge {kind} '{key}': {reason}")]
    Merge {
        /// Entry kind (env var, volume mount, ...)
        kind: &'static str,
        /// Logical key of the entry
        key: String,
        /// Why the merge is unsupported
        reason: String,
    },

    /// Two features wrote different content under the same store key
    #[error("{kind} {namespace}/{name} written with different content by '{first}' and '{second}'")]
    DependencyConflict {
        /// Object kind
        kind: ObjectKind,
        /// Object namespace (empty for cluster-scoped)
        namespace: String,
        /// Object name
        name: String,
        /// Feature that wrote the stored content
        first: String,
        /// Feature whose write was rejected
        second: String,
    },

    /// A feature failed to register one of its dependencies
    #[error("feature '{feature}' failed to register dependencies: {message}")]
    Dependency {
        /// Feature that failed
        feature: FeatureId,
        /// What failed
        message: String,
    },

    /// Dependency failures collected across several features
    #[error("{} dependency error(s): {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<FeatureError>),

    /// Error from the shared crate (validation, serialization)
    #[error(transparent)]
    Common(#[from] beacon_common::Error),
}

impl FeatureError {
    /// Configure failure for `feature`
    pub fn invalid_spec(feature: FeatureId, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            feature,
            message: message.into(),
        }
    }

    /// Merge failure for an entry kind and key
    pub fn merge(kind: &'static str, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Merge {
            kind,
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: none is `Ok`, one is returned as is,
    /// several become [`FeatureError::Aggregate`]
    pub fn aggregate(mut errors: Vec<FeatureError>) -> Result<(), FeatureError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }
}

impl From<serde_json::Error> for FeatureError {
    fn from(err: serde_json::Error) -> Self {
        Self::Common(beacon_common::Error::from(err))
    }
}

fn join_errors(errors: &[FeatureError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_ok() {
        assert!(FeatureError::aggregate(Vec::new()).is_ok());
    }

    #[test]
    fn test_aggregate_single_is_unwrapped() {
        let err = FeatureError::aggregate(vec![FeatureError::invalid_spec(
            FeatureId::new("apm"),
            "bad port",
        )])
        .unwrap_err();
        assert!(matches!(err, FeatureError::InvalidSpec { .. }));
    }

    #[test]
    fn test_aggregate_message_lists_all() {
        let err = FeatureError::aggregate(vec![
            FeatureError::Dependency {
                feature: FeatureId::new("a"),
                message: "first".to_string(),
            },
            FeatureError::Dependency {
                feature: FeatureId::new("b"),
                message: "second".to_string(),
            },
        ])
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("2 dependency error(s)"));
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }

    #[test]
    fn test_duplicate_feature_message() {
        let err = FeatureError::DuplicateFeature {
            id: FeatureId::new("dogstatsd"),
        };
        assert_eq!(err.to_string(), "feature 'dogstatsd' is already registered");
    }
}
