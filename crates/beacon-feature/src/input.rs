//! Canonical input seen by every feature
//!
//! Both schema generations are normalized into an [`AgentInput`] before any
//! feature runs, so each feature configures itself from one shape only.

use beacon_common::crd::conversion::convert_legacy_agent;
use beacon_common::crd::{v1alpha1, v2alpha1};
use beacon_common::meta::{name_of, namespace_of};
use serde_json::Value;

use crate::{FeatureError, Result};

/// Identity and current-schema spec of one BeaconAgent
#[derive(Clone, Debug, PartialEq)]
pub struct AgentInput {
    /// BeaconAgent name
    pub name: String,
    /// BeaconAgent namespace
    pub namespace: String,
    /// Spec in the current schema
    pub spec: v2alpha1::BeaconAgentSpec,
}

impl AgentInput {
    /// Build from explicit parts
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        spec: v2alpha1::BeaconAgentSpec,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            spec,
        }
    }

    /// Build from a current-schema object
    pub fn from_current(agent: &v2alpha1::BeaconAgent) -> Result<Self> {
        let (name, namespace) = identity(name_of(&agent.metadata), namespace_of(&agent.metadata))?;
        Ok(Self::new(name, namespace, agent.spec.clone()))
    }

    /// Build from a legacy object through the legacy-to-current mapping
    pub fn from_legacy(agent: &v1alpha1::BeaconAgent) -> Result<Self> {
        Self::from_current(&convert_legacy_agent(agent)?)
    }

    /// Build from a parsed manifest of either generation, dispatching on
    /// `apiVersion`
    pub fn from_manifest(manifest: Value) -> Result<Self> {
        let api_version = beacon_common::yaml::api_version_of(&manifest)
            .unwrap_or_default()
            .to_string();
        match api_version.as_str() {
            "beacon.dev/v2alpha1" => {
                let agent: v2alpha1::BeaconAgent = serde_json::from_value(manifest)?;
                Self::from_current(&agent)
            }
            "beacon.dev/v1alpha1" => {
                let agent: v1alpha1::BeaconAgent = serde_json::from_value(manifest)?;
                Self::from_legacy(&agent)
            }
            other => Err(FeatureError::from(beacon_common::Error::validation(format!(
                "unsupported apiVersion '{other}', expected beacon.dev/v1alpha1 or beacon.dev/v2alpha1"
            )))),
        }
    }

    /// Global settings, defaulted
    pub fn global(&self) -> v2alpha1::GlobalConfig {
        self.spec.global()
    }

    /// Feature settings, defaulted
    pub fn features(&self) -> v2alpha1::FeaturesConfig {
        self.spec.features()
    }
}

fn identity(name: &str, namespace: &str) -> Result<(String, String)> {
    if name.is_empty() {
        return Err(FeatureError::from(beacon_common::Error::validation_for_field(
            beacon_common::error::UNKNOWN_CONTEXT,
            "metadata.name",
            "BeaconAgent has no name",
        )));
    }
    let namespace = if namespace.is_empty() {
        "default"
    } else {
        namespace
    };
    Ok((name.to_string(), namespace.to_string()))
}
