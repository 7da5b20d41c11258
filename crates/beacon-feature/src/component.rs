//! Deployables and the containers they run

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::FeatureError;

/// A deployable produced for one BeaconAgent
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentName {
    /// Control plane deployment
    ClusterAgent,
    /// Per-node daemon
    NodeAgent,
    /// Cluster checks runner deployment
    ClusterChecksRunner,
}

impl ComponentName {
    /// Every deployable, in render order
    pub const ALL: [ComponentName; 3] = [
        ComponentName::ClusterAgent,
        ComponentName::NodeAgent,
        ComponentName::ClusterChecksRunner,
    ];

    /// Key used in the `override` map of the spec
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterAgent => "clusterAgent",
            Self::NodeAgent => "nodeAgent",
            Self::ClusterChecksRunner => "clusterChecksRunner",
        }
    }

    /// Suffix appended to the BeaconAgent name for generated objects
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::ClusterAgent => "cluster-agent",
            Self::NodeAgent => "agent",
            Self::ClusterChecksRunner => "cluster-checks-runner",
        }
    }

    /// Generated object name for this deployable of `agent`
    pub fn object_name(&self, agent: &str) -> String {
        format!("{}-{}", agent, self.suffix())
    }

    /// Container created when no feature asked for a specific one
    pub fn default_container(&self) -> AgentContainerName {
        match self {
            Self::ClusterAgent => AgentContainerName::ClusterAgent,
            Self::NodeAgent => AgentContainerName::Core,
            Self::ClusterChecksRunner => AgentContainerName::ClusterChecksRunner,
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentName {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                FeatureError::from(beacon_common::Error::validation(format!(
                    "unknown component '{s}' in spec.override"
                )))
            })
    }
}

/// Container names used across the agent deployables
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AgentContainerName {
    /// Core node agent
    #[serde(rename = "agent")]
    Core,
    /// Trace intake
    #[serde(rename = "trace-agent")]
    Trace,
    /// Process collection
    #[serde(rename = "process-agent")]
    Process,
    /// eBPF probe (privileged)
    #[serde(rename = "system-probe")]
    SystemProbe,
    /// Runtime security (privileged)
    #[serde(rename = "security-agent")]
    Security,
    /// OpenTelemetry collector
    #[serde(rename = "otel-agent")]
    Otel,
    /// All unprivileged processes in one container
    #[serde(rename = "unprivileged-single-agent")]
    UnprivilegedSingle,
    /// Cluster agent
    #[serde(rename = "cluster-agent")]
    ClusterAgent,
    /// Cluster checks runner
    #[serde(rename = "cluster-checks-runner")]
    ClusterChecksRunner,
}

impl AgentContainerName {
    /// Kubernetes container name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "agent",
            Self::Trace => "trace-agent",
            Self::Process => "process-agent",
            Self::SystemProbe => "system-probe",
            Self::Security => "security-agent",
            Self::Otel => "otel-agent",
            Self::UnprivilegedSingle => "unprivileged-single-agent",
            Self::ClusterAgent => "cluster-agent",
            Self::ClusterChecksRunner => "cluster-checks-runner",
        }
    }

    /// Whether the container needs elevated host access
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::SystemProbe | Self::Security)
    }
}

impl fmt::Display for AgentContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which containers of a pod template an accumulator entry applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerTarget {
    /// Every container in the template
    All,
    /// One named container; a no-op when the template lacks it
    Named(AgentContainerName),
}

impl ContainerTarget {
    /// Whether a container with the given name is addressed by this target
    pub fn matches(&self, container: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(name) => name.as_str() == container,
        }
    }
}

impl From<AgentContainerName> for ContainerTarget {
    fn from(name: AgentContainerName) -> Self {
        Self::Named(name)
    }
}

impl fmt::Display for ContainerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Named(name) => name.fmt(f),
        }
    }
}
