//! BeaconAgent `v2alpha1`: the current schema, grouped by feature
//!
//! Every feature knob is optional. An absent block means "not mentioned",
//! which features treat differently from an explicit `enabled: false`.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{BeaconAgentStatus, CustomConfig, NetworkPolicyConfig};

/// Default DogStatsD port
pub const DEFAULT_DOGSTATSD_PORT: i32 = 8125;
/// Default APM receiver port
pub const DEFAULT_APM_PORT: i32 = 8126;
/// Default DogStatsD socket path on the host
pub const DEFAULT_DOGSTATSD_SOCKET_PATH: &str = "/var/run/beacon/dsd.socket";
/// Default APM socket path on the host
pub const DEFAULT_APM_SOCKET_PATH: &str = "/var/run/beacon/apm.socket";
/// Default open files limit for log tailing
pub const DEFAULT_LOG_OPEN_FILES_LIMIT: i32 = 100;

/// BeaconAgent describes one monitoring agent deployment.
///
/// Example:
/// ```yaml
/// apiVersion: beacon.dev/v2alpha1
/// kind: BeaconAgent
/// metadata:
///   name: beacon
///   namespace: monitoring
/// spec:
///   global:
///     clusterName: prod-east
///     site: beacon.example.com
///   features:
///     logCollection:
///       enabled: true
///       containerCollectAll: true
///     clusterChecks:
///       enabled: true
///       useClusterChecksRunners: true
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "beacon.dev",
    version = "v2alpha1",
    kind = "BeaconAgent",
    plural = "beaconagents",
    shortname = "ba",
    namespaced,
    status = "BeaconAgentStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BeaconAgentSpec {
    /// Settings shared by every component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalConfig>,

    /// Per-feature configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeaturesConfig>,

    /// Per-component overrides keyed by component name
    /// (`clusterAgent`, `nodeAgent`, `clusterChecksRunner`)
    #[serde(default, rename = "override", skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, ComponentOverride>,
}

impl BeaconAgentSpec {
    /// Global settings, or the defaults when the block is absent
    pub fn global(&self) -> GlobalConfig {
        self.global.clone().unwrap_or_default()
    }

    /// Feature settings, or the defaults when the block is absent
    pub fn features(&self) -> FeaturesConfig {
        self.features.clone().unwrap_or_default()
    }
}

// =============================================================================
// Global
// =============================================================================

/// How node agent processes are packaged into containers
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ContainerStrategy {
    /// One container per agent process
    #[default]
    Optimized,
    /// All unprivileged processes share a single container
    Single,
}

/// Settings shared by every component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Cluster name reported by every agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Intake site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Image registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Node agent container layout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_strategy: Option<ContainerStrategy>,

    /// Node-local service exposing the node agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_service: Option<LocalServiceConfig>,

    /// Network policy generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicyConfig>,
}

impl GlobalConfig {
    /// Effective container strategy
    pub fn container_strategy(&self) -> ContainerStrategy {
        self.container_strategy.unwrap_or_default()
    }
}

/// Node-local service settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalServiceConfig {
    /// Service name (defaults to `<agent>-agent`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_override: Option<String>,

    /// Create the service even when the cluster may not support
    /// internal traffic policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_enable: Option<bool>,
}

// =============================================================================
// Overrides
// =============================================================================

/// Per-component override
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOverride {
    /// Do not deploy this component at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    /// Environment variables set on every container of the component,
    /// replacing values contributed by features
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvOverride>,
}

/// A literal environment variable override
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvOverride {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default)]
    pub value: String,
}

// =============================================================================
// Features
// =============================================================================

/// Per-feature configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesConfig {
    /// DogStatsD metrics intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dogstatsd: Option<DogstatsdFeatureConfig>,

    /// Container and pod log collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_collection: Option<LogCollectionFeatureConfig>,

    /// Trace intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apm: Option<ApmFeatureConfig>,

    /// Network performance monitoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm: Option<NpmFeatureConfig>,

    /// Cloud workload security
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cws: Option<CwsFeatureConfig>,

    /// Cluster check dispatching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_checks: Option<ClusterChecksFeatureConfig>,

    /// Kubernetes state metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_state_metrics_core: Option<KubeStateMetricsCoreFeatureConfig>,

    /// Process collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_process: Option<LiveProcessFeatureConfig>,
}

/// A host port exposure
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostPortConfig {
    /// Expose the port on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Port number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// A unix domain socket shared through a host path
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnixDomainSocketConfig {
    /// Listen on the socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Absolute socket path on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// DogStatsD configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DogstatsdFeatureConfig {
    /// Tag metrics with the sending container (requires host PID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_detection_enabled: Option<bool>,

    /// UDP host port exposure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port_config: Option<HostPortConfig>,

    /// Unix domain socket intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix_domain_socket_config: Option<UnixDomainSocketConfig>,

    /// Metric name mapper profiles (inline YAML only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper_profiles: Option<CustomConfig>,
}

/// Log collection configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogCollectionFeatureConfig {
    /// Enable log collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Collect logs from every container without annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_collect_all: Option<bool>,

    /// Tail log files instead of the container runtime socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_collect_using_files: Option<bool>,

    /// Host path of container logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_log_path: Option<String>,

    /// Host path of pod logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_log_path: Option<String>,

    /// Host path of container log symlinks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_symlinks_path: Option<String>,

    /// Host path where the agent stores log pointers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_storage_path: Option<String>,

    /// Maximum number of files tailed concurrently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_files_limit: Option<i32>,
}

/// APM configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApmFeatureConfig {
    /// Enable trace intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// TCP host port exposure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port_config: Option<HostPortConfig>,

    /// Unix domain socket intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix_domain_socket_config: Option<UnixDomainSocketConfig>,
}

/// Network performance monitoring configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NpmFeatureConfig {
    /// Enable network performance monitoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Resolve NAT translations through conntrack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_conntrack: Option<bool>,

    /// Collect DNS statistics
    #[serde(default, rename = "collectDNSStats", skip_serializing_if = "Option::is_none")]
    pub collect_dns_stats: Option<bool>,
}

/// Cloud workload security configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CwsFeatureConfig {
    /// Enable runtime security
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Receive policy updates from the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_configuration_enabled: Option<bool>,

    /// Custom security policies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_policies: Option<CustomConfig>,
}

/// Cluster checks configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterChecksFeatureConfig {
    /// Enable cluster check dispatching from the cluster agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Dispatch checks to dedicated checks runners instead of node agents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_cluster_checks_runners: Option<bool>,
}

/// Kubernetes state metrics configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeStateMetricsCoreFeatureConfig {
    /// Enable the kubernetes state core check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Run the check as a cluster check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_check: Option<bool>,

    /// Custom check configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<CustomConfig>,
}

/// Process collection configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveProcessFeatureConfig {
    /// Enable process collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Scrub sensitive words from process arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrub_process_arguments: Option<bool>,

    /// Drop process arguments entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_process_arguments: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml::from_yaml;

    #[test]
    fn test_spec_parses_from_yaml() {
        let spec: BeaconAgentSpec = from_yaml(
            r#"
global:
  clusterName: prod-east
  containerStrategy: single
features:
  dogstatsd:
    originDetectionEnabled: true
    unixDomainSocketConfig:
      enabled: true
  kubeStateMetricsCore:
    enabled: true
    clusterCheck: true
override:
  nodeAgent:
    env:
      - name: BEACON_LOG_LEVEL
        value: debug
"#,
        )
        .unwrap();

        let global = spec.global();
        assert_eq!(global.cluster_name.as_deref(), Some("prod-east"));
        assert_eq!(global.container_strategy(), ContainerStrategy::Single);

        let features = spec.features();
        let dsd = features.dogstatsd.unwrap();
        assert_eq!(dsd.origin_detection_enabled, Some(true));
        assert_eq!(dsd.unix_domain_socket_config.unwrap().path, None);
        assert_eq!(
            features.kube_state_metrics_core.unwrap().cluster_check,
            Some(true)
        );
        assert_eq!(spec.overrides["nodeAgent"].env[0].value, "debug");
    }

    #[test]
    fn test_empty_spec_defaults() {
        let spec = BeaconAgentSpec::default();
        assert_eq!(spec.global().container_strategy(), ContainerStrategy::Optimized);
        assert!(spec.features().dogstatsd.is_none());
    }
}
