//! BeaconAgent `v1alpha1`: the legacy schema, grouped by agent process
//!
//! Still served so existing manifests keep working. Nothing in the operator
//! reads these types directly; they are converted with
//! [`super::conversion::legacy_to_current`] first.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{BeaconAgentStatus, CustomConfig, NetworkPolicyConfig};

/// Legacy BeaconAgent specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "beacon.dev",
    version = "v1alpha1",
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
    /// Cluster name reported by every agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Intake site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Image registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Node agent daemon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<NodeAgentSpec>,

    /// Cluster agent deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_agent: Option<ClusterAgentSpec>,

    /// Cluster checks runner deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_checks_runner: Option<ClusterChecksRunnerSpec>,

    /// Cross-cutting features
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<LegacyFeatures>,
}

// =============================================================================
// Node agent
// =============================================================================

/// Node agent daemon settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeAgentSpec {
    /// Deploy the node agent (defaults to true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Core agent settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<NodeAgentConfig>,

    /// Trace agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apm: Option<ApmSpec>,

    /// Process agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessSpec>,

    /// System probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_probe: Option<SystemProbeSpec>,

    /// Security agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecuritySpec>,

    /// Network policy generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<NetworkPolicyConfig>,

    /// Node-local service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_service: Option<LocalService>,
}

/// Core agent settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeAgentConfig {
    /// DogStatsD UDP host port; setting it exposes the port on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<i32>,

    /// DogStatsD settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dogstatsd: Option<DogstatsdConfig>,
}

/// Legacy DogStatsD settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DogstatsdConfig {
    /// Origin detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dogstatsd_origin_detection: Option<bool>,

    /// Socket intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix_domain_socket: Option<UnixDomainSocketSpec>,

    /// Metric name mapper profiles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper_profiles: Option<CustomConfig>,
}

/// Legacy socket settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnixDomainSocketSpec {
    /// Listen on the socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Socket path on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_filepath: Option<String>,
}

/// Trace agent settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApmSpec {
    /// Run the trace agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// TCP host port (defaults to 8126 when enabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<i32>,

    /// Socket intake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unix_domain_socket: Option<UnixDomainSocketSpec>,
}

/// Process agent settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Run the process agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Collect processes (not only containers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_collection_enabled: Option<bool>,
}

/// System probe settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemProbeSpec {
    /// Run the system probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Resolve NAT translations through conntrack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conntrack_enabled: Option<bool>,

    /// Collect DNS statistics
    #[serde(default, rename = "collectDNSStats", skip_serializing_if = "Option::is_none")]
    pub collect_dns_stats: Option<bool>,
}

/// Security agent settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySpec {
    /// Runtime security
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeSecuritySpec>,
}

/// Runtime security settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSecuritySpec {
    /// Enable runtime security
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Custom policies directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies_dir: Option<CustomConfig>,

    /// Receive policy updates from the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_configuration: Option<bool>,
}

/// Node-local service settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalService {
    /// Service name override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_name: Option<String>,

    /// Create the service regardless of cluster version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_local_service_enable: Option<bool>,
}

// =============================================================================
// Cluster agent and runners
// =============================================================================

/// Cluster agent deployment settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAgentSpec {
    /// Deploy the cluster agent (defaults to true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Cluster agent settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ClusterAgentConfig>,
}

/// Cluster agent settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAgentConfig {
    /// Dispatch cluster checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_checks_enabled: Option<bool>,
}

/// Cluster checks runner settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterChecksRunnerSpec {
    /// Deploy checks runners
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

// =============================================================================
// Features
// =============================================================================

/// Legacy cross-cutting features
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyFeatures {
    /// Log collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_collection: Option<LogCollectionConfig>,

    /// Network monitoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_monitoring: Option<NetworkMonitoringConfig>,

    /// Kubernetes state metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_state_metrics_core: Option<KubeStateMetricsCore>,
}

/// Legacy log collection settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogCollectionConfig {
    /// Enable log collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_enabled: Option<bool>,

    /// Collect every container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_config_container_collect_all: Option<bool>,

    /// Tail files instead of the runtime socket
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

    /// Host path for log pointers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_storage_path: Option<String>,

    /// Maximum number of tailed files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_files_limit: Option<i32>,
}

/// Legacy network monitoring toggle
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMonitoringConfig {
    /// Enable network monitoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Legacy kubernetes state metrics settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeStateMetricsCore {
    /// Enable the check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Run as a cluster check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_check: Option<bool>,

    /// Custom check configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<CustomConfig>,
}
