//! Legacy (`v1alpha1`) to current (`v2alpha1`) BeaconAgent conversion
//!
//! The conversion is explicit about every value the legacy schema implied
//! but never wrote down, so that a converted spec composes to exactly the
//! same output as the equivalent hand-written current spec:
//!
//! - cluster checks are always emitted, `enabled: false` when the legacy
//!   cluster agent did not dispatch them (which forbids checks runners)
//! - an enabled legacy trace agent always exposes its host port (8126 unless
//!   a port was given)
//! - a legacy socket block without `enabled` converts to `enabled: false`
//! - `agent.enabled: false` and `clusterAgent.enabled: false` become
//!   `disabled` component overrides

use std::collections::BTreeMap;

use super::v1alpha1;
use super::v2alpha1::{
    self, ApmFeatureConfig, ClusterChecksFeatureConfig, ComponentOverride, CwsFeatureConfig,
    DogstatsdFeatureConfig, FeaturesConfig, GlobalConfig, HostPortConfig,
    KubeStateMetricsCoreFeatureConfig, LiveProcessFeatureConfig, LocalServiceConfig,
    LogCollectionFeatureConfig, NpmFeatureConfig, UnixDomainSocketConfig, DEFAULT_APM_PORT,
};
use crate::{Error, Result};

/// Override key for the node agent
pub const NODE_AGENT_OVERRIDE_KEY: &str = "nodeAgent";
/// Override key for the cluster agent
pub const CLUSTER_AGENT_OVERRIDE_KEY: &str = "clusterAgent";

/// Convert a legacy BeaconAgent object, keeping its metadata.
///
/// Fails when the object has no name, since every generated object is
/// named after it.
pub fn convert_legacy_agent(agent: &v1alpha1::BeaconAgent) -> Result<v2alpha1::BeaconAgent> {
    let name = agent
        .metadata
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::conversion("<unnamed>", "legacy BeaconAgent has no metadata.name"))?;

    let mut converted = v2alpha1::BeaconAgent::new(&name, legacy_to_current(&agent.spec));
    converted.metadata = agent.metadata.clone();
    converted.status = agent.status.clone();
    Ok(converted)
}

/// Map a legacy spec onto the current schema
pub fn legacy_to_current(spec: &v1alpha1::BeaconAgentSpec) -> v2alpha1::BeaconAgentSpec {
    let agent = spec.agent.clone().unwrap_or_default();

    let global = GlobalConfig {
        cluster_name: spec.cluster_name.clone(),
        site: spec.site.clone(),
        registry: spec.registry.clone(),
        container_strategy: None,
        local_service: agent.local_service.as_ref().map(|ls| LocalServiceConfig {
            name_override: ls.override_name.clone(),
            force_enable: ls.force_local_service_enable,
        }),
        network_policy: agent.network_policy.clone(),
    };

    let legacy_features = spec.features.clone().unwrap_or_default();
    let features = FeaturesConfig {
        dogstatsd: convert_dogstatsd(&agent),
        log_collection: legacy_features
            .log_collection
            .as_ref()
            .map(convert_log_collection),
        apm: agent.apm.as_ref().map(convert_apm),
        npm: legacy_features
            .network_monitoring
            .as_ref()
            .map(|nm| NpmFeatureConfig {
                enabled: nm.enabled,
                enable_conntrack: agent
                    .system_probe
                    .as_ref()
                    .and_then(|sp| sp.conntrack_enabled),
                collect_dns_stats: agent
                    .system_probe
                    .as_ref()
                    .and_then(|sp| sp.collect_dns_stats),
            }),
        cws: agent
            .security
            .as_ref()
            .and_then(|s| s.runtime.as_ref())
            .map(|rt| CwsFeatureConfig {
                enabled: rt.enabled,
                remote_configuration_enabled: rt.sync_configuration,
                custom_policies: rt.policies_dir.clone(),
            }),
        cluster_checks: Some(convert_cluster_checks(spec)),
        kube_state_metrics_core: legacy_features.kube_state_metrics_core.as_ref().map(|ksm| {
            KubeStateMetricsCoreFeatureConfig {
                enabled: ksm.enabled,
                cluster_check: ksm.cluster_check,
                conf: ksm.conf.clone(),
            }
        }),
        live_process: agent.process.as_ref().map(|p| LiveProcessFeatureConfig {
            enabled: Some(
                p.enabled.unwrap_or(false) && p.process_collection_enabled.unwrap_or(false),
            ),
            scrub_process_arguments: None,
            strip_process_arguments: None,
        }),
    };

    let mut overrides = BTreeMap::new();
    if agent.enabled == Some(false) {
        overrides.insert(NODE_AGENT_OVERRIDE_KEY.to_string(), disabled_override());
    }
    if spec.cluster_agent.as_ref().and_then(|dca| dca.enabled) == Some(false) {
        overrides.insert(CLUSTER_AGENT_OVERRIDE_KEY.to_string(), disabled_override());
    }

    v2alpha1::BeaconAgentSpec {
        global: Some(global),
        features: Some(features),
        overrides,
    }
}

fn disabled_override() -> ComponentOverride {
    ComponentOverride {
        disabled: Some(true),
        env: Vec::new(),
    }
}

fn convert_socket(uds: &v1alpha1::UnixDomainSocketSpec) -> UnixDomainSocketConfig {
    UnixDomainSocketConfig {
        enabled: Some(uds.enabled.unwrap_or(false)),
        path: uds.host_filepath.clone(),
    }
}

fn convert_dogstatsd(agent: &v1alpha1::NodeAgentSpec) -> Option<DogstatsdFeatureConfig> {
    let config = agent.config.as_ref()?;
    let dsd = config.dogstatsd.clone().unwrap_or_default();
    Some(DogstatsdFeatureConfig {
        origin_detection_enabled: dsd.dogstatsd_origin_detection,
        host_port_config: config.host_port.map(|port| HostPortConfig {
            enabled: Some(true),
            port: Some(port),
        }),
        unix_domain_socket_config: dsd.unix_domain_socket.as_ref().map(convert_socket),
        mapper_profiles: dsd.mapper_profiles,
    })
}

fn convert_apm(apm: &v1alpha1::ApmSpec) -> ApmFeatureConfig {
    let enabled = apm.enabled.unwrap_or(false);
    ApmFeatureConfig {
        enabled: apm.enabled,
        host_port_config: enabled.then(|| HostPortConfig {
            enabled: Some(true),
            port: Some(apm.host_port.unwrap_or(DEFAULT_APM_PORT)),
        }),
        unix_domain_socket_config: apm.unix_domain_socket.as_ref().map(convert_socket),
    }
}

fn convert_log_collection(logs: &v1alpha1::LogCollectionConfig) -> LogCollectionFeatureConfig {
    LogCollectionFeatureConfig {
        enabled: logs.logs_enabled,
        container_collect_all: logs.logs_config_container_collect_all,
        container_collect_using_files: logs.container_collect_using_files,
        container_log_path: logs.container_log_path.clone(),
        pod_log_path: logs.pod_log_path.clone(),
        container_symlinks_path: logs.container_symlinks_path.clone(),
        temp_storage_path: logs.temp_storage_path.clone(),
        open_files_limit: logs.open_files_limit,
    }
}

fn convert_cluster_checks(spec: &v1alpha1::BeaconAgentSpec) -> ClusterChecksFeatureConfig {
    let enabled = spec
        .cluster_agent
        .as_ref()
        .and_then(|dca| dca.config.as_ref())
        .and_then(|c| c.cluster_checks_enabled)
        .unwrap_or(false);
    let runners = spec
        .cluster_checks_runner
        .as_ref()
        .and_then(|ccr| ccr.enabled)
        .unwrap_or(false);

    ClusterChecksFeatureConfig {
        enabled: Some(enabled),
        use_cluster_checks_runners: Some(enabled && runners),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::common::CustomConfig;
    use rstest::rstest;

    fn legacy(yaml: &str) -> v1alpha1::BeaconAgentSpec {
        crate::yaml::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_empty_legacy_spec_disables_cluster_checks() {
        let current = legacy_to_current(&v1alpha1::BeaconAgentSpec::default());
        let checks = current.features().cluster_checks.unwrap();
        assert_eq!(checks.enabled, Some(false));
        assert_eq!(checks.use_cluster_checks_runners, Some(false));
        assert!(current.overrides.is_empty());
    }

    #[rstest]
    #[case::runners_alone("clusterChecksRunner:\n  enabled: true\n", Some(false), Some(false))]
    #[case::checks_alone(
        "clusterAgent:\n  config:\n    clusterChecksEnabled: true\n",
        Some(true),
        Some(false)
    )]
    #[case::checks_and_runners(
        "clusterAgent:\n  config:\n    clusterChecksEnabled: true\nclusterChecksRunner:\n  enabled: true\n",
        Some(true),
        Some(true)
    )]
    fn test_runners_require_cluster_checks(
        #[case] yaml: &str,
        #[case] enabled: Option<bool>,
        #[case] runners: Option<bool>,
    ) {
        let checks = legacy_to_current(&legacy(yaml)).features().cluster_checks.unwrap();
        assert_eq!(checks.enabled, enabled);
        assert_eq!(checks.use_cluster_checks_runners, runners);
    }

    #[test]
    fn test_apm_enabled_implies_host_port() {
        let current = legacy_to_current(&legacy(
            r#"
agent:
  apm:
    enabled: true
"#,
        ));
        let apm = current.features().apm.unwrap();
        assert_eq!(
            apm.host_port_config,
            Some(HostPortConfig {
                enabled: Some(true),
                port: Some(DEFAULT_APM_PORT),
            })
        );
    }

    #[test]
    fn test_dogstatsd_mapping() {
        let current = legacy_to_current(&legacy(
            r#"
agent:
  config:
    hostPort: 18125
    dogstatsd:
      dogstatsdOriginDetection: true
      unixDomainSocket:
        hostFilepath: /var/run/custom/dsd.socket
      mapperProfiles:
        configData: "- name: test"
"#,
        ));
        let dsd = current.features().dogstatsd.unwrap();
        assert_eq!(dsd.origin_detection_enabled, Some(true));
        assert_eq!(dsd.host_port_config.unwrap().port, Some(18125));
        assert_eq!(
            dsd.unix_domain_socket_config,
            Some(UnixDomainSocketConfig {
                enabled: Some(false),
                path: Some("/var/run/custom/dsd.socket".to_string()),
            })
        );
        assert_eq!(
            dsd.mapper_profiles,
            Some(CustomConfig {
                config_data: Some("- name: test".to_string()),
                config_map: None,
            })
        );
    }

    #[test]
    fn test_disabled_components_become_overrides() {
        let current = legacy_to_current(&legacy(
            r#"
agent:
  enabled: false
clusterAgent:
  enabled: false
"#,
        ));
        assert_eq!(
            current.overrides.keys().collect::<Vec<_>>(),
            vec![CLUSTER_AGENT_OVERRIDE_KEY, NODE_AGENT_OVERRIDE_KEY]
        );
        assert_eq!(current.overrides[NODE_AGENT_OVERRIDE_KEY].disabled, Some(true));
    }

    #[test]
    fn test_system_probe_settings_follow_network_monitoring() {
        let current = legacy_to_current(&legacy(
            r#"
agent:
  systemProbe:
    enabled: true
    conntrackEnabled: false
    collectDNSStats: false
features:
  networkMonitoring:
    enabled: true
"#,
        ));
        let npm = current.features().npm.unwrap();
        assert_eq!(npm.enabled, Some(true));
        assert_eq!(npm.enable_conntrack, Some(false));
        assert_eq!(npm.collect_dns_stats, Some(false));

        let json = serde_json::to_value(&npm).unwrap();
        assert_eq!(json["collectDNSStats"], false);
    }

    #[test]
    fn test_process_collection_requires_both_flags() {
        let current = legacy_to_current(&legacy(
            r#"
agent:
  process:
    enabled: true
"#,
        ));
        assert_eq!(current.features().live_process.unwrap().enabled, Some(false));
    }

    #[test]
    fn test_convert_legacy_agent_keeps_metadata() {
        let mut agent = v1alpha1::BeaconAgent::new("beacon", v1alpha1::BeaconAgentSpec::default());
        agent.metadata.namespace = Some("monitoring".to_string());

        let converted = convert_legacy_agent(&agent).unwrap();
        assert_eq!(converted.metadata.name.as_deref(), Some("beacon"));
        assert_eq!(converted.metadata.namespace.as_deref(), Some("monitoring"));
    }

    #[test]
    fn test_convert_legacy_agent_requires_name() {
        let mut agent = v1alpha1::BeaconAgent::new("x", v1alpha1::BeaconAgentSpec::default());
        agent.metadata.name = None;
        assert!(matches!(
            convert_legacy_agent(&agent),
            Err(Error::Conversion { .. })
        ));
    }
}
