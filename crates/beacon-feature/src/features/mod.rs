//! Built-in features
//!
//! Each submodule is one optional capability of the agent. They are
//! registered by [`register_builtin`] and only ever talk to each other
//! through the accumulator managers.

pub mod apm;
pub mod cluster_checks;
pub mod cws;
pub mod default;
pub mod dogstatsd;
pub mod kube_state_core;
pub mod live_process;
pub mod log_collection;
pub mod npm;

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::api::core::v1::{ConfigMapVolumeSource, EmptyDirVolumeSource, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use beacon_common::crd::common::{ConfigMapConfig, CustomConfig};
use beacon_common::{LABEL_COMPONENT, LABEL_INSTANCE};

use crate::component::{AgentContainerName, ComponentName, ContainerTarget};
use crate::feature::FeatureId;
use crate::managers::{env_var, host_path_volume, volume_mount, PodTemplateManagers};
use crate::registry::FeatureRegistry;
use crate::{FeatureError, Result};

/// Register every built-in feature
pub fn register_builtin(registry: &FeatureRegistry) -> Result<()> {
    registry.register(apm::ID, apm::build)?;
    registry.register(cluster_checks::ID, cluster_checks::build)?;
    registry.register(cws::ID, cws::build)?;
    registry.register(default::ID, default::build)?;
    registry.register(dogstatsd::ID, dogstatsd::build)?;
    registry.register(kube_state_core::ID, kube_state_core::build)?;
    registry.register(live_process::ID, live_process::build)?;
    registry.register(log_collection::ID, log_collection::build)?;
    registry.register(npm::ID, npm::build)?;
    Ok(())
}

/// Port in the valid TCP/UDP range
pub(crate) fn validate_port(feature: FeatureId, field: &str, port: i32) -> Result<i32> {
    if (1..=65535).contains(&port) {
        Ok(port)
    } else {
        Err(FeatureError::invalid_spec(
            feature,
            format!("{field} must be between 1 and 65535, got {port}"),
        ))
    }
}

/// Split an absolute socket path into its host directory and file name
pub(crate) fn split_socket_path(feature: FeatureId, path: &str) -> Result<(String, String)> {
    let socket = Path::new(path);
    let invalid = || {
        FeatureError::invalid_spec(
            feature,
            format!("socket path '{path}' must be an absolute file path"),
        )
    };
    if !socket.is_absolute() || path.ends_with('/') {
        return Err(invalid());
    }
    let dir = socket.parent().and_then(Path::to_str).ok_or_else(invalid)?;
    let file = socket.file_name().and_then(|f| f.to_str()).ok_or_else(invalid)?;
    Ok((dir.to_string(), file.to_string()))
}

/// Inline YAML re-encoded as compact JSON for an environment variable
pub(crate) fn yaml_to_json_string(feature: FeatureId, yaml: &str) -> Result<String> {
    let value = beacon_common::yaml::parse_yaml(yaml)
        .map_err(|e| FeatureError::invalid_spec(feature, e.to_string()))?;
    Ok(serde_json::to_string(&value)?)
}

/// Selector for the pods of one deployable of `agent`
pub(crate) fn component_selector(agent: &str, component: ComponentName) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([
            (LABEL_INSTANCE.to_string(), agent.to_string()),
            (LABEL_COMPONENT.to_string(), component.suffix().to_string()),
        ])),
        ..Default::default()
    }
}

/// Where a feature's custom configuration comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CustomConfigSource {
    /// Inline content the operator writes into a generated ConfigMap
    Inline(String),
    /// ConfigMap managed by the user
    ConfigMap(ConfigMapConfig),
}

impl CustomConfigSource {
    /// Resolve an optional custom config block; inline data wins over a
    /// ConfigMap reference
    pub(crate) fn resolve(feature: FeatureId, field: &str, config: Option<CustomConfig>) -> Result<Option<Self>> {
        let Some(config) = config else {
            return Ok(None);
        };
        match (config.config_data, config.config_map) {
            (Some(data), _) => Ok(Some(Self::Inline(data))),
            (None, Some(config_map)) if !config_map.name.is_empty() => Ok(Some(Self::ConfigMap(config_map))),
            _ => Err(FeatureError::invalid_spec(
                feature,
                format!("{field} needs configData or a named configMap"),
            )),
        }
    }
}

/// Volume projecting `config_map` into the pod
pub(crate) fn config_map_volume(volume_name: &str, config_map: &ConfigMapConfig) -> Volume {
    let items = (!config_map.items.is_empty()).then(|| {
        config_map
            .items
            .iter()
            .map(|item| k8s_openapi::api::core::v1::KeyToPath {
                key: item.key.clone(),
                path: item.path.clone(),
                mode: None,
            })
            .collect()
    });
    Volume {
        name: volume_name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.name.clone(),
            items,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod annotation relaxing AppArmor for the system-probe container
pub const SYSTEM_PROBE_APPARMOR_ANNOTATION: &str = "container.apparmor.security.beta.kubernetes.io/system-probe";
/// Enable the system-probe process
pub const SYSTEM_PROBE_ENABLED_ENV: &str = "BEACON_SYSTEM_PROBE_ENABLED";
/// Socket the system-probe serves on
pub const SYSTEM_PROBE_SOCKET_ENV: &str = "BEACON_SYSTEM_PROBE_SOCKET";
/// Directory shared between system-probe and its clients
pub const SYSTEM_PROBE_SOCKET_DIR: &str = "/var/run/sysprobe";
/// Kernel debug filesystem
pub const DEBUGFS_PATH: &str = "/sys/kernel/debug";

/// Capabilities the eBPF probe needs
pub(crate) const SYSTEM_PROBE_CAPABILITIES: &[&str] = &[
    "SYS_ADMIN",
    "SYS_RESOURCE",
    "SYS_PTRACE",
    "NET_ADMIN",
    "NET_BROADCAST",
    "NET_RAW",
    "IPC_LOCK",
    "CHOWN",
];

/// Setup shared by every feature that runs the system-probe: AppArmor,
/// capabilities, debugfs and the socket directory, writable by the probe and
/// read-only for `clients`.
pub(crate) fn configure_system_probe(
    managers: &mut PodTemplateManagers<'_>,
    clients: &[AgentContainerName],
) -> Result<()> {
    let probe = ContainerTarget::from(AgentContainerName::SystemProbe);
    managers
        .annotation()
        .add(SYSTEM_PROBE_APPARMOR_ANNOTATION, "unconfined");
    managers
        .security_context()
        .add_capabilities(probe, SYSTEM_PROBE_CAPABILITIES);

    let mut volumes = managers.volume();
    volumes.add_volume_and_mount(
        probe,
        host_path_volume("debugfs", DEBUGFS_PATH),
        volume_mount("debugfs", DEBUGFS_PATH, false),
    )?;
    volumes.add_volume_and_mount(
        probe,
        Volume {
            name: "sysprobe-socket-dir".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
        volume_mount("sysprobe-socket-dir", SYSTEM_PROBE_SOCKET_DIR, false),
    )?;
    for client in clients {
        volumes.add_volume_mount(
            ContainerTarget::from(*client),
            volume_mount("sysprobe-socket-dir", SYSTEM_PROBE_SOCKET_DIR, true),
        )?;
    }

    let socket = format!("{SYSTEM_PROBE_SOCKET_DIR}/sysprobe.sock");
    let mut env = managers.env_var();
    for container in std::iter::once(&AgentContainerName::SystemProbe).chain(clients) {
        let target = ContainerTarget::from(*container);
        env.add(target, env_var(SYSTEM_PROBE_ENABLED_ENV, "true"))?;
        env.add(target, env_var(SYSTEM_PROBE_SOCKET_ENV, socket.clone()))?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use k8s_openapi::api::core::v1::{EnvVar, PodTemplateSpec};

    use beacon_common::crd::v2alpha1::BeaconAgentSpec;

    use crate::input::AgentInput;
    use crate::managers::test_support::container;

    /// Input named `beacon` in `monitoring` from a current-schema spec
    pub fn input(spec_yaml: &str) -> AgentInput {
        let spec: BeaconAgentSpec = beacon_common::yaml::from_yaml(spec_yaml).unwrap();
        AgentInput::new("beacon", "monitoring", spec)
    }

    /// Env var `name` of container `container_name`
    pub fn env<'t>(template: &'t PodTemplateSpec, container_name: &str, name: &str) -> Option<&'t EnvVar> {
        container(template, container_name)
            .env
            .as_ref()
            .and_then(|env| env.iter().find(|e| e.name == name))
    }

    /// Literal value of env var `name` of container `container_name`
    pub fn env_value(template: &PodTemplateSpec, container_name: &str, name: &str) -> Option<String> {
        env(template, container_name, name).and_then(|e| e.value.clone())
    }

    /// Annotation `key` of the pod template
    pub fn annotation(template: &PodTemplateSpec, key: &str) -> Option<String> {
        template
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.as_ref())
            .and_then(|a| a.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: FeatureId = FeatureId::new("test");

    #[test]
    fn test_builtin_registration() {
        let registry = FeatureRegistry::with_builtin_features().unwrap();
        let ids: Vec<_> = registry.enumerate().iter().map(|id| id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "apm",
                "clusterChecks",
                "cws",
                "default",
                "dogstatsd",
                "kubernetesStateCore",
                "liveProcess",
                "logCollection",
                "npm",
            ]
        );
        assert!(matches!(
            register_builtin(&registry),
            Err(FeatureError::DuplicateFeature { .. })
        ));
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port(ID, "port", 8125).unwrap(), 8125);
        assert!(validate_port(ID, "port", 0).is_err());
        assert!(validate_port(ID, "port", 70000).is_err());
    }

    #[test]
    fn test_split_socket_path() {
        assert_eq!(
            split_socket_path(ID, "/var/run/beacon/dsd.socket").unwrap(),
            ("/var/run/beacon".to_string(), "dsd.socket".to_string())
        );
        assert!(split_socket_path(ID, "run/dsd.socket").is_err());
        assert!(split_socket_path(ID, "/var/run/").is_err());
        assert!(split_socket_path(ID, "/").is_err());
    }

    #[test]
    fn test_system_probe_setup_is_idempotent() {
        use crate::managers::test_support::{container, template_with};

        let mut template = template_with(&["agent", "system-probe"]);
        let mut managers = PodTemplateManagers::new(&mut template);
        configure_system_probe(&mut managers, &[AgentContainerName::Core]).unwrap();
        configure_system_probe(&mut managers, &[AgentContainerName::Core]).unwrap();

        let probe = container(&template, "system-probe");
        let caps = probe
            .security_context
            .as_ref()
            .and_then(|s| s.capabilities.as_ref())
            .and_then(|c| c.add.as_ref())
            .unwrap();
        assert_eq!(caps.len(), SYSTEM_PROBE_CAPABILITIES.len());
        assert_eq!(template.spec.as_ref().unwrap().volumes.as_ref().unwrap().len(), 2);

        let agent_mount = &container(&template, "agent").volume_mounts.as_ref().unwrap()[0];
        assert_eq!(agent_mount.read_only, Some(true));
        assert_eq!(
            test_support::env_value(&template, "agent", SYSTEM_PROBE_SOCKET_ENV).as_deref(),
            Some("/var/run/sysprobe/sysprobe.sock")
        );
    }

    #[test]
    fn test_custom_config_source() {
        assert_eq!(CustomConfigSource::resolve(ID, "conf", None).unwrap(), None);
        let inline = CustomConfig {
            config_data: Some("a: 1".to_string()),
            config_map: Some(ConfigMapConfig {
                name: "ignored".to_string(),
                items: Vec::new(),
            }),
        };
        assert_eq!(
            CustomConfigSource::resolve(ID, "conf", Some(inline)).unwrap(),
            Some(CustomConfigSource::Inline("a: 1".to_string()))
        );
        assert!(CustomConfigSource::resolve(ID, "conf", Some(CustomConfig::default())).is_err());
    }

    #[test]
    fn test_yaml_to_json_string() {
        let json = yaml_to_json_string(ID, "- name: my_profile\n  prefix: custom.\n").unwrap();
        assert_eq!(json, r#"[{"name":"my_profile","prefix":"custom."}]"#);
    }
}
