//! Cloud workload security: runtime detection in the security-agent and
//! system-probe

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, Volume};

use beacon_common::crd::common::{ConfigMapConfig, KeyToPath};

use crate::checksum::{checksum_annotation_key, compute_checksum};
use crate::component::{AgentContainerName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{env_var, host_path_volume, volume_mount, PodTemplateManagers, ResourceManagers};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::Result;

use super::{config_map_volume, configure_system_probe, CustomConfigSource, SYSTEM_PROBE_SOCKET_DIR};

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("cws");

/// Enable runtime security
pub const ENABLED_ENV: &str = "BEACON_RUNTIME_SECURITY_CONFIG_ENABLED";
/// Socket between the probe and the security agent
pub const SOCKET_ENV: &str = "BEACON_RUNTIME_SECURITY_CONFIG_SOCKET";
/// Directory policies are loaded from
pub const POLICIES_DIR_ENV: &str = "BEACON_RUNTIME_SECURITY_CONFIG_POLICIES_DIR";
/// Accept policy updates over remote configuration
pub const REMOTE_CONFIGURATION_ENV: &str = "BEACON_RUNTIME_SECURITY_CONFIG_REMOTE_CONFIGURATION_ENABLED";
/// Host filesystem root as seen by the security agent
pub const HOST_ROOT_ENV: &str = "HOST_ROOT";

/// Policies directory inside the containers
pub const POLICIES_DIR: &str = "/etc/beacon-agent/runtime-security.d";
/// Key of the generated custom policy file
pub const CUSTOM_POLICY_KEY: &str = "custom.policy";

const CUSTOM_POLICIES_VOLUME: &str = "customruntimepolicies";
const CUSTOM_POLICIES_MOUNT: &str = "/etc/beacon-agent-runtime-policies";
const HOST_ROOT: &str = "/host/root";

/// Construct the feature
pub fn build(_options: &FeatureOptions) -> Box<dyn Feature> {
    Box::<CwsFeature>::default()
}

#[derive(Debug, Default)]
struct CwsFeature {
    agent: String,
    namespace: String,
    remote_configuration: bool,
    custom_policies: Option<CustomConfigSource>,
}

impl CwsFeature {
    fn generated_config_map_name(&self) -> String {
        format!("{}-cws-policies", self.agent)
    }

    fn custom_policies_data(data: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(CUSTOM_POLICY_KEY.to_string(), data.to_string())])
    }

    /// ConfigMap mounted as the custom policy source, generated or user's own
    fn policies_config_map(&self) -> Option<ConfigMapConfig> {
        match self.custom_policies.as_ref()? {
            CustomConfigSource::Inline(_) => Some(ConfigMapConfig {
                name: self.generated_config_map_name(),
                items: vec![KeyToPath {
                    key: CUSTOM_POLICY_KEY.to_string(),
                    path: CUSTOM_POLICY_KEY.to_string(),
                }],
            }),
            CustomConfigSource::ConfigMap(config_map) => Some(config_map.clone()),
        }
    }
}

impl Feature for CwsFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let cws = input.features().cws.unwrap_or_default();
        if !cws.enabled.unwrap_or(false) {
            return Ok(RequiredComponents::default());
        }
        self.agent = input.name.clone();
        self.namespace = input.namespace.clone();
        self.remote_configuration = cws.remote_configuration_enabled.unwrap_or(false);
        self.custom_policies = CustomConfigSource::resolve(ID, "customPolicies", cws.custom_policies)?;

        Ok(RequiredComponents {
            node_agent: RequiredComponent::required([
                AgentContainerName::Core,
                AgentContainerName::Security,
                AgentContainerName::SystemProbe,
            ]),
            ..Default::default()
        })
    }

    fn manage_dependencies(&self, managers: &mut ResourceManagers, _components: &RequiredComponents) -> Result<()> {
        if let Some(CustomConfigSource::Inline(data)) = &self.custom_policies {
            managers.config_map().add_config_map(
                &self.generated_config_map_name(),
                &self.namespace,
                Self::custom_policies_data(data),
                Some(&checksum_annotation_key(ID)),
            )?;
        }
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _provider: &str) -> Result<()> {
        let probe = ContainerTarget::from(AgentContainerName::SystemProbe);
        let security = ContainerTarget::from(AgentContainerName::Security);

        configure_system_probe(managers, &[AgentContainerName::Security])?;

        let mut volumes = managers.volume();
        volumes.add_volume_and_mount(
            probe,
            host_path_volume("securityfs", "/sys/kernel/security"),
            volume_mount("securityfs", "/host/sys/kernel/security", true),
        )?;
        for (name, host, local) in [
            ("procdir", "/proc", "/host/proc"),
            ("passwd", "/etc/passwd", "/etc/passwd"),
            ("group", "/etc/group", "/etc/group"),
            ("host-osrelease", "/etc/os-release", "/host/etc/os-release"),
        ] {
            volumes.add_volume_and_mount(probe, host_path_volume(name, host), volume_mount(name, local, true))?;
        }
        volumes.add_volume_and_mount(
            security,
            host_path_volume("hostroot", "/"),
            volume_mount("hostroot", HOST_ROOT, true),
        )?;

        if let Some(config_map) = self.policies_config_map() {
            volumes.add_volume(config_map_volume(CUSTOM_POLICIES_VOLUME, &config_map))?;
            volumes.add_volume(Volume {
                name: "runtimepoliciesdir".to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            })?;
            for target in [probe, security] {
                volumes.add_volume_mount(target, volume_mount(CUSTOM_POLICIES_VOLUME, CUSTOM_POLICIES_MOUNT, true))?;
                volumes.add_volume_mount(target, volume_mount("runtimepoliciesdir", POLICIES_DIR, true))?;
            }
        }

        let socket = format!("{SYSTEM_PROBE_SOCKET_DIR}/runtime-security.sock");
        let mut env = managers.env_var();
        for target in [probe, security] {
            env.add(target, env_var(ENABLED_ENV, "true"))?;
            env.add(target, env_var(SOCKET_ENV, socket.clone()))?;
            env.add(
                target,
                env_var(REMOTE_CONFIGURATION_ENV, self.remote_configuration.to_string()),
            )?;
        }
        env.add(probe, env_var(POLICIES_DIR_ENV, POLICIES_DIR))?;
        env.add(security, env_var(HOST_ROOT_ENV, HOST_ROOT))?;

        if let Some(CustomConfigSource::Inline(data)) = &self.custom_policies {
            managers.annotation().add(
                checksum_annotation_key(ID),
                compute_checksum(&Self::custom_policies_data(data))?,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{annotation, env_value, input};
    use crate::managers::test_support::template_with;
    use crate::store::{Dependency, ObjectKind};

    const INLINE: &str = r#"
features:
  cws:
    enabled: true
    customPolicies:
      configData: |
        rules:
          - id: exec_shell
"#;

    fn configured(spec: &str) -> CwsFeature {
        let mut feature = CwsFeature::default();
        let components = feature.configure(&input(spec)).unwrap();
        assert!(components.node_agent.is_privileged());
        feature
    }

    #[test]
    fn test_disabled_requires_nothing() {
        let components = CwsFeature::default().configure(&input("{}")).unwrap();
        assert!(!components.is_configured());
    }

    #[test]
    fn test_inline_policies_generate_config_map() {
        let feature = configured(INLINE);
        let mut managers = ResourceManagers::new();
        feature
            .manage_dependencies(&mut managers, &RequiredComponents::default())
            .unwrap();

        let Some(Dependency::ConfigMap(cm)) =
            managers.store().get(ObjectKind::ConfigMap, "monitoring", "beacon-cws-policies")
        else {
            panic!("expected generated policies ConfigMap");
        };
        let checksum = cm.metadata.annotations.as_ref().unwrap()[&checksum_annotation_key(ID)].clone();

        let mut template = template_with(&["agent", "security-agent", "system-probe"]);
        feature
            .manage_node_agent(&mut PodTemplateManagers::new(&mut template), "default")
            .unwrap();
        assert_eq!(annotation(&template, &checksum_annotation_key(ID)), Some(checksum));
        assert_eq!(env_value(&template, "system-probe", POLICIES_DIR_ENV).as_deref(), Some(POLICIES_DIR));
        assert_eq!(env_value(&template, "security-agent", HOST_ROOT_ENV).as_deref(), Some(HOST_ROOT));
        assert_eq!(env_value(&template, "agent", ENABLED_ENV), None);
    }

    #[test]
    fn test_user_config_map_is_mounted_without_checksum() {
        let feature = configured(
            r#"
features:
  cws:
    enabled: true
    customPolicies:
      configMap:
        name: my-policies
"#,
        );
        let mut managers = ResourceManagers::new();
        feature
            .manage_dependencies(&mut managers, &RequiredComponents::default())
            .unwrap();
        assert!(managers.store().is_empty());

        let mut template = template_with(&["security-agent", "system-probe"]);
        feature
            .manage_node_agent(&mut PodTemplateManagers::new(&mut template), "default")
            .unwrap();
        let volumes = template.spec.as_ref().unwrap().volumes.as_ref().unwrap();
        let policies = volumes.iter().find(|v| v.name == CUSTOM_POLICIES_VOLUME).unwrap();
        assert_eq!(policies.config_map.as_ref().unwrap().name, "my-policies");
        assert_eq!(annotation(&template, &checksum_annotation_key(ID)), None);
    }

    #[test]
    fn test_custom_policies_need_a_source() {
        let err = CwsFeature::default()
            .configure(&input("features:\n  cws:\n    enabled: true\n    customPolicies: {}\n"))
            .unwrap_err();
        assert!(matches!(err, crate::FeatureError::InvalidSpec { .. }));
    }
}
