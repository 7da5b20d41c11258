//! DogStatsD metrics intake on the node agent
//!
//! UDP on the core container, optionally exposed on the host, plus an
//! optional unix socket shared with workloads through a host directory.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, ContainerPort, EnvVar, EnvVarSource, HostPathVolumeSource, ServicePort,
    Volume,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use beacon_common::crd::common::CustomConfig;
use beacon_common::crd::v2alpha1::{DEFAULT_DOGSTATSD_PORT, DEFAULT_DOGSTATSD_SOCKET_PATH};

use crate::component::{AgentContainerName, ComponentName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{env_var, volume_mount, MergePolicy, PodTemplateManagers, ResourceManagers};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::{FeatureError, Result};

use super::{component_selector, split_socket_path, validate_port, yaml_to_json_string};

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("dogstatsd");

/// Port the agent listens on
pub const PORT_ENV: &str = "BEACON_DOGSTATSD_PORT";
/// Accept packets from outside the pod
pub const NON_LOCAL_TRAFFIC_ENV: &str = "BEACON_DOGSTATSD_NON_LOCAL_TRAFFIC";
/// Socket path inside the container
pub const SOCKET_ENV: &str = "BEACON_DOGSTATSD_SOCKET";
/// Tag metrics with the sending container
pub const ORIGIN_DETECTION_ENV: &str = "BEACON_DOGSTATSD_ORIGIN_DETECTION";
/// Metric name mapper profiles as JSON
pub const MAPPER_PROFILES_ENV: &str = "BEACON_DOGSTATSD_MAPPER_PROFILES";

/// Container port name
pub const PORT_NAME: &str = "dogstatsdport";
/// Socket volume name
pub const SOCKET_VOLUME: &str = "dsdsocket";
/// Directory the socket volume is mounted at in the container
pub const SOCKET_LOCAL_PATH: &str = "/var/run/beacon/statsd";

/// Construct the feature
pub fn build(_options: &FeatureOptions) -> Box<dyn Feature> {
    Box::<DogstatsdFeature>::default()
}

#[derive(Debug, Default)]
struct DogstatsdFeature {
    namespace: String,
    host_port: Option<i32>,
    /// (host directory, socket file name)
    socket: Option<(String, String)>,
    origin_detection: bool,
    mapper_profiles: Option<CustomConfig>,
    local_service: Option<String>,
    agent: String,
}

impl DogstatsdFeature {
    fn apply(&self, managers: &mut PodTemplateManagers<'_>, container: AgentContainerName) -> Result<()> {
        let target = ContainerTarget::from(container);

        let mut port = ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: DEFAULT_DOGSTATSD_PORT,
            protocol: Some("UDP".to_string()),
            ..Default::default()
        };
        if let Some(host_port) = self.host_port {
            port.host_port = Some(host_port);
            let mut env = managers.env_var();
            env.add(target, env_var(PORT_ENV, host_port.to_string()))?;
            env.add(target, env_var(NON_LOCAL_TRAFFIC_ENV, "true"))?;
        }
        managers.port().add_port(target, port)?;

        if let Some((host_dir, socket_name)) = &self.socket {
            let mut volumes = managers.volume();
            volumes.add_volume(Volume {
                name: SOCKET_VOLUME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: host_dir.clone(),
                    type_: Some("DirectoryOrCreate".to_string()),
                }),
                ..Default::default()
            })?;
            volumes.add_volume_mount_with_merge_policy(
                target,
                volume_mount(SOCKET_VOLUME, SOCKET_LOCAL_PATH, false),
                MergePolicy::Override,
            )?;
            managers.env_var().add(
                ContainerTarget::All,
                env_var(SOCKET_ENV, format!("{SOCKET_LOCAL_PATH}/{socket_name}")),
            )?;
        }

        if self.origin_detection {
            managers.env_var().add(target, env_var(ORIGIN_DETECTION_ENV, "true"))?;
            if self.socket.is_some() {
                managers.security_context().enable_host_pid();
            }
        }

        if let Some(profiles) = &self.mapper_profiles {
            managers.env_var().add(target, self.mapper_profiles_env(profiles)?)?;
        }
        Ok(())
    }

    fn mapper_profiles_env(&self, profiles: &CustomConfig) -> Result<EnvVar> {
        if let Some(data) = &profiles.config_data {
            return Ok(env_var(MAPPER_PROFILES_ENV, yaml_to_json_string(ID, data)?));
        }
        let config_map = profiles
            .config_map
            .as_ref()
            .ok_or_else(|| FeatureError::invalid_spec(ID, "mapperProfiles needs configData or configMap"))?;
        let item = config_map.items.first().ok_or_else(|| {
            FeatureError::invalid_spec(ID, "mapperProfiles.configMap needs at least one item")
        })?;
        Ok(EnvVar {
            name: MAPPER_PROFILES_ENV.to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    name: config_map.name.clone(),
                    key: item.key.clone(),
                    optional: None,
                }),
                ..Default::default()
            }),
        })
    }
}

impl Feature for DogstatsdFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let dogstatsd = input.features().dogstatsd.unwrap_or_default();
        self.agent = input.name.clone();
        self.namespace = input.namespace.clone();

        if let Some(host_port) = dogstatsd.host_port_config.filter(|h| h.enabled.unwrap_or(false)) {
            let port = host_port.port.unwrap_or(DEFAULT_DOGSTATSD_PORT);
            self.host_port = Some(validate_port(ID, "hostPortConfig.port", port)?);
        }

        if let Some(uds) = dogstatsd.unix_domain_socket_config.filter(|u| u.enabled.unwrap_or(false)) {
            let path = uds.path.as_deref().unwrap_or(DEFAULT_DOGSTATSD_SOCKET_PATH);
            self.socket = Some(split_socket_path(ID, path)?);
        }

        self.origin_detection = dogstatsd.origin_detection_enabled.unwrap_or(false);
        self.mapper_profiles = dogstatsd.mapper_profiles;

        let local_service = input.global().local_service.unwrap_or_default();
        if local_service.force_enable.unwrap_or(false) {
            self.local_service = Some(
                local_service
                    .name_override
                    .unwrap_or_else(|| ComponentName::NodeAgent.object_name(&input.name)),
            );
        }

        Ok(RequiredComponents {
            node_agent: RequiredComponent::required([AgentContainerName::Core]),
            ..Default::default()
        })
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        let Some(service_name) = &self.local_service else {
            return Ok(());
        };
        let (name, port) = match self.host_port {
            Some(host_port) => ("dogstatsdhostport", host_port),
            None => (PORT_NAME, DEFAULT_DOGSTATSD_PORT),
        };
        let selector = component_selector(&self.agent, ComponentName::NodeAgent)
            .match_labels
            .unwrap_or_else(BTreeMap::new);
        managers.service().add_service(
            service_name,
            &self.namespace,
            selector,
            vec![ServicePort {
                name: Some(name.to_string()),
                port,
                protocol: Some("UDP".to_string()),
                target_port: Some(IntOrString::Int(DEFAULT_DOGSTATSD_PORT)),
                ..Default::default()
            }],
            Some("Local"),
        )
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _provider: &str) -> Result<()> {
        self.apply(managers, AgentContainerName::Core)
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers<'_>,
        _provider: &str,
    ) -> Result<()> {
        self.apply(managers, AgentContainerName::UnprivilegedSingle)
    }
}
