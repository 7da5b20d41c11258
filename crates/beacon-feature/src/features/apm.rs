//! Trace intake on the node agent's trace-agent container

use k8s_openapi::api::core::v1::{ContainerPort, HostPathVolumeSource, Volume};

use beacon_common::crd::v2alpha1::{DEFAULT_APM_PORT, DEFAULT_APM_SOCKET_PATH};

use crate::component::{AgentContainerName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{env_var, volume_mount, MergePolicy, PodTemplateManagers};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::Result;

use super::{split_socket_path, validate_port};

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("apm");

/// Enable the trace agent
pub const ENABLED_ENV: &str = "BEACON_APM_ENABLED";
/// Trace receiver port
pub const RECEIVER_PORT_ENV: &str = "BEACON_APM_RECEIVER_PORT";
/// Accept traces from outside the pod
pub const NON_LOCAL_TRAFFIC_ENV: &str = "BEACON_APM_NON_LOCAL_TRAFFIC";
/// Trace receiver socket inside the container
pub const RECEIVER_SOCKET_ENV: &str = "BEACON_APM_RECEIVER_SOCKET";

/// Container port name
pub const PORT_NAME: &str = "traceport";
/// Socket volume name
pub const SOCKET_VOLUME: &str = "apmsocket";
/// Directory the socket volume is mounted at in the container
pub const SOCKET_LOCAL_PATH: &str = "/var/run/beacon/apm";

/// Construct the feature
pub fn build(_options: &FeatureOptions) -> Box<dyn Feature> {
    Box::<ApmFeature>::default()
}

#[derive(Debug, Default)]
struct ApmFeature {
    host_port: Option<i32>,
    socket: Option<(String, String)>,
}

impl ApmFeature {
    fn apply(&self, managers: &mut PodTemplateManagers<'_>, container: AgentContainerName) -> Result<()> {
        let target = ContainerTarget::from(container);
        managers.env_var().add(target, env_var(ENABLED_ENV, "true"))?;

        let mut port = ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: DEFAULT_APM_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        };
        if let Some(host_port) = self.host_port {
            port.host_port = Some(host_port);
            let mut env = managers.env_var();
            env.add(target, env_var(RECEIVER_PORT_ENV, host_port.to_string()))?;
            env.add(target, env_var(NON_LOCAL_TRAFFIC_ENV, "true"))?;
        }
        managers.port().add_port(target, port)?;

        if let Some((host_dir, socket_name)) = &self.socket {
            managers.env_var().add(
                target,
                env_var(RECEIVER_SOCKET_ENV, format!("{SOCKET_LOCAL_PATH}/{socket_name}")),
            )?;
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
        }
        Ok(())
    }
}

impl Feature for ApmFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let apm = input.features().apm.unwrap_or_default();
        if !apm.enabled.unwrap_or(false) {
            return Ok(RequiredComponents::default());
        }

        if let Some(host_port) = apm.host_port_config.filter(|h| h.enabled.unwrap_or(false)) {
            let port = host_port.port.unwrap_or(DEFAULT_APM_PORT);
            self.host_port = Some(validate_port(ID, "hostPortConfig.port", port)?);
        }
        if let Some(uds) = apm.unix_domain_socket_config.filter(|u| u.enabled.unwrap_or(false)) {
            let path = uds.path.as_deref().unwrap_or(DEFAULT_APM_SOCKET_PATH);
            self.socket = Some(split_socket_path(ID, path)?);
        }

        Ok(RequiredComponents {
            node_agent: RequiredComponent::required([AgentContainerName::Core, AgentContainerName::Trace]),
            ..Default::default()
        })
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _provider: &str) -> Result<()> {
        self.apply(managers, AgentContainerName::Trace)
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers<'_>,
        _provider: &str,
    ) -> Result<()> {
        self.apply(managers, AgentContainerName::UnprivilegedSingle)
    }
}
