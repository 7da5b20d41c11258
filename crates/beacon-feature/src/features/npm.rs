//! Network performance monitoring through the eBPF system-probe

use crate::component::{AgentContainerName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{env_var, host_path_volume, volume_mount, PodTemplateManagers};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::Result;

use super::configure_system_probe;

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("npm");

/// Enable network monitoring in the probe
pub const NPM_ENABLED_ENV: &str = "BEACON_SYSTEM_PROBE_NETWORK_ENABLED";
/// Track NAT translations through conntrack
pub const CONNTRACK_ENV: &str = "BEACON_SYSTEM_PROBE_CONNTRACK_ENABLED";
/// Collect DNS statistics
pub const DNS_STATS_ENV: &str = "BEACON_SYSTEM_PROBE_COLLECT_DNS_STATS";
/// Tell the process agent the probe runs in its own container
pub const EXTERNAL_ENV: &str = "BEACON_SYSTEM_PROBE_EXTERNAL";

/// Construct the feature
pub fn build(_options: &FeatureOptions) -> Box<dyn Feature> {
    Box::<NpmFeature>::default()
}

#[derive(Debug, Default)]
struct NpmFeature {
    enable_conntrack: bool,
    collect_dns_stats: bool,
}

impl Feature for NpmFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let npm = input.features().npm.unwrap_or_default();
        if !npm.enabled.unwrap_or(false) {
            return Ok(RequiredComponents::default());
        }
        self.enable_conntrack = npm.enable_conntrack.unwrap_or(true);
        self.collect_dns_stats = npm.collect_dns_stats.unwrap_or(true);

        Ok(RequiredComponents {
            node_agent: RequiredComponent::required([
                AgentContainerName::Core,
                AgentContainerName::Process,
                AgentContainerName::SystemProbe,
            ]),
            ..Default::default()
        })
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _provider: &str) -> Result<()> {
        let probe = ContainerTarget::from(AgentContainerName::SystemProbe);
        let process = ContainerTarget::from(AgentContainerName::Process);

        configure_system_probe(
            managers,
            &[AgentContainerName::Core, AgentContainerName::Process],
        )?;

        let mut volumes = managers.volume();
        for (name, host, local) in [("procdir", "/proc", "/host/proc"), ("cgroups", "/sys/fs/cgroup", "/host/sys/fs/cgroup")] {
            volumes.add_volume(host_path_volume(name, host))?;
            for target in [probe, process] {
                volumes.add_volume_mount(target, volume_mount(name, local, true))?;
            }
        }

        let mut env = managers.env_var();
        for target in [probe, process] {
            env.add(target, env_var(NPM_ENABLED_ENV, "true"))?;
        }
        env.add(probe, env_var(CONNTRACK_ENV, self.enable_conntrack.to_string()))?;
        env.add(probe, env_var(DNS_STATS_ENV, self.collect_dns_stats.to_string()))?;
        env.add(process, env_var(EXTERNAL_ENV, "true"))
    }
}
