//! Live process collection, in the process-agent or folded into the core
//! agent

use crate::component::{AgentContainerName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{env_var, host_path_volume, volume_mount, PodTemplateManagers};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::Result;

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("liveProcess");

/// Enable process collection
pub const COLLECTION_ENABLED_ENV: &str = "BEACON_PROCESS_CONFIG_PROCESS_COLLECTION_ENABLED";
/// Whether process checks run inside the core agent
pub const RUN_IN_CORE_AGENT_ENV: &str = "BEACON_PROCESS_CONFIG_RUN_IN_CORE_AGENT_ENABLED";
/// Hide sensitive words in command lines
pub const SCRUB_ARGS_ENV: &str = "BEACON_PROCESS_CONFIG_SCRUB_ARGS";
/// Drop command line arguments entirely
pub const STRIP_ARGS_ENV: &str = "BEACON_PROCESS_CONFIG_STRIP_PROC_ARGUMENTS";

/// Construct the feature
pub fn build(options: &FeatureOptions) -> Box<dyn Feature> {
    Box::new(LiveProcessFeature {
        run_in_core_agent: options.process_checks_in_core_agent,
        ..Default::default()
    })
}

#[derive(Debug, Default)]
struct LiveProcessFeature {
    run_in_core_agent: bool,
    scrub_args: Option<bool>,
    strip_args: Option<bool>,
}

impl LiveProcessFeature {
    fn collecting_container(&self) -> AgentContainerName {
        if self.run_in_core_agent {
            AgentContainerName::Core
        } else {
            AgentContainerName::Process
        }
    }

    fn apply(&self, managers: &mut PodTemplateManagers<'_>, container: AgentContainerName) -> Result<()> {
        let target = ContainerTarget::from(container);

        let mut volumes = managers.volume();
        for (name, host, local) in [
            ("passwd", "/etc/passwd", "/etc/passwd"),
            ("cgroups", "/sys/fs/cgroup", "/host/sys/fs/cgroup"),
            ("procdir", "/proc", "/host/proc"),
        ] {
            volumes.add_volume_and_mount(target, host_path_volume(name, host), volume_mount(name, local, true))?;
        }

        let mut env = managers.env_var();
        env.add(target, env_var(COLLECTION_ENABLED_ENV, "true"))?;
        if let Some(scrub) = self.scrub_args {
            env.add(target, env_var(SCRUB_ARGS_ENV, scrub.to_string()))?;
        }
        if let Some(strip) = self.strip_args {
            env.add(target, env_var(STRIP_ARGS_ENV, strip.to_string()))?;
        }
        Ok(())
    }
}

impl Feature for LiveProcessFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let process = input.features().live_process.unwrap_or_default();
        if !process.enabled.unwrap_or(false) {
            return Ok(RequiredComponents::default());
        }
        self.scrub_args = process.scrub_process_arguments;
        self.strip_args = process.strip_process_arguments;

        let mut containers = vec![AgentContainerName::Core];
        if !self.run_in_core_agent {
            containers.push(AgentContainerName::Process);
        }
        Ok(RequiredComponents {
            node_agent: RequiredComponent::required(containers),
            ..Default::default()
        })
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _provider: &str) -> Result<()> {
        let run_in_core = env_var(RUN_IN_CORE_AGENT_ENV, self.run_in_core_agent.to_string());
        let mut env = managers.env_var();
        for container in [AgentContainerName::Core, AgentContainerName::Process] {
            env.add(ContainerTarget::from(container), run_in_core.clone())?;
        }
        self.apply(managers, self.collecting_container())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers<'_>,
        _provider: &str,
    ) -> Result<()> {
        self.apply(managers, AgentContainerName::UnprivilegedSingle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{env_value, input};
    use crate::managers::test_support::template_with;

    const ENABLED: &str = "features:\n  liveProcess:\n    enabled: true\n    scrubProcessArguments: false\n";

    fn rendered(options: FeatureOptions) -> (RequiredComponents, k8s_openapi::api::core::v1::PodTemplateSpec) {
        let mut feature = build(&options);
        let components = feature.configure(&input(ENABLED)).unwrap();
        let mut template = template_with(&["agent", "process-agent"]);
        feature
            .manage_node_agent(&mut PodTemplateManagers::new(&mut template), "default")
            .unwrap();
        (components, template)
    }

    #[test]
    fn test_process_agent_collects() {
        let (components, template) = rendered(FeatureOptions::default());
        assert_eq!(
            components.node_agent.containers,
            vec![AgentContainerName::Core, AgentContainerName::Process]
        );
        assert_eq!(
            env_value(&template, "process-agent", COLLECTION_ENABLED_ENV).as_deref(),
            Some("true")
        );
        assert_eq!(env_value(&template, "process-agent", SCRUB_ARGS_ENV).as_deref(), Some("false"));
        assert_eq!(env_value(&template, "process-agent", STRIP_ARGS_ENV), None);
        assert_eq!(env_value(&template, "agent", COLLECTION_ENABLED_ENV), None);
        assert_eq!(env_value(&template, "agent", RUN_IN_CORE_AGENT_ENV).as_deref(), Some("false"));
    }

    #[test]
    fn test_core_agent_collects() {
        let (components, template) = rendered(FeatureOptions {
            process_checks_in_core_agent: true,
            ..Default::default()
        });
        assert_eq!(components.node_agent.containers, vec![AgentContainerName::Core]);
        assert_eq!(env_value(&template, "agent", COLLECTION_ENABLED_ENV).as_deref(), Some("true"));
        assert_eq!(env_value(&template, "process-agent", COLLECTION_ENABLED_ENV), None);
    }

    #[test]
    fn test_disabled_requires_nothing() {
        let components = build(&FeatureOptions::default())
            .configure(&input("{}"))
            .unwrap();
        assert!(!components.is_configured());
    }
}
