//! Container port accumulator

use k8s_openapi::api::core::v1::{ContainerPort, PodTemplateSpec};

use super::merge::{merge_entry, MergePolicy, Mergeable};
use super::target_containers;
use crate::component::ContainerTarget;
use crate::Result;

impl Mergeable for ContainerPort {
    const KIND: &'static str = "port";

    // Named ports collide on name, anonymous ones on number and protocol
    fn merge_key(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "{}/{}",
                self.container_port,
                self.protocol.as_deref().unwrap_or("TCP")
            ),
        }
    }
}

/// Adds ports to the containers of a pod template
#[derive(Debug)]
pub struct PortManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> PortManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add a port; an existing port with the same key is kept
    pub fn add_port(&mut self, target: ContainerTarget, port: ContainerPort) -> Result<()> {
        self.add_opt(target, port, None)
    }

    /// Add a port, resolving a collision with `policy`
    pub fn add_port_with_merge_policy(
        &mut self,
        target: ContainerTarget,
        port: ContainerPort,
        policy: MergePolicy,
    ) -> Result<()> {
        self.add_opt(target, port, Some(policy))
    }

    fn add_opt(
        &mut self,
        target: ContainerTarget,
        port: ContainerPort,
        policy: Option<MergePolicy>,
    ) -> Result<()> {
        for container in target_containers(self.template, target) {
            let scope = container.name.clone();
            let ports = container.ports.get_or_insert_with(Vec::new);
            merge_entry(ports, port.clone(), policy, &scope)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::AgentContainerName;
    use crate::managers::test_support::{container, template_with};

    fn port(name: &str, number: i32, host: Option<i32>) -> ContainerPort {
        ContainerPort {
            name: Some(name.to_string()),
            container_port: number,
            host_port: host,
            protocol: Some("UDP".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_port_and_override() {
        let mut template = template_with(&["agent"]);
        let mut ports = PortManager::new(&mut template);
        let core = ContainerTarget::from(AgentContainerName::Core);
        ports.add_port(core, port("dogstatsdport", 8125, None)).unwrap();
        ports.add_port(core, port("dogstatsdport", 8125, Some(8125))).unwrap();

        let added = container(&template, "agent").ports.clone().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].host_port, None);

        let mut ports = PortManager::new(&mut template);
        ports
            .add_port_with_merge_policy(
                core,
                port("dogstatsdport", 8125, Some(8125)),
                MergePolicy::Override,
            )
            .unwrap();
        let added = container(&template, "agent").ports.clone().unwrap();
        assert_eq!(added[0].host_port, Some(8125));
    }

    #[test]
    fn test_anonymous_port_key() {
        let anonymous = ContainerPort {
            container_port: 8126,
            ..Default::default()
        };
        assert_eq!(anonymous.merge_key(), "8126/TCP");
    }
}
