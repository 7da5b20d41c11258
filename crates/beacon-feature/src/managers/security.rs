//! Security context accumulator
//!
//! Capabilities are a set per container: adding one that is already
//! present is not a collision.

use k8s_openapi::api::core::v1::{Capabilities, PodTemplateSpec, SecurityContext};

use super::{pod_spec, target_containers};
use crate::component::ContainerTarget;

/// Adds Linux capabilities and host namespace settings
#[derive(Debug)]
pub struct SecurityContextManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> SecurityContextManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add capabilities to the target containers, keeping first-added order
    pub fn add_capabilities(&mut self, target: ContainerTarget, capabilities: &[&str]) {
        for container in target_containers(self.template, target) {
            let added = container
                .security_context
                .get_or_insert_with(SecurityContext::default)
                .capabilities
                .get_or_insert_with(Capabilities::default)
                .add
                .get_or_insert_with(Vec::new);
            for cap in capabilities {
                if !added.iter().any(|c| c == cap) {
                    added.push((*cap).to_string());
                }
            }
        }
    }

    /// Share the host PID namespace with the pod
    pub fn enable_host_pid(&mut self) {
        pod_spec(self.template).host_pid = Some(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::AgentContainerName;
    use crate::managers::test_support::{container, template_with};

    fn caps(template: &PodTemplateSpec, name: &str) -> Vec<String> {
        container(template, name)
            .security_context
            .as_ref()
            .and_then(|s| s.capabilities.as_ref())
            .and_then(|c| c.add.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_capabilities_are_a_set() {
        let mut template = template_with(&["system-probe", "agent"]);
        let mut security = SecurityContextManager::new(&mut template);
        let probe = ContainerTarget::from(AgentContainerName::SystemProbe);
        security.add_capabilities(probe, &["SYS_ADMIN", "NET_ADMIN"]);
        security.add_capabilities(probe, &["NET_ADMIN", "BPF"]);

        assert_eq!(caps(&template, "system-probe"), vec!["SYS_ADMIN", "NET_ADMIN", "BPF"]);
        assert!(caps(&template, "agent").is_empty());
    }

    #[test]
    fn test_enable_host_pid() {
        let mut template = template_with(&["agent"]);
        assert_eq!(template.spec.as_ref().unwrap().host_pid, None);
        SecurityContextManager::new(&mut template).enable_host_pid();
        assert_eq!(template.spec.as_ref().unwrap().host_pid, Some(true));
    }
}
