//! Cluster checks dispatched by the cluster agent to node agents or to
//! dedicated checks runners

use k8s_openapi::api::networking::v1::{NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicyPort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::{debug, warn};

use beacon_common::crd::common::NetworkPolicyFlavor;

use crate::checksum::{checksum_annotation_key, compute_checksum};
use crate::component::{AgentContainerName, ComponentName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{
    env_var, CiliumIngressRule, CiliumPolicySpec, CiliumPortProtocol, CiliumPortRule, MergePolicy,
    PodTemplateManagers, ResourceManagers,
};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::Result;

use super::component_selector;
use super::default::CLUSTER_AGENT_PORT;

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("clusterChecks");

/// Enable cluster check dispatching or running
pub const CLUSTER_CHECKS_ENABLED_ENV: &str = "BEACON_CLUSTER_CHECKS_ENABLED";
/// Additional autodiscovery config providers
pub const EXTRA_CONFIG_PROVIDERS_ENV: &str = "BEACON_EXTRA_CONFIG_PROVIDERS";
/// Additional autodiscovery listeners
pub const EXTRA_LISTENERS_ENV: &str = "BEACON_EXTRA_LISTENERS";

const KUBE_SERVICES_AND_ENDPOINTS: &str = "kube_endpoints kube_services";
const CLUSTER_AND_ENDPOINTS_CHECKS: &str = "clusterchecks endpointschecks";
const ENDPOINTS_CHECKS: &str = "endpointschecks";
const CLUSTER_CHECKS: &str = "clusterchecks";

/// Construct the feature
pub fn build(options: &FeatureOptions) -> Box<dyn Feature> {
    Box::new(ClusterChecksFeature {
        support_cilium: options.support_cilium,
        ..Default::default()
    })
}

#[derive(Debug, Default)]
struct ClusterChecksFeature {
    support_cilium: bool,
    agent: String,
    namespace: String,
    use_runners: bool,
    network_policy: Option<NetworkPolicyFlavor>,
    config_checksum: String,
}

impl ClusterChecksFeature {
    /// Node agents only pick up endpoint checks once runners take the
    /// cluster checks
    fn add_node_providers(&self, managers: &mut PodTemplateManagers<'_>, container: AgentContainerName) -> Result<()> {
        let providers = if self.use_runners {
            ENDPOINTS_CHECKS
        } else {
            CLUSTER_AND_ENDPOINTS_CHECKS
        };
        managers.env_var().add_with_merge_policy(
            ContainerTarget::from(container),
            env_var(EXTRA_CONFIG_PROVIDERS_ENV, providers),
            MergePolicy::AppendToValue,
        )
    }

    fn add_kubernetes_policy(&self, managers: &mut ResourceManagers, name: &str) -> Result<()> {
        let ingress = NetworkPolicyIngressRule {
            from: Some(vec![NetworkPolicyPeer {
                pod_selector: Some(component_selector(&self.agent, ComponentName::ClusterChecksRunner)),
                ..Default::default()
            }]),
            ports: Some(vec![NetworkPolicyPort {
                port: Some(IntOrString::Int(CLUSTER_AGENT_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
        };
        managers.network_policy().add_kubernetes_network_policy(
            name,
            &self.namespace,
            component_selector(&self.agent, ComponentName::ClusterAgent),
            vec![ingress],
            Vec::new(),
        )
    }

    fn add_cilium_policy(&self, managers: &mut ResourceManagers, name: &str) -> Result<()> {
        let spec = CiliumPolicySpec {
            description: "Ingress from cluster checks runners".to_string(),
            endpoint_selector: component_selector(&self.agent, ComponentName::ClusterAgent),
            ingress: vec![CiliumIngressRule {
                from_endpoints: vec![component_selector(&self.agent, ComponentName::ClusterChecksRunner)],
                to_ports: vec![CiliumPortRule {
                    ports: vec![CiliumPortProtocol {
                        port: CLUSTER_AGENT_PORT.to_string(),
                        protocol: "TCP".to_string(),
                    }],
                }],
            }],
        };
        managers
            .network_policy()
            .add_cilium_network_policy(name, &self.namespace, vec![spec])
    }
}

impl Feature for ClusterChecksFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let Some(config) = input.features().cluster_checks else {
            return Ok(RequiredComponents::default());
        };
        match config.enabled {
            None => return Ok(RequiredComponents::default()),
            Some(false) => {
                return Ok(RequiredComponents {
                    checks_runner: RequiredComponent::forbidden(),
                    ..Default::default()
                })
            }
            Some(true) => {}
        }

        self.agent = input.name.clone();
        self.namespace = input.namespace.clone();
        self.use_runners = config.use_cluster_checks_runners.unwrap_or(false);
        self.network_policy = input
            .global()
            .network_policy
            .and_then(|policy| policy.enabled_flavor());
        self.config_checksum = compute_checksum(&config)?;
        debug!(checksum = %self.config_checksum, "computed cluster checks config checksum");

        Ok(RequiredComponents {
            cluster_agent: RequiredComponent::required([AgentContainerName::ClusterAgent]),
            checks_runner: if self.use_runners {
                RequiredComponent::required([AgentContainerName::ClusterChecksRunner])
            } else {
                RequiredComponent::forbidden()
            },
            ..Default::default()
        })
    }

    fn manage_dependencies(&self, managers: &mut ResourceManagers, _components: &RequiredComponents) -> Result<()> {
        let name = ComponentName::ClusterAgent.object_name(&self.agent);
        match self.network_policy {
            None => Ok(()),
            Some(NetworkPolicyFlavor::Kubernetes) => self.add_kubernetes_policy(managers, &name),
            Some(NetworkPolicyFlavor::Cilium) if self.support_cilium => self.add_cilium_policy(managers, &name),
            Some(NetworkPolicyFlavor::Cilium) => {
                warn!(policy = %name, "cilium network policy requested but cilium support is off, skipping");
                Ok(())
            }
        }
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        let target = ContainerTarget::from(AgentContainerName::ClusterAgent);
        let mut env = managers.env_var();
        env.add(target, env_var(CLUSTER_CHECKS_ENABLED_ENV, "true"))?;
        env.add(target, env_var(EXTRA_CONFIG_PROVIDERS_ENV, KUBE_SERVICES_AND_ENDPOINTS))?;
        env.add(target, env_var(EXTRA_LISTENERS_ENV, KUBE_SERVICES_AND_ENDPOINTS))?;

        managers
            .annotation()
            .add(checksum_annotation_key(ID), self.config_checksum.clone());
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _provider: &str) -> Result<()> {
        self.add_node_providers(managers, AgentContainerName::Core)
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers<'_>,
        _provider: &str,
    ) -> Result<()> {
        self.add_node_providers(managers, AgentContainerName::UnprivilegedSingle)
    }

    fn manage_cluster_checks_runner(&self, managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        if !self.use_runners {
            return Ok(());
        }
        let target = ContainerTarget::from(AgentContainerName::ClusterChecksRunner);
        let mut env = managers.env_var();
        env.add(target, env_var(CLUSTER_CHECKS_ENABLED_ENV, "true"))?;
        env.add_with_merge_policy(
            target,
            env_var(EXTRA_CONFIG_PROVIDERS_ENV, CLUSTER_CHECKS),
            MergePolicy::AppendToValue,
        )
    }
}
