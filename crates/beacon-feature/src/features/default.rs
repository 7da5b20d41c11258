//! Always-on baseline: service accounts, base RBAC, the cluster agent
//! service, install info and the settings every container needs.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, ObjectFieldSelector, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use beacon_common::DEFAULT_SITE;

use crate::component::{AgentContainerName, ComponentName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{env_var, policy_rule, PodTemplateManagers, ResourceManagers};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::Result;

use super::component_selector;

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("default");

/// Cluster name reported by every agent
pub const CLUSTER_NAME_ENV: &str = "BEACON_CLUSTER_NAME";
/// Intake site
pub const SITE_ENV: &str = "BEACON_SITE";
/// Kubelet host, resolved from the node the pod runs on
pub const KUBELET_HOST_ENV: &str = "BEACON_KUBERNETES_KUBELET_HOST";
/// Service through which node agents reach the cluster agent
pub const CLUSTER_AGENT_SERVICE_ENV: &str = "BEACON_CLUSTER_AGENT_KUBERNETES_SERVICE_NAME";
/// Pod annotation naming the node provider of a node agent variant
pub const PROVIDER_ANNOTATION: &str = "beacon.dev/provider";
/// Cluster agent command port
pub const CLUSTER_AGENT_PORT: i32 = 5005;

/// Construct the feature
pub fn build(_options: &FeatureOptions) -> Box<dyn Feature> {
    Box::<DefaultFeature>::default()
}

#[derive(Debug, Default)]
struct DefaultFeature {
    agent: String,
    namespace: String,
    cluster_name: Option<String>,
    site: String,
}

impl DefaultFeature {
    fn common_env(&self, managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        let mut env = managers.env_var();
        if let Some(cluster_name) = &self.cluster_name {
            env.add(ContainerTarget::All, env_var(CLUSTER_NAME_ENV, cluster_name.clone()))?;
        }
        env.add(ContainerTarget::All, env_var(SITE_ENV, self.site.clone()))
    }

    fn agent_env(&self, managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        self.common_env(managers)?;
        let mut env = managers.env_var();
        env.add(
            ContainerTarget::All,
            env_var(
                CLUSTER_AGENT_SERVICE_ENV,
                ComponentName::ClusterAgent.object_name(&self.agent),
            ),
        )?;
        env.add(
            ContainerTarget::All,
            EnvVar {
                name: KUBELET_HOST_ENV.to_string(),
                value: None,
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        api_version: None,
                        field_path: "status.hostIP".to_string(),
                    }),
                    ..Default::default()
                }),
            },
        )
    }

    fn provider_annotation(managers: &mut PodTemplateManagers<'_>, provider: &str) {
        if !provider.is_empty() && provider != "default" {
            managers.annotation().add(PROVIDER_ANNOTATION, provider);
        }
    }
}

impl Feature for DefaultFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let global = input.global();
        self.agent = input.name.clone();
        self.namespace = input.namespace.clone();
        self.cluster_name = global.cluster_name;
        self.site = global.site.unwrap_or_else(|| DEFAULT_SITE.to_string());

        Ok(RequiredComponents {
            cluster_agent: RequiredComponent::required([AgentContainerName::ClusterAgent]),
            node_agent: RequiredComponent::required([AgentContainerName::Core]),
            ..Default::default()
        })
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        components: &RequiredComponents,
    ) -> Result<()> {
        let ns = self.namespace.as_str();

        for component in ComponentName::ALL {
            if !components.get(component).is_enabled() {
                continue;
            }
            let name = component.object_name(&self.agent);
            let mut rbac = managers.rbac().owned_by(component);
            rbac.add_service_account(ns, &name)?;
            rbac.add_cluster_policy_rules(ns, &name, &name, base_rules(component))?;
            if component == ComponentName::ClusterAgent {
                rbac.add_policy_rules(
                    ns,
                    &name,
                    &name,
                    vec![
                        policy_rule(&[""], &["configmaps"], &["get", "create", "update"]),
                        policy_rule(&["coordination.k8s.io"], &["leases"], &["get", "create", "update"]),
                    ],
                )?;
            }
        }

        if components.cluster_agent.is_enabled() {
            let name = ComponentName::ClusterAgent.object_name(&self.agent);
            let selector = component_selector(&self.agent, ComponentName::ClusterAgent)
                .match_labels
                .unwrap_or_default();
            managers.service().add_service(
                &name,
                ns,
                selector,
                vec![ServicePort {
                    name: Some("agentport".to_string()),
                    port: CLUSTER_AGENT_PORT,
                    protocol: Some("TCP".to_string()),
                    target_port: Some(IntOrString::Int(CLUSTER_AGENT_PORT)),
                    ..Default::default()
                }],
                None,
            )?;
        }

        managers.config_map().add_config_map(
            &format!("{}-install-info", self.agent),
            ns,
            BTreeMap::from([(
                "install_info".to_string(),
                format!(
                    "install_method:\n  tool: beacon-operator\n  tool_version: {}\n",
                    env!("CARGO_PKG_VERSION")
                ),
            )]),
            None,
        )?;
        Ok(())
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        self.common_env(managers)
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, provider: &str) -> Result<()> {
        Self::provider_annotation(managers, provider);
        self.agent_env(managers)
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers<'_>,
        provider: &str,
    ) -> Result<()> {
        self.manage_node_agent(managers, provider)
    }

    fn manage_cluster_checks_runner(&self, managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        self.agent_env(managers)
    }
}

fn base_rules(component: ComponentName) -> Vec<k8s_openapi::api::rbac::v1::PolicyRule> {
    match component {
        ComponentName::NodeAgent => vec![
            policy_rule(&[""], &["nodes/metrics", "nodes/spec", "nodes/proxy", "nodes/stats"], &["get"]),
            policy_rule(&[""], &["endpoints"], &["get"]),
        ],
        ComponentName::ClusterAgent => vec![
            policy_rule(
                &[""],
                &["services", "endpoints", "pods", "nodes", "namespaces", "componentstatuses"],
                &["get", "list", "watch"],
            ),
            policy_rule(&[""], &["events"], &["get", "list", "watch", "create"]),
        ],
        ComponentName::ClusterChecksRunner => vec![
            policy_rule(&[""], &["services", "endpoints", "pods", "nodes"], &["list", "watch"]),
        ],
    }
}
