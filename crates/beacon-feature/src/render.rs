//! One full composition pass
//!
//! [`render`] is what the reconciler calls: compose the features, build a
//! default pod template for every enabled deployable, drive the active
//! features over those templates and the dependency store, then apply the
//! per-component overrides from the spec. The result is a plain value the
//! applier can diff against the cluster.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use tracing::{debug, info};

use beacon_common::crd::v2alpha1::ComponentOverride;
use beacon_common::{
    DEFAULT_REGISTRY, LABEL_COMPONENT, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_MANAGED_BY_BEACON,
    LABEL_NAME,
};

use crate::component::{AgentContainerName, ComponentName, ContainerTarget};
use crate::driver::{compose_features, Composition};
use crate::feature::FeatureOptions;
use crate::input::AgentInput;
use crate::managers::{env_var, MergePolicy, PodTemplateManagers, ResourceManagers};
use crate::registry::FeatureRegistry;
use crate::required::RequiredComponents;
use crate::store::Dependency;
use crate::Result;

/// Image tag used for every agent container
pub const DEFAULT_AGENT_TAG: &str = "7";

/// Options for one render
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    /// Node provider label handed to node agent mutators
    pub provider: String,
    /// Options passed to every feature constructor
    pub features: FeatureOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            provider: "default".to_string(),
            features: FeatureOptions::default(),
        }
    }
}

/// Everything one pass produced
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedAgent {
    /// Merged requirements
    pub required: RequiredComponents,
    /// Cluster agent pod template, when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_agent: Option<PodTemplateSpec>,
    /// Node agent pod template, when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_agent: Option<PodTemplateSpec>,
    /// Cluster checks runner pod template, when enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks_runner: Option<PodTemplateSpec>,
    /// Auxiliary objects sorted by kind, namespace and name
    pub dependencies: Vec<Dependency>,
}

impl RenderedAgent {
    /// Pod template of one deployable
    pub fn template(&self, component: ComponentName) -> Option<&PodTemplateSpec> {
        match component {
            ComponentName::ClusterAgent => self.cluster_agent.as_ref(),
            ComponentName::NodeAgent => self.node_agent.as_ref(),
            ComponentName::ClusterChecksRunner => self.checks_runner.as_ref(),
        }
    }
}

/// Run one composition pass for `input`
pub fn render(
    registry: &FeatureRegistry,
    input: &AgentInput,
    options: &RenderOptions,
) -> Result<RenderedAgent> {
    let overrides = parse_overrides(&input.spec.overrides)?;
    let composition = compose_features(registry, input, &options.features)?;

    let mut resources = ResourceManagers::new();
    composition.manage_dependencies(&mut resources)?;

    let mut templates = BTreeMap::new();
    let mut skipped = BTreeSet::new();
    for component in ComponentName::ALL {
        let disabled = overrides
            .get(&component)
            .and_then(|o| o.disabled)
            .unwrap_or(false);
        if disabled || !composition.required.get(component).is_enabled() {
            debug!(component = %component, disabled, "component not rendered");
            skipped.insert(component);
            continue;
        }

        let template = render_component(
            &composition,
            input,
            options,
            component,
            overrides.get(&component).copied(),
        )?;
        templates.insert(component, template);
    }

    for component in &skipped {
        resources
            .rbac()
            .delete_by_component(*component, &input.namespace)?;
    }

    let dependencies = resources.into_store().into_objects();
    info!(
        agent = %input.name,
        namespace = %input.namespace,
        components = templates.len(),
        dependencies = dependencies.len(),
        "rendered agent"
    );

    Ok(RenderedAgent {
        required: composition.required,
        cluster_agent: templates.remove(&ComponentName::ClusterAgent),
        node_agent: templates.remove(&ComponentName::NodeAgent),
        checks_runner: templates.remove(&ComponentName::ClusterChecksRunner),
        dependencies,
    })
}

fn parse_overrides(
    overrides: &BTreeMap<String, ComponentOverride>,
) -> Result<BTreeMap<ComponentName, &ComponentOverride>> {
    overrides
        .iter()
        .map(|(key, value)| ComponentName::from_str(key).map(|component| (component, value)))
        .collect()
}

fn render_component(
    composition: &Composition,
    input: &AgentInput,
    options: &RenderOptions,
    component: ComponentName,
    component_override: Option<&ComponentOverride>,
) -> Result<PodTemplateSpec> {
    let required = composition.required.get(component);
    let mut containers = required.containers.clone();
    if containers.is_empty() {
        containers.push(component.default_container());
    }
    let mut template = default_template(input, component, &containers);

    match component {
        ComponentName::ClusterAgent => composition.manage_cluster_agent(&mut template)?,
        ComponentName::NodeAgent if required.single_container_strategy_enabled() => {
            composition.manage_single_container_node_agent(&mut template, &options.provider)?
        }
        ComponentName::NodeAgent => composition.manage_node_agent(&mut template, &options.provider)?,
        ComponentName::ClusterChecksRunner => composition.manage_cluster_checks_runner(&mut template)?,
    }

    if let Some(component_override) = component_override {
        let mut managers = PodTemplateManagers::new(&mut template);
        for env in &component_override.env {
            managers.env_var().add_with_merge_policy(
                ContainerTarget::All,
                env_var(env.name.clone(), env.value.clone()),
                MergePolicy::Override,
            )?;
        }
    }
    Ok(template)
}

/// Pod template with standard labels, the component's service account and
/// one bare container per required container name
fn default_template(
    input: &AgentInput,
    component: ComponentName,
    containers: &[AgentContainerName],
) -> PodTemplateSpec {
    let name = component.object_name(&input.name);
    let labels = BTreeMap::from([
        (LABEL_NAME.to_string(), name.clone()),
        (LABEL_INSTANCE.to_string(), input.name.clone()),
        (LABEL_COMPONENT.to_string(), component.suffix().to_string()),
        (LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_BEACON.to_string()),
    ]);

    let registry = input
        .global()
        .registry
        .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());
    let image = match component {
        ComponentName::ClusterAgent => "cluster-agent",
        ComponentName::NodeAgent | ComponentName::ClusterChecksRunner => "agent",
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(name),
            containers: containers
                .iter()
                .map(|c| Container {
                    name: c.to_string(),
                    image: Some(format!("{registry}/{image}:{DEFAULT_AGENT_TAG}")),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectKind;
    use beacon_common::crd::v2alpha1::{BeaconAgentSpec, EnvOverride};

    fn builtin() -> FeatureRegistry {
        FeatureRegistry::with_builtin_features().unwrap()
    }

    fn input_with(overrides: BTreeMap<String, ComponentOverride>) -> AgentInput {
        AgentInput::new(
            "beacon",
            "monitoring",
            BeaconAgentSpec {
                overrides,
                ..Default::default()
            },
        )
    }

    fn has(rendered: &RenderedAgent, kind: ObjectKind, name: &str) -> bool {
        rendered
            .dependencies
            .iter()
            .any(|d| d.kind() == kind && d.metadata().name.as_deref() == Some(name))
    }

    #[test]
    fn test_default_render_has_both_agents() {
        let rendered = render(&builtin(), &input_with(BTreeMap::new()), &RenderOptions::default()).unwrap();

        let node = rendered.node_agent.as_ref().expect("node agent rendered");
        let spec = node.spec.as_ref().unwrap();
        assert_eq!(spec.service_account_name.as_deref(), Some("beacon-agent"));
        assert_eq!(spec.containers[0].name, "agent");
        assert_eq!(
            spec.containers[0].image.as_deref(),
            Some("gcr.io/beacon/agent:7")
        );
        assert!(rendered.cluster_agent.is_some());
        assert!(rendered.checks_runner.is_none());
        assert!(has(&rendered, ObjectKind::ClusterRole, "beacon-cluster-agent"));
    }

    #[test]
    fn test_disabled_override_drops_component_and_rbac() {
        let overrides = BTreeMap::from([(
            "clusterAgent".to_string(),
            ComponentOverride {
                disabled: Some(true),
                ..Default::default()
            },
        )]);
        let rendered = render(&builtin(), &input_with(overrides), &RenderOptions::default()).unwrap();

        assert!(rendered.cluster_agent.is_none());
        assert!(rendered.node_agent.is_some());
        assert!(!has(&rendered, ObjectKind::ClusterRole, "beacon-cluster-agent"));
        assert!(!has(&rendered, ObjectKind::ServiceAccount, "beacon-cluster-agent"));
        assert!(has(&rendered, ObjectKind::ServiceAccount, "beacon-agent"));
    }

    #[test]
    fn test_env_override_replaces_feature_value() {
        let overrides = BTreeMap::from([(
            "nodeAgent".to_string(),
            ComponentOverride {
                env: vec![EnvOverride {
                    name: "BEACON_SITE".to_string(),
                    value: "eu.beacon.dev".to_string(),
                }],
                ..Default::default()
            },
        )]);
        let rendered = render(&builtin(), &input_with(overrides), &RenderOptions::default()).unwrap();

        let node = rendered.node_agent.unwrap();
        let env = node.spec.unwrap().containers[0].env.clone().unwrap();
        let site: Vec<_> = env.iter().filter(|e| e.name == "BEACON_SITE").collect();
        assert_eq!(site.len(), 1);
        assert_eq!(site[0].value.as_deref(), Some("eu.beacon.dev"));
    }

    #[test]
    fn test_unknown_override_key_is_rejected() {
        let overrides = BTreeMap::from([("sidecar".to_string(), ComponentOverride::default())]);
        let err = render(&builtin(), &input_with(overrides), &RenderOptions::default()).unwrap_err();
        assert!(err.to_string().contains("sidecar"));
    }
}
