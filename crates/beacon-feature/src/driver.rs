//! Composition driver
//!
//! One pass: build every registered feature fresh, configure each against
//! the input in identifier order, fold the requirements left to right, and
//! sort features into active and configured-but-inactive buckets. The
//! resulting [`Composition`] then drives the active features' mutators.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use tracing::{debug, info, warn};

use beacon_common::crd::v2alpha1::ContainerStrategy;

use crate::component::AgentContainerName;
use crate::feature::{Feature, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{PodTemplateManagers, ResourceManagers};
use crate::registry::FeatureRegistry;
use crate::required::RequiredComponents;
use crate::{FeatureError, Result};

/// Outcome of one composition pass
#[derive(Debug)]
pub struct Composition {
    /// Features that had an opinion but required nothing
    pub configured: Vec<Box<dyn Feature>>,
    /// Features that required at least one deployable, in identifier order
    pub enabled: Vec<Box<dyn Feature>>,
    /// Requirements merged across every feature
    pub required: RequiredComponents,
}

/// Configure every registered feature against `input`.
///
/// A configure error aborts the pass and is returned unchanged.
pub fn compose_features(
    registry: &FeatureRegistry,
    input: &AgentInput,
    options: &FeatureOptions,
) -> Result<Composition> {
    let mut configured = Vec::new();
    let mut enabled = Vec::new();
    let mut required = RequiredComponents::default();

    for mut feature in registry.build_all(options) {
        let id = feature.id();
        let components = feature.configure(input)?;
        required = required.merge(&components);

        if components.is_enabled() {
            debug!(feature = %id, "feature enabled");
            enabled.push(feature);
        } else if components.is_configured() {
            debug!(feature = %id, "feature configured but inactive");
            configured.push(feature);
        }
    }

    if input.global().container_strategy() == ContainerStrategy::Single {
        collapse_single_container(&mut required);
    }

    info!(
        agent = %input.name,
        namespace = %input.namespace,
        enabled = enabled.len(),
        configured = configured.len(),
        "composed features"
    );
    Ok(Composition {
        configured,
        enabled,
        required,
    })
}

/// Run every node agent process in the unprivileged single container when
/// no required container needs host privileges.
///
/// Applies to the node agent only; the other deployables always run one
/// container per process.
fn collapse_single_container(required: &mut RequiredComponents) {
    let node_agent = &mut required.node_agent;
    if !node_agent.is_enabled() {
        return;
    }
    if node_agent.is_privileged() {
        warn!(
            containers = ?node_agent.containers,
            "single container strategy requested but privileged containers are required"
        );
        return;
    }
    debug!(collapsed = ?node_agent.containers, "collapsing node agent to single container");
    node_agent.containers = vec![AgentContainerName::UnprivilegedSingle];
}

impl Composition {
    /// Let every enabled feature register its auxiliary objects.
    ///
    /// All features run even when some fail; failures are returned together.
    /// Writes are attributed to the running feature for conflict detection.
    pub fn manage_dependencies(&self, managers: &mut ResourceManagers) -> Result<()> {
        let mut errors = Vec::new();
        for feature in &self.enabled {
            let id = feature.id();
            managers.store_mut().set_current_writer(Some(id));
            if let Err(err) = feature.manage_dependencies(managers, &self.required) {
                warn!(feature = %id, error = %err, "dependency registration failed");
                errors.push(match err {
                    FeatureError::DependencyConflict { .. } | FeatureError::Dependency { .. } => err,
                    other => FeatureError::Dependency {
                        feature: id,
                        message: other.to_string(),
                    },
                });
            }
        }
        managers.store_mut().set_current_writer(None);
        FeatureError::aggregate(errors)
    }

    /// Apply every enabled feature to the cluster agent template
    pub fn manage_cluster_agent(&self, template: &mut PodTemplateSpec) -> Result<()> {
        let mut managers = PodTemplateManagers::new(template);
        for feature in &self.enabled {
            feature.manage_cluster_agent(&mut managers)?;
        }
        Ok(())
    }

    /// Apply every enabled feature to the node agent template
    pub fn manage_node_agent(&self, template: &mut PodTemplateSpec, provider: &str) -> Result<()> {
        let mut managers = PodTemplateManagers::new(template);
        for feature in &self.enabled {
            feature.manage_node_agent(&mut managers, provider)?;
        }
        Ok(())
    }

    /// Apply every enabled feature to a node agent template running the
    /// single unprivileged container
    pub fn manage_single_container_node_agent(
        &self,
        template: &mut PodTemplateSpec,
        provider: &str,
    ) -> Result<()> {
        let mut managers = PodTemplateManagers::new(template);
        for feature in &self.enabled {
            feature.manage_single_container_node_agent(&mut managers, provider)?;
        }
        Ok(())
    }

    /// Apply every enabled feature to the cluster checks runner template
    pub fn manage_cluster_checks_runner(&self, template: &mut PodTemplateSpec) -> Result<()> {
        let mut managers = PodTemplateManagers::new(template);
        for feature in &self.enabled {
            feature.manage_cluster_checks_runner(&mut managers)?;
        }
        Ok(())
    }
}
