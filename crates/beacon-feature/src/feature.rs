//! The feature contract
//!
//! A feature is one optional capability of the agent. It is constructed
//! fresh for every composition pass, decides from the spec whether it is
//! active, then contributes to the pod templates and auxiliary objects of
//! the deployables it required.
//!
//! # Example
//!
//! ```ignore
//! struct HelloFeature { enabled: bool }
//!
//! impl Feature for HelloFeature {
//!     fn id(&self) -> FeatureId { FeatureId::new("hello") }
//!
//!     fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
//!         self.enabled = input.global().cluster_name.is_some();
//!         Ok(if self.enabled {
//!             RequiredComponents {
//!                 node_agent: RequiredComponent::required([AgentContainerName::Core]),
//!                 ..Default::default()
//!             }
//!         } else {
//!             RequiredComponents::default()
//!         })
//!     }
//!
//!     fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _: &str) -> Result<()> {
//!         managers.env_var().add(ContainerTarget::All, env("HELLO", "1"))
//!     }
//! }
//! ```

use std::fmt;

use serde::Serialize;

use crate::input::AgentInput;
use crate::managers::{PodTemplateManagers, ResourceManagers};
use crate::required::RequiredComponents;
use crate::Result;

/// Stable identifier of a feature, unique within a registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FeatureId(&'static str);

impl FeatureId {
    /// Wrap an identifier
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    /// The identifier text
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Options handed to every feature constructor
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureOptions {
    /// Run process checks inside the core agent instead of the process agent
    pub process_checks_in_core_agent: bool,
    /// The cluster runs Cilium, so Cilium network policies may be generated
    pub support_cilium: bool,
}

/// Constructor stored in the registry
pub type BuildFn = fn(&FeatureOptions) -> Box<dyn Feature>;

/// One pluggable capability.
///
/// Only [`Feature::id`] and [`Feature::configure`] are mandatory; every
/// mutator defaults to contributing nothing.
pub trait Feature: Send + Sync {
    /// Identifier this feature was registered under
    fn id(&self) -> FeatureId;

    /// Inspect the spec, remember what the mutators need, and declare the
    /// deployables and containers required.
    ///
    /// An error aborts the whole composition pass.
    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents>;

    /// Register auxiliary objects (RBAC, ConfigMaps, Services, policies).
    ///
    /// `components` is the merged requirement set of the pass.
    fn manage_dependencies(
        &self,
        _managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        Ok(())
    }

    /// Mutate the cluster agent pod template
    fn manage_cluster_agent(&self, _managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        Ok(())
    }

    /// Mutate the node agent pod template (one container per process)
    fn manage_node_agent(
        &self,
        _managers: &mut PodTemplateManagers<'_>,
        _provider: &str,
    ) -> Result<()> {
        Ok(())
    }

    /// Mutate the node agent pod template when every process shares the
    /// unprivileged single container
    fn manage_single_container_node_agent(
        &self,
        _managers: &mut PodTemplateManagers<'_>,
        _provider: &str,
    ) -> Result<()> {
        Ok(())
    }

    /// Mutate the cluster checks runner pod template
    fn manage_cluster_checks_runner(&self, _managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature").field("id", &self.id()).finish()
    }
}
