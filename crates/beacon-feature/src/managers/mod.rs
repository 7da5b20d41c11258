//! Accumulator managers
//!
//! Features never edit pod templates or auxiliary objects directly. They go
//! through these managers, which own the collision rules:
//!
//! - [`PodTemplateManagers`] wraps one pod template and hands out the env,
//!   volume, port, annotation and security-context managers
//! - [`ResourceManagers`] wraps the [`DependencyStore`] and hands out the
//!   RBAC, ConfigMap, Service and NetworkPolicy managers

mod annotation;
mod config_map;
mod env;
mod merge;
mod network_policy;
mod port;
mod rbac;
mod security;
mod service;
mod volume;

pub use annotation::AnnotationManager;
pub use config_map::ConfigMapManager;
pub use env::{env_var, EnvVarManager};
pub use merge::{MergePolicy, APPEND_SEPARATOR};
pub use network_policy::{
    CiliumIngressRule, CiliumNetworkPolicy, CiliumPolicySpec, CiliumPortProtocol, CiliumPortRule,
    NetworkPolicyManager,
};
pub use port::PortManager;
pub use rbac::{normalize_rules, policy_rule, RbacManager, RbacOwnership};
pub use security::SecurityContextManager;
pub use service::ServiceManager;
pub use volume::{host_path_volume, volume_mount, VolumeManager};

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use tracing::debug;

use crate::component::ContainerTarget;
use crate::store::DependencyStore;

/// Managers over one pod template
#[derive(Debug)]
pub struct PodTemplateManagers<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> PodTemplateManagers<'a> {
    /// Wrap a pod template
    pub fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// The template as mutated so far
    pub fn template(&self) -> &PodTemplateSpec {
        &*self.template
    }

    /// Environment variables
    pub fn env_var(&mut self) -> EnvVarManager<'_> {
        EnvVarManager::new(self.template)
    }

    /// Volumes and volume mounts
    pub fn volume(&mut self) -> VolumeManager<'_> {
        VolumeManager::new(self.template)
    }

    /// Container ports
    pub fn port(&mut self) -> PortManager<'_> {
        PortManager::new(self.template)
    }

    /// Pod annotations
    pub fn annotation(&mut self) -> AnnotationManager<'_> {
        AnnotationManager::new(self.template)
    }

    /// Capabilities and host namespaces
    pub fn security_context(&mut self) -> SecurityContextManager<'_> {
        SecurityContextManager::new(self.template)
    }
}

/// Managers over the dependency store of one pass
#[derive(Debug, Default)]
pub struct ResourceManagers {
    store: DependencyStore,
    ownership: RbacOwnership,
}

impl ResourceManagers {
    /// Fresh managers with an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying store
    pub fn store(&self) -> &DependencyStore {
        &self.store
    }

    /// Mutable access to the underlying store
    pub fn store_mut(&mut self) -> &mut DependencyStore {
        &mut self.store
    }

    /// Service accounts, roles and bindings
    pub fn rbac(&mut self) -> RbacManager<'_> {
        RbacManager::new(&mut self.store, &mut self.ownership)
    }

    /// Generated ConfigMaps
    pub fn config_map(&mut self) -> ConfigMapManager<'_> {
        ConfigMapManager::new(&mut self.store)
    }

    /// Services
    pub fn service(&mut self) -> ServiceManager<'_> {
        ServiceManager::new(&mut self.store)
    }

    /// Network policies
    pub fn network_policy(&mut self) -> NetworkPolicyManager<'_> {
        NetworkPolicyManager::new(&mut self.store)
    }

    /// Consume the managers into the finished store
    pub fn into_store(self) -> DependencyStore {
        self.store
    }
}

/// Containers of `template` addressed by `target`.
///
/// A named target missing from the template yields nothing; features may
/// address containers of processes that were not required this pass.
pub(crate) fn target_containers<'t>(
    template: &'t mut PodTemplateSpec,
    target: ContainerTarget,
) -> Vec<&'t mut Container> {
    let containers: Vec<&mut Container> = pod_spec(template)
        .containers
        .iter_mut()
        .filter(|c| target.matches(&c.name))
        .collect();
    if containers.is_empty() {
        debug!(container = %target, "no matching container in pod template");
    }
    containers
}

/// Pod spec of `template`, created if absent
pub(crate) fn pod_spec(template: &mut PodTemplateSpec) -> &mut PodSpec {
    template.spec.get_or_insert_with(PodSpec::default)
}
