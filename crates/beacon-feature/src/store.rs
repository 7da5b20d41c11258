//! Dependency store
//!
//! Auxiliary objects produced by features during one pass, keyed by
//! (kind, namespace, name). Iteration is always sorted by key so the
//! applier sees the same sequence every pass.
//!
//! Plain writes go through [`DependencyStore::add_or_update`], which rejects
//! a second feature writing different content under a key another feature
//! already owns. Accumulating managers (RBAC rules, policy subjects) use
//! [`DependencyStore::modify`] instead, a cooperative read-modify-write.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use tracing::debug;

use beacon_common::meta::{name_of, namespace_of, object_meta, set_label};
use beacon_common::STORE_LABEL_KEY;

use crate::feature::FeatureId;
use crate::managers::CiliumNetworkPolicy;
use crate::{FeatureError, Result};

/// Kinds of auxiliary objects the store holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    /// v1 ConfigMap
    ConfigMap,
    /// v1 Service
    Service,
    /// v1 ServiceAccount
    ServiceAccount,
    /// rbac/v1 Role
    Role,
    /// rbac/v1 RoleBinding
    RoleBinding,
    /// rbac/v1 ClusterRole
    ClusterRole,
    /// rbac/v1 ClusterRoleBinding
    ClusterRoleBinding,
    /// networking/v1 NetworkPolicy
    NetworkPolicy,
    /// cilium.io/v2 CiliumNetworkPolicy
    CiliumNetworkPolicy,
}

impl ObjectKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMap => "ConfigMap",
            Self::Service => "Service",
            Self::ServiceAccount => "ServiceAccount",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRole => "ClusterRole",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::CiliumNetworkPolicy => "CiliumNetworkPolicy",
        }
    }

    /// Whether objects of this kind live outside any namespace
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, Self::ClusterRole | Self::ClusterRoleBinding)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An auxiliary object
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Dependency {
    /// ConfigMap
    ConfigMap(ConfigMap),
    /// Service
    Service(Service),
    /// ServiceAccount
    ServiceAccount(ServiceAccount),
    /// Role
    Role(Role),
    /// RoleBinding
    RoleBinding(RoleBinding),
    /// ClusterRole
    ClusterRole(ClusterRole),
    /// ClusterRoleBinding
    ClusterRoleBinding(ClusterRoleBinding),
    /// NetworkPolicy
    NetworkPolicy(NetworkPolicy),
    /// CiliumNetworkPolicy
    CiliumNetworkPolicy(CiliumNetworkPolicy),
}

macro_rules! dependency_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Dependency {
                fn from(obj: $variant) -> Self {
                    Dependency::$variant(obj)
                }
            }
        )*
    };
}

dependency_from!(
    ConfigMap,
    Service,
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    NetworkPolicy,
    CiliumNetworkPolicy,
);

impl Dependency {
    /// An object of `kind` with only metadata set
    pub fn empty(kind: ObjectKind, meta: ObjectMeta) -> Self {
        match kind {
            ObjectKind::ConfigMap => ConfigMap {
                metadata: meta,
                ..Default::default()
            }
            .into(),
            ObjectKind::Service => Service {
                metadata: meta,
                ..Default::default()
            }
            .into(),
            ObjectKind::ServiceAccount => ServiceAccount {
                metadata: meta,
                ..Default::default()
            }
            .into(),
            ObjectKind::Role => Role {
                metadata: meta,
                ..Default::default()
            }
            .into(),
            ObjectKind::RoleBinding => RoleBinding {
                metadata: meta,
                ..Default::default()
            }
            .into(),
            ObjectKind::ClusterRole => ClusterRole {
                metadata: meta,
                ..Default::default()
            }
            .into(),
            ObjectKind::ClusterRoleBinding => ClusterRoleBinding {
                metadata: meta,
                ..Default::default()
            }
            .into(),
            ObjectKind::NetworkPolicy => NetworkPolicy {
                metadata: meta,
                ..Default::default()
            }
            .into(),
            ObjectKind::CiliumNetworkPolicy => CiliumNetworkPolicy::new(meta, Vec::new()).into(),
        }
    }

    /// Kind of the wrapped object
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::ConfigMap(_) => ObjectKind::ConfigMap,
            Self::Service(_) => ObjectKind::Service,
            Self::ServiceAccount(_) => ObjectKind::ServiceAccount,
            Self::Role(_) => ObjectKind::Role,
            Self::RoleBinding(_) => ObjectKind::RoleBinding,
            Self::ClusterRole(_) => ObjectKind::ClusterRole,
            Self::ClusterRoleBinding(_) => ObjectKind::ClusterRoleBinding,
            Self::NetworkPolicy(_) => ObjectKind::NetworkPolicy,
            Self::CiliumNetworkPolicy(_) => ObjectKind::CiliumNetworkPolicy,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ConfigMap(o) => &o.metadata,
            Self::Service(o) => &o.metadata,
            Self::ServiceAccount(o) => &o.metadata,
            Self::Role(o) => &o.metadata,
            Self::RoleBinding(o) => &o.metadata,
            Self::ClusterRole(o) => &o.metadata,
            Self::ClusterRoleBinding(o) => &o.metadata,
            Self::NetworkPolicy(o) => &o.metadata,
            Self::CiliumNetworkPolicy(o) => &o.metadata,
        }
    }

    /// Mutable object metadata
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::ConfigMap(o) => &mut o.metadata,
            Self::Service(o) => &mut o.metadata,
            Self::ServiceAccount(o) => &mut o.metadata,
            Self::Role(o) => &mut o.metadata,
            Self::RoleBinding(o) => &mut o.metadata,
            Self::ClusterRole(o) => &mut o.metadata,
            Self::ClusterRoleBinding(o) => &mut o.metadata,
            Self::NetworkPolicy(o) => &mut o.metadata,
            Self::CiliumNetworkPolicy(o) => &mut o.metadata,
        }
    }

    /// Store key of the object
    pub fn key(&self) -> StoreKey {
        StoreKey::new(
            self.kind(),
            namespace_of(self.metadata()),
            name_of(self.metadata()),
        )
    }
}

/// Identity of a stored object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey {
    /// Object kind
    pub kind: ObjectKind,
    /// Namespace, empty for cluster-scoped kinds
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl StoreKey {
    /// Build a key; the namespace is dropped for cluster-scoped kinds
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = if kind.is_cluster_scoped() {
            String::new()
        } else {
            namespace.into()
        };
        Self {
            kind,
            namespace,
            name: name.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

#[derive(Clone, Debug)]
struct StoredObject {
    object: Dependency,
    writer: Option<FeatureId>,
}

/// Keyed collection of auxiliary objects for one pass
#[derive(Clone, Debug, Default)]
pub struct DependencyStore {
    objects: BTreeMap<StoreKey, StoredObject>,
    current_writer: Option<FeatureId>,
}

impl DependencyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute subsequent writes to `feature` (`None` for the driver)
    pub fn set_current_writer(&mut self, feature: Option<FeatureId>) {
        self.current_writer = feature;
    }

    /// Insert or replace an object.
    ///
    /// Replacing content written by a different feature is a
    /// [`FeatureError::DependencyConflict`] unless the content is identical.
    pub fn add_or_update(&mut self, object: impl Into<Dependency>) -> Result<()> {
        let mut object = object.into();
        label(&mut object);
        let key = object.key();

        if let Some(existing) = self.objects.get(&key) {
            let other_writer = existing.writer.is_some()
                && self.current_writer.is_some()
                && existing.writer != self.current_writer;
            if other_writer && existing.object != object {
                return Err(FeatureError::DependencyConflict {
                    kind: key.kind,
                    namespace: key.namespace,
                    name: key.name,
                    first: writer_name(existing.writer),
                    second: writer_name(self.current_writer),
                });
            }
        }

        debug!(object = %key, writer = %writer_name(self.current_writer), "store upsert");
        self.objects.insert(
            key,
            StoredObject {
                object,
                writer: self.current_writer,
            },
        );
        Ok(())
    }

    /// Look up an object
    pub fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Option<&Dependency> {
        self.objects
            .get(&StoreKey::new(kind, namespace, name))
            .map(|stored| &stored.object)
    }

    /// Look up an object, inserting an empty one with standard metadata if
    /// absent
    pub fn get_or_create(&mut self, kind: ObjectKind, namespace: &str, name: &str) -> &mut Dependency {
        let key = StoreKey::new(kind, namespace, name);
        let writer = self.current_writer;
        let stored = self.objects.entry(key.clone()).or_insert_with(|| {
            let mut object = Dependency::empty(kind, object_meta(key.name.clone(), key.namespace.clone()));
            label(&mut object);
            StoredObject { object, writer }
        });
        &mut stored.object
    }

    /// Read-modify-write an object, creating it first if absent.
    ///
    /// Skips the conflict check; the closure is expected to merge rather
    /// than overwrite. The object is re-labelled and its writer updated.
    pub fn modify<F>(&mut self, kind: ObjectKind, namespace: &str, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Dependency) -> Result<()>,
    {
        let writer = self.current_writer;
        let object = self.get_or_create(kind, namespace, name);
        f(object)?;
        label(object);
        if let Some(stored) = self.objects.get_mut(&StoreKey::new(kind, namespace, name)) {
            stored.writer = writer;
        }
        Ok(())
    }

    /// Remove an object
    pub fn delete(&mut self, kind: ObjectKind, namespace: &str, name: &str) -> Option<Dependency> {
        self.objects
            .remove(&StoreKey::new(kind, namespace, name))
            .map(|stored| stored.object)
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects sorted by (kind, namespace, name)
    pub fn iter(&self) -> impl Iterator<Item = (&StoreKey, &Dependency)> {
        self.objects.iter().map(|(k, stored)| (k, &stored.object))
    }

    /// Consume the store into its objects, sorted by key
    pub fn into_objects(self) -> Vec<Dependency> {
        self.objects.into_values().map(|stored| stored.object).collect()
    }
}

fn label(object: &mut Dependency) {
    set_label(object.metadata_mut(), STORE_LABEL_KEY, "true");
}

fn writer_name(writer: Option<FeatureId>) -> String {
    writer.map_or_else(|| "driver".to_string(), |id| id.to_string())
}
