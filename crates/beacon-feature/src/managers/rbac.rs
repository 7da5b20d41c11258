//! RBAC accumulator
//!
//! Service accounts, roles and bindings are shared: several features add
//! rules to the same role, and several deployables may own the same role.
//! Rules from every contributor are unioned and normalized before they land
//! in the store, so the role body only depends on the set of rules, not on
//! which feature ran first.
//!
//! Contributions are tracked per owning deployable. Deleting a deployable's
//! RBAC removes only what it contributed; an object is dropped from the
//! store once nobody owns it.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::rbac::v1::{PolicyRule, RoleRef, Subject};
use tracing::debug;

use crate::component::ComponentName;
use crate::store::{Dependency, DependencyStore, ObjectKind, StoreKey};
use crate::{FeatureError, Result};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

type Owner = Option<ComponentName>;

/// Per-object ownership of RBAC contributions within one pass
#[derive(Debug, Default)]
pub struct RbacOwnership {
    owners: BTreeMap<StoreKey, BTreeSet<Owner>>,
    rules: BTreeMap<StoreKey, BTreeMap<Owner, Vec<PolicyRule>>>,
    subjects: BTreeMap<StoreKey, BTreeMap<Owner, Vec<Subject>>>,
}

/// Rule granting `verbs` on `resources` of `api_groups`
pub fn policy_rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    PolicyRule {
        api_groups: Some(strings(api_groups)),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

/// Sort and dedup the lists inside each rule, then sort rules by API group
/// and resource and drop duplicates
pub fn normalize_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Vec<PolicyRule> {
    let mut rules: Vec<PolicyRule> = rules
        .into_iter()
        .map(|mut rule| {
            sort_dedup(&mut rule.verbs);
            for list in [
                &mut rule.api_groups,
                &mut rule.resources,
                &mut rule.resource_names,
                &mut rule.non_resource_urls,
            ] {
                if let Some(items) = list {
                    sort_dedup(items);
                }
            }
            rule
        })
        .collect();
    rules.sort_by(|a, b| rule_sort_key(a).cmp(&rule_sort_key(b)));
    rules.dedup();
    rules
}

fn sort_dedup(items: &mut Vec<String>) {
    items.sort();
    items.dedup();
}

fn rule_sort_key(rule: &PolicyRule) -> (&[String], &[String], &[String], &[String], &[String]) {
    (
        rule.api_groups.as_deref().unwrap_or_default(),
        rule.resources.as_deref().unwrap_or_default(),
        rule.resource_names.as_deref().unwrap_or_default(),
        rule.non_resource_urls.as_deref().unwrap_or_default(),
        &rule.verbs,
    )
}

/// Adds service accounts, roles and bindings to the store
#[derive(Debug)]
pub struct RbacManager<'a> {
    store: &'a mut DependencyStore,
    ownership: &'a mut RbacOwnership,
    owner: Owner,
}

impl<'a> RbacManager<'a> {
    pub(crate) fn new(store: &'a mut DependencyStore, ownership: &'a mut RbacOwnership) -> Self {
        Self {
            store,
            ownership,
            owner: None,
        }
    }

    /// Attribute subsequent writes to `component`
    pub fn owned_by(mut self, component: ComponentName) -> Self {
        self.owner = Some(component);
        self
    }

    /// Ensure a service account exists
    pub fn add_service_account(&mut self, namespace: &str, name: &str) -> Result<()> {
        self.store
            .modify(ObjectKind::ServiceAccount, namespace, name, |_| Ok(()))?;
        self.own(StoreKey::new(ObjectKind::ServiceAccount, namespace, name));
        Ok(())
    }

    /// Add rules to namespaced Role `role_name` and bind it to
    /// `service_account`
    pub fn add_policy_rules(
        &mut self,
        namespace: &str,
        role_name: &str,
        service_account: &str,
        rules: Vec<PolicyRule>,
    ) -> Result<()> {
        self.add_rules(ObjectKind::Role, namespace, role_name, rules)?;
        self.bind(
            ObjectKind::RoleBinding,
            namespace,
            role_name,
            service_account,
        )
    }

    /// Add rules to ClusterRole `role_name` and bind it to `service_account`
    /// of `namespace`
    pub fn add_cluster_policy_rules(
        &mut self,
        namespace: &str,
        role_name: &str,
        service_account: &str,
        rules: Vec<PolicyRule>,
    ) -> Result<()> {
        self.add_rules(ObjectKind::ClusterRole, namespace, role_name, rules)?;
        self.bind(
            ObjectKind::ClusterRoleBinding,
            namespace,
            role_name,
            service_account,
        )
    }

    /// Remove everything `component` contributed in `namespace` (and its
    /// cluster-scoped objects). Returns the number of objects deleted.
    pub fn delete_by_component(&mut self, component: ComponentName, namespace: &str) -> Result<usize> {
        let owner = Some(component);
        let keys: Vec<StoreKey> = self
            .ownership
            .owners
            .iter()
            .filter(|(key, owners)| {
                owners.contains(&owner) && (key.namespace.is_empty() || key.namespace == namespace)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut deleted = 0;
        for key in keys {
            let remaining = match self.ownership.owners.get_mut(&key) {
                Some(owners) => {
                    owners.remove(&owner);
                    owners.len()
                }
                None => 0,
            };
            if let Some(contributions) = self.ownership.rules.get_mut(&key) {
                contributions.remove(&owner);
            }
            if let Some(contributions) = self.ownership.subjects.get_mut(&key) {
                contributions.remove(&owner);
            }

            if remaining == 0 {
                self.ownership.owners.remove(&key);
                self.ownership.rules.remove(&key);
                self.ownership.subjects.remove(&key);
                if self.store.delete(key.kind, &key.namespace, &key.name).is_some() {
                    deleted += 1;
                }
                continue;
            }
            match key.kind {
                ObjectKind::Role | ObjectKind::ClusterRole => self.write_rules(&key)?,
                ObjectKind::RoleBinding | ObjectKind::ClusterRoleBinding => {
                    self.write_binding(&key)?
                }
                _ => {}
            }
        }
        debug!(component = %component, namespace, deleted, "deleted rbac by component");
        Ok(deleted)
    }

    fn own(&mut self, key: StoreKey) {
        self.ownership.owners.entry(key).or_default().insert(self.owner);
    }

    fn add_rules(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        role_name: &str,
        rules: Vec<PolicyRule>,
    ) -> Result<()> {
        let key = StoreKey::new(kind, namespace, role_name);
        self.own(key.clone());
        self.ownership
            .rules
            .entry(key.clone())
            .or_default()
            .entry(self.owner)
            .or_default()
            .extend(rules);
        self.write_rules(&key)
    }

    fn write_rules(&mut self, key: &StoreKey) -> Result<()> {
        let merged = normalize_rules(
            self.ownership
                .rules
                .get(key)
                .into_iter()
                .flat_map(|by_owner| by_owner.values().flatten().cloned()),
        );
        self.store
            .modify(key.kind, &key.namespace, &key.name, |obj| match obj {
                Dependency::Role(role) => {
                    role.rules = Some(merged);
                    Ok(())
                }
                Dependency::ClusterRole(role) => {
                    role.rules = Some(merged);
                    Ok(())
                }
                other => Err(unexpected_kind(key, other)),
            })
    }

    fn bind(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        role_name: &str,
        service_account: &str,
    ) -> Result<()> {
        let key = StoreKey::new(kind, namespace, role_name);
        self.own(key.clone());
        self.ownership
            .subjects
            .entry(key.clone())
            .or_default()
            .entry(self.owner)
            .or_default()
            .push(Subject {
                api_group: None,
                kind: "ServiceAccount".to_string(),
                name: service_account.to_string(),
                namespace: Some(namespace.to_string()),
            });
        self.write_binding(&key)
    }

    fn write_binding(&mut self, key: &StoreKey) -> Result<()> {
        let mut subjects: Vec<Subject> = self
            .ownership
            .subjects
            .get(key)
            .into_iter()
            .flat_map(|by_owner| by_owner.values().flatten().cloned())
            .collect();
        subjects.sort_by(|a, b| {
            (a.namespace.as_deref(), a.name.as_str()).cmp(&(b.namespace.as_deref(), b.name.as_str()))
        });
        subjects.dedup();

        let role_kind = match key.kind {
            ObjectKind::ClusterRoleBinding => "ClusterRole",
            _ => "Role",
        };
        let role_ref = RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: role_kind.to_string(),
            name: key.name.clone(),
        };

        self.store
            .modify(key.kind, &key.namespace, &key.name, |obj| match obj {
                Dependency::RoleBinding(b) => {
                    b.role_ref = role_ref;
                    b.subjects = Some(subjects);
                    Ok(())
                }
                Dependency::ClusterRoleBinding(b) => {
                    b.role_ref = role_ref;
                    b.subjects = Some(subjects);
                    Ok(())
                }
                other => Err(unexpected_kind(key, other)),
            })
    }
}

fn unexpected_kind(key: &StoreKey, found: &Dependency) -> FeatureError {
    FeatureError::from(beacon_common::Error::internal_with_context(
        "rbac",
        format!("{key} holds a {}", found.kind()),
    ))
}
