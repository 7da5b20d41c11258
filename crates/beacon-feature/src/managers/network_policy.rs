//! Network policies
//!
//! Kubernetes policies use the k8s-openapi types. Cilium policies are a
//! third-party CRD, so a minimal typed model is kept here covering the
//! endpoint selector and port rules the agents need.

use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};

use beacon_common::meta::object_meta;

use crate::store::DependencyStore;
use crate::Result;

/// CiliumNetworkPolicy (cilium.io/v2)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumNetworkPolicy {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Policy rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specs: Vec<CiliumPolicySpec>,
}

impl CiliumNetworkPolicy {
    const API_VERSION: &'static str = "cilium.io/v2";
    const KIND: &'static str = "CiliumNetworkPolicy";

    /// Create a policy from its rules
    pub fn new(metadata: ObjectMeta, specs: Vec<CiliumPolicySpec>) -> Self {
        Self {
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            metadata,
            specs,
        }
    }
}

/// One Cilium policy rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumPolicySpec {
    /// Human readable purpose
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Pods the rule applies to
    pub endpoint_selector: LabelSelector,
    /// Ingress rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress: Vec<CiliumIngressRule>,
}

/// Cilium ingress rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumIngressRule {
    /// Allowed source endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_endpoints: Vec<LabelSelector>,
    /// Allowed destination ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_ports: Vec<CiliumPortRule>,
}

/// Cilium port rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiliumPortRule {
    /// Ports
    pub ports: Vec<CiliumPortProtocol>,
}

/// Port and protocol pair
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CiliumPortProtocol {
    /// Port number as a string
    pub port: String,
    /// TCP, UDP or ANY
    pub protocol: String,
}

/// Registers network policies in the dependency store
#[derive(Debug)]
pub struct NetworkPolicyManager<'a> {
    store: &'a mut DependencyStore,
}

impl<'a> NetworkPolicyManager<'a> {
    pub(crate) fn new(store: &'a mut DependencyStore) -> Self {
        Self { store }
    }

    /// Store a Kubernetes NetworkPolicy.
    ///
    /// Policy types are derived from which rule lists are non-empty; an
    /// empty list still yields `Ingress` so the selected pods are isolated.
    pub fn add_kubernetes_network_policy(
        &mut self,
        name: &str,
        namespace: &str,
        pod_selector: LabelSelector,
        ingress: Vec<NetworkPolicyIngressRule>,
        egress: Vec<NetworkPolicyEgressRule>,
    ) -> Result<()> {
        let mut policy_types = vec!["Ingress".to_string()];
        if !egress.is_empty() {
            policy_types.push("Egress".to_string());
        }
        self.store.add_or_update(NetworkPolicy {
            metadata: object_meta(name, namespace),
            spec: Some(NetworkPolicySpec {
                pod_selector,
                policy_types: Some(policy_types),
                ingress: Some(ingress),
                egress: (!egress.is_empty()).then_some(egress),
            }),
        })
    }

    /// Store a CiliumNetworkPolicy
    pub fn add_cilium_network_policy(
        &mut self,
        name: &str,
        namespace: &str,
        specs: Vec<CiliumPolicySpec>,
    ) -> Result<()> {
        self.store
            .add_or_update(CiliumNetworkPolicy::new(object_meta(name, namespace), specs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::store::{Dependency, ObjectKind};

    fn selector(component: &str) -> LabelSelector {
        LabelSelector {
            match_labels: Some(BTreeMap::from([(
                "app.kubernetes.io/component".to_string(),
                component.to_string(),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn test_kubernetes_policy_types() {
        let mut store = DependencyStore::new();
        NetworkPolicyManager::new(&mut store)
            .add_kubernetes_network_policy(
                "beacon-cluster-agent",
                "monitoring",
                selector("cluster-agent"),
                vec![NetworkPolicyIngressRule::default()],
                Vec::new(),
            )
            .unwrap();

        let Some(Dependency::NetworkPolicy(policy)) =
            store.get(ObjectKind::NetworkPolicy, "monitoring", "beacon-cluster-agent")
        else {
            panic!("expected NetworkPolicy");
        };
        let spec = policy.spec.as_ref().unwrap();
        assert_eq!(spec.policy_types, Some(vec!["Ingress".to_string()]));
        assert!(spec.egress.is_none());
    }

    #[test]
    fn test_cilium_policy_serializes_with_type_meta() {
        let mut store = DependencyStore::new();
        let spec = CiliumPolicySpec {
            description: "Ingress from cluster workers".to_string(),
            endpoint_selector: selector("cluster-agent"),
            ingress: vec![CiliumIngressRule {
                from_endpoints: vec![selector("cluster-checks-runner")],
                to_ports: vec![CiliumPortRule {
                    ports: vec![CiliumPortProtocol {
                        port: "5005".to_string(),
                        protocol: "TCP".to_string(),
                    }],
                }],
            }],
        };
        NetworkPolicyManager::new(&mut store)
            .add_cilium_network_policy("beacon-cluster-agent", "monitoring", vec![spec])
            .unwrap();

        let stored = store
            .get(ObjectKind::CiliumNetworkPolicy, "monitoring", "beacon-cluster-agent")
            .expect("policy should be stored");
        let json = serde_json::to_value(stored).unwrap();
        assert_eq!(json["apiVersion"], "cilium.io/v2");
        assert_eq!(json["kind"], "CiliumNetworkPolicy");
        assert_eq!(json["specs"][0]["ingress"][0]["toPorts"][0]["ports"][0]["port"], "5005");
    }
}
