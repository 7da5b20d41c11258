//! Services

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};

use beacon_common::meta::object_meta;

use crate::store::DependencyStore;
use crate::Result;

/// Registers Services in the dependency store
#[derive(Debug)]
pub struct ServiceManager<'a> {
    store: &'a mut DependencyStore,
}

impl<'a> ServiceManager<'a> {
    pub(crate) fn new(store: &'a mut DependencyStore) -> Self {
        Self { store }
    }

    /// Store a ClusterIP service selecting `selector`.
    ///
    /// `internal_traffic_policy` is set to `Local` for node-local services
    /// so traffic never leaves the node.
    pub fn add_service(
        &mut self,
        name: &str,
        namespace: &str,
        selector: BTreeMap<String, String>,
        ports: Vec<ServicePort>,
        internal_traffic_policy: Option<&str>,
    ) -> Result<()> {
        self.store.add_or_update(Service {
            metadata: object_meta(name, namespace),
            spec: Some(ServiceSpec {
                selector: Some(selector),
                ports: Some(ports),
                internal_traffic_policy: internal_traffic_policy.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Dependency, ObjectKind};

    #[test]
    fn test_add_local_service() {
        let mut store = DependencyStore::new();
        let port = ServicePort {
            name: Some("dogstatsdport".to_string()),
            port: 8125,
            protocol: Some("UDP".to_string()),
            ..Default::default()
        };
        ServiceManager::new(&mut store)
            .add_service(
                "beacon-agent",
                "monitoring",
                BTreeMap::from([("app.kubernetes.io/component".to_string(), "agent".to_string())]),
                vec![port],
                Some("Local"),
            )
            .unwrap();

        let Some(Dependency::Service(svc)) = store.get(ObjectKind::Service, "monitoring", "beacon-agent")
        else {
            panic!("expected Service");
        };
        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(spec.internal_traffic_policy.as_deref(), Some("Local"));
        assert_eq!(spec.ports.as_ref().unwrap()[0].port, 8125);
    }
}
