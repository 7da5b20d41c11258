//! Generated ConfigMaps

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;

use beacon_common::meta::{object_meta, set_annotation};

use crate::checksum::compute_checksum;
use crate::store::DependencyStore;
use crate::Result;

/// Registers ConfigMaps in the dependency store
#[derive(Debug)]
pub struct ConfigMapManager<'a> {
    store: &'a mut DependencyStore,
}

impl<'a> ConfigMapManager<'a> {
    pub(crate) fn new(store: &'a mut DependencyStore) -> Self {
        Self { store }
    }

    /// Store a ConfigMap built from `data` and return the checksum of its
    /// content.
    ///
    /// When `checksum_key` is given the checksum is also set as an
    /// annotation on the ConfigMap, so the same key on a pod template
    /// rolls pods when the content changes.
    pub fn add_config_map(
        &mut self,
        name: &str,
        namespace: &str,
        data: BTreeMap<String, String>,
        checksum_key: Option<&str>,
    ) -> Result<String> {
        let checksum = compute_checksum(&data)?;
        let mut metadata = object_meta(name, namespace);
        if let Some(key) = checksum_key {
            set_annotation(&mut metadata, key, checksum.clone());
        }
        self.store.add_or_update(ConfigMap {
            metadata,
            data: Some(data),
            ..Default::default()
        })?;
        Ok(checksum)
    }
}
