//! Object metadata helpers
//!
//! Every object Beacon generates carries the standard `app.kubernetes.io`
//! labels so that the applier can select and garbage-collect them.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_BEACON, LABEL_NAME};

/// Build metadata with standard Beacon labels.
///
/// An empty namespace produces cluster-scoped metadata (`namespace: None`).
pub fn object_meta(name: impl Into<String>, namespace: impl Into<String>) -> ObjectMeta {
    let name = name.into();
    let namespace = namespace.into();
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NAME.to_string(), name.clone());
    labels.insert(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_BEACON.to_string(),
    );
    ObjectMeta {
        name: Some(name),
        namespace: if namespace.is_empty() {
            None
        } else {
            Some(namespace)
        },
        labels: Some(labels),
        ..Default::default()
    }
}

/// Insert an annotation, creating the map if needed
pub fn set_annotation(meta: &mut ObjectMeta, key: impl Into<String>, value: impl Into<String>) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.into(), value.into());
}

/// Insert a label, creating the map if needed
pub fn set_label(meta: &mut ObjectMeta, key: impl Into<String>, value: impl Into<String>) {
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .insert(key.into(), value.into());
}

/// Name of an object, or empty for unnamed metadata
pub fn name_of(meta: &ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

/// Namespace of an object, or empty for cluster-scoped metadata
pub fn namespace_of(meta: &ObjectMeta) -> &str {
    meta.namespace.as_deref().unwrap_or_default()
}
