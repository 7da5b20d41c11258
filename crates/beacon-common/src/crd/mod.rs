//! BeaconAgent Custom Resource Definitions
//!
//! Two schema generations are served:
//!
//! - [`v1alpha1`] - the legacy layout, grouped by agent process
//! - [`v2alpha1`] - the current layout, grouped by feature
//!
//! [`conversion`] maps a legacy spec onto the current one so the rest of the
//! operator only ever reasons about `v2alpha1`.

pub mod common;
pub mod conversion;
pub mod v1alpha1;
pub mod v2alpha1;

pub use common::{
    BeaconAgentStatus, ConfigMapConfig, CustomConfig, KeyToPath, NetworkPolicyConfig,
    NetworkPolicyFlavor,
};

use kube::core::crd::merge_crds;
use kube::CustomResourceExt;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

use crate::{Error, Result};

/// Version marked as the storage version in the merged CRD
pub const STORAGE_VERSION: &str = "v2alpha1";

/// Build the multi-version BeaconAgent CRD (legacy + current, current stored)
pub fn beacon_agent_crd() -> Result<CustomResourceDefinition> {
    merge_crds(
        vec![v1alpha1::BeaconAgent::crd(), v2alpha1::BeaconAgent::crd()],
        STORAGE_VERSION,
    )
    .map_err(|e| Error::serialization_for_kind("CustomResourceDefinition", e.to_string()))
}
