//! Common types for Beacon: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod meta;
pub mod telemetry;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for Beacon custom resources
pub const API_GROUP: &str = "beacon.dev";

/// Label key for the resource name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Label key for the owning BeaconAgent instance
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Label key for the component (cluster-agent, agent, cluster-checks-runner)
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";

/// Label key for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value identifying Beacon as the manager
pub const LABEL_MANAGED_BY_BEACON: &str = "beacon-operator";

/// Label attached to every object registered in the dependency store.
///
/// The applier uses it to find stale objects from earlier passes.
pub const STORE_LABEL_KEY: &str = "beacon.dev/managed-by-store";

/// Annotation key template for generated configuration checksums
pub const CHECKSUM_ANNOTATION_PREFIX: &str = "checksum/";

/// Default agent image registry
pub const DEFAULT_REGISTRY: &str = "gcr.io/beacon";

/// Default intake site the agents report to
pub const DEFAULT_SITE: &str = "beacon.dev";
