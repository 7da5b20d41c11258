//! Feature composition and manifest merge engine for BeaconAgent
//!
//! A composition pass takes one BeaconAgent spec, asks every registered
//! [`Feature`] whether it is active and which deployables it needs, then
//! drives the active features against shared accumulators to produce pod
//! templates and auxiliary objects. Same input, same bytes out.

#![deny(missing_docs)]

pub mod checksum;
pub mod component;
pub mod driver;
pub mod error;
pub mod feature;
pub mod features;
pub mod input;
pub mod managers;
pub mod registry;
pub mod render;
pub mod required;
pub mod store;

pub use component::{AgentContainerName, ComponentName, ContainerTarget};
pub use driver::{compose_features, Composition};
pub use error::FeatureError;
pub use feature::{BuildFn, Feature, FeatureId, FeatureOptions};
pub use input::AgentInput;
pub use registry::FeatureRegistry;
pub use render::{render, RenderOptions, RenderedAgent};
pub use required::{RequiredComponent, RequiredComponents, Requirement};
pub use store::{Dependency, DependencyStore, ObjectKind, StoreKey};

/// Result type alias using the engine error
pub type Result<T, E = FeatureError> = std::result::Result<T, E>;
