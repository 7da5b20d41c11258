//! Feature registry
//!
//! Maps feature identifiers to constructors. Registration takes the write
//! lock and happens once at startup; composition passes only take the read
//! lock, so passes for different BeaconAgents never block each other.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::feature::{BuildFn, Feature, FeatureId, FeatureOptions};
use crate::{FeatureError, Result};

/// Table of registered feature constructors
#[derive(Default)]
pub struct FeatureRegistry {
    builders: RwLock<BTreeMap<FeatureId, BuildFn>>,
}

impl FeatureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in feature.
    ///
    /// A collision here means two built-ins share an identifier, which is
    /// a startup error.
    pub fn with_builtin_features() -> Result<Self> {
        let registry = Self::new();
        crate::features::register_builtin(&registry)?;
        Ok(registry)
    }

    /// Register a constructor under `id`.
    ///
    /// Fails with [`FeatureError::DuplicateFeature`] if `id` is taken; the
    /// constructor is never invoked either way.
    pub fn register(&self, id: FeatureId, build: BuildFn) -> Result<()> {
        let mut builders = self.builders.write();
        if builders.contains_key(&id) {
            return Err(FeatureError::DuplicateFeature { id });
        }
        builders.insert(id, build);
        debug!(feature = %id, "registered feature");
        Ok(())
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: FeatureId) -> bool {
        self.builders.read().contains_key(&id)
    }

    /// Registered identifiers, sorted lexicographically
    pub fn enumerate(&self) -> Vec<FeatureId> {
        self.builders.read().keys().copied().collect()
    }

    /// Number of registered features
    pub fn len(&self) -> usize {
        self.builders.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.builders.read().is_empty()
    }

    /// Construct one fresh instance of every feature, in identifier order
    pub fn build_all(&self, options: &FeatureOptions) -> Vec<Box<dyn Feature>> {
        let builders = self.builders.read();
        builders.values().map(|build| build(options)).collect()
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &self.enumerate())
            .finish()
    }
}
