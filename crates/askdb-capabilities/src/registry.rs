//! Capability registry, the central index of registered capabilities.
//!
//! The runtime registers capabilities at startup and queries the
//! registry to dispatch requests and to build the engine schema.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use askdb_core::descriptor::CapabilityDescriptor;

use crate::traits::Capability;

/// Central registry mapping capability names to their implementations.
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability. Overwrites any existing entry with the
    /// same name.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        debug!(capability = capability.name(), "capability registered");
        let _ = self
            .capabilities
            .insert(capability.name().to_owned(), capability);
    }

    /// Look up a capability by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// Return descriptors for the named capabilities, in the given
    /// order, skipping unknown names.
    #[must_use]
    pub fn descriptors_for(&self, names: &[&str]) -> Vec<CapabilityDescriptor> {
        names
            .iter()
            .filter_map(|name| self.capabilities.get(*name))
            .map(|cap| cap.descriptor())
            .collect()
    }

    /// Return all capability names, sorted alphabetically.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Whether a capability with the given name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
