//! Provider registry: name → backend routing with capability validation.

use std::collections::HashMap;
use std::sync::Arc;

use hcast_models::CapabilitySet;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::VideoBackend;

/// Read-only after construction; shared freely across requests.
#[derive(Default)]
pub struct ProviderRegistry {
    backends: HashMap<String, Arc<dyn VideoBackend>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own name. Later registrations replace
    /// earlier ones with the same name.
    pub fn register(&mut self, backend: Arc<dyn VideoBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    /// Resolve a backend by name and validate its capability fit.
    ///
    /// Pure lookup: called before any network or subprocess work so routing
    /// errors are local and side-effect free.
    pub fn resolve(
        &self,
        name: &str,
        required: &CapabilitySet,
    ) -> ProviderResult<Arc<dyn VideoBackend>> {
        let backend = self.backends.get(name).ok_or_else(|| {
            ProviderError::UnknownBackend {
                name: name.to_string(),
                known: self.names().join(", "),
            }
        })?;

        let declared = backend.capabilities();
        for capability in required.iter() {
            if !declared.contains(capability) {
                return Err(ProviderError::capability_mismatch(name, capability));
            }
        }

        Ok(Arc::clone(backend))
    }

    /// Registered backend names, sorted for stable error messages.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
