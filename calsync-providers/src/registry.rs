//! Adapter dispatch, keyed by the closed provider enum.

use std::collections::HashMap;
use std::sync::Arc;

use calsync_core::{ProviderKind, SyncError, SyncResult};

use crate::adapter::ProviderAdapter;
use crate::caldav::CaldavAdapter;
use crate::google::GoogleAdapter;
use crate::ical::IcalAdapter;
use crate::icloud;
use crate::outlook::OutlookAdapter;

/// Maps every [`ProviderKind`] to its adapter. Resolution fails loudly when
/// a kind has no binding; tests can substitute adapters per kind.
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// A registry with no bindings; useful in tests.
    pub fn empty() -> Self {
        ProviderRegistry {
            adapters: HashMap::new(),
        }
    }

    /// The production registry: every enum tag bound to its adapter.
    pub fn builtin() -> Self {
        ProviderRegistry::empty()
            .with_adapter(Arc::new(IcalAdapter))
            .with_adapter(Arc::new(GoogleAdapter))
            .with_adapter(Arc::new(OutlookAdapter))
            .with_adapter(Arc::new(CaldavAdapter::new()))
            .with_adapter(Arc::new(icloud::adapter()))
    }

    /// Bind (or override) the adapter for its own kind.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn resolve(&self, kind: ProviderKind) -> SyncResult<&dyn ProviderAdapter> {
        self.adapters
            .get(&kind)
            .map(|adapter| adapter.as_ref())
            .ok_or_else(|| {
                SyncError::Config(format!("No provider adapter registered for '{}'", kind))
            })
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        ProviderRegistry::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_every_provider_kind() {
        let registry = ProviderRegistry::builtin();
        for kind in ProviderKind::ALL {
            let adapter = registry.resolve(kind).expect("adapter missing");
            assert_eq!(adapter.kind(), kind);
        }
    }

    #[test]
    fn empty_registry_fails_loudly() {
        let registry = ProviderRegistry::empty();
        let err = registry.resolve(ProviderKind::Google).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn write_capabilities_match_provider_semantics() {
        let registry = ProviderRegistry::builtin();
        assert!(!registry.resolve(ProviderKind::Ical).unwrap().supports_write());
        assert!(registry.resolve(ProviderKind::Google).unwrap().supports_write());
        assert!(registry.resolve(ProviderKind::Outlook).unwrap().supports_write());
        assert!(registry.resolve(ProviderKind::Caldav).unwrap().supports_write());
        assert!(registry.resolve(ProviderKind::Icloud).unwrap().supports_write());
    }
}
