use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use super::index::{AccessoryCatalog, CatalogLoadError};
use super::policy::MountabilityPolicy;

/// Shared entry point to the current catalog.
///
/// Readers take an `Arc` snapshot and never hold the lock while working with
/// it. A reload builds a complete new index and swaps it in.
#[derive(Debug, Default)]
pub struct CatalogHandle {
    current: RwLock<Arc<AccessoryCatalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: AccessoryCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    pub fn snapshot(&self) -> Arc<AccessoryCatalog> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, catalog: AccessoryCatalog) -> Arc<AccessoryCatalog> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }

    pub fn reload(&self, path: &Path, policy: MountabilityPolicy) -> Result<usize, CatalogLoadError> {
        let catalog = AccessoryCatalog::load(path, policy)?;
        let count = catalog.len();
        self.replace(catalog);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::CatalogHandle;
    use crate::catalog::{AccessoryCatalog, MountabilityPolicy, ResolveOptions};

    #[test]
    fn snapshots_survive_a_swap() -> anyhow::Result<()> {
        let first = AccessoryCatalog::from_json(
            &json!([{"id": "a", "name": "Fog lights"}]).to_string(),
            MountabilityPolicy::default(),
        )?;
        let handle = CatalogHandle::new(first);
        let before = handle.snapshot();

        let second = AccessoryCatalog::from_json(
            &json!([{"id": "b", "name": "Skid plate"}]).to_string(),
            MountabilityPolicy::default(),
        )?;
        handle.replace(second);

        assert!(before.get("a").is_some());
        let after = handle.snapshot();
        assert!(after.get("a").is_none());
        assert_eq!(
            after.resolve_from_csv("b", ResolveOptions::default()).selected_ids(),
            vec!["b"]
        );
        Ok(())
    }

    #[test]
    fn failed_reload_keeps_current_index() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let good = temp.path().join("good.json");
        std::fs::write(&good, json!([{"id": "a"}, {"id": "b"}]).to_string())?;

        let handle = CatalogHandle::default();
        assert!(handle.snapshot().is_empty());
        assert_eq!(handle.reload(&good, MountabilityPolicy::default())?, 2);

        let missing = temp.path().join("gone.json");
        assert!(handle.reload(&missing, MountabilityPolicy::default()).is_err());
        assert_eq!(handle.snapshot().len(), 2);
        Ok(())
    }
}
