use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use super::item::{AccessoryItem, AccessorySummary, RawDataset};
use super::policy::MountabilityPolicy;

pub const DEFAULT_SEARCH_LIMIT: usize = 100;
pub const MAX_SEARCH_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("failed reading accessory dataset {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("accessory dataset {path} is malformed")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub total: usize,
    pub items: Vec<AccessorySummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredAccessory {
    pub id: String,
    pub reason: String,
}

/// Outcome of resolving a comma-separated id list. Unknown and excluded ids
/// are ordinary results, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    pub selected: Vec<AccessorySummary>,
    pub missing: Vec<String>,
    pub filtered_out: Vec<FilteredAccessory>,
}

impl ResolutionResult {
    pub fn selected_ids(&self) -> Vec<String> {
        self.selected.iter().map(|item| item.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub mountable_only: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            mountable_only: true,
        }
    }
}

/// Read-only accessory index keyed by trimmed id, iterated in load order.
#[derive(Debug, Clone, Default)]
pub struct AccessoryCatalog {
    items: IndexMap<String, AccessoryItem>,
    policy: MountabilityPolicy,
}

impl AccessoryCatalog {
    pub fn new(items: Vec<AccessoryItem>, policy: MountabilityPolicy) -> Self {
        let mut index = IndexMap::with_capacity(items.len());
        for item in items {
            if index.contains_key(&item.id) {
                tracing::debug!(id = %item.id, "duplicate accessory id; keeping the later record");
            }
            index.insert(item.id.clone(), item);
        }
        Self {
            items: index,
            policy,
        }
    }

    pub fn empty(policy: MountabilityPolicy) -> Self {
        Self::new(Vec::new(), policy)
    }

    pub fn from_json(raw: &str, policy: MountabilityPolicy) -> Result<Self, serde_json::Error> {
        let dataset: RawDataset = serde_json::from_str(raw)?;
        let mut items = Vec::new();
        let mut skipped = 0usize;
        for record in dataset.into_records() {
            match record.into_item() {
                Some(item) => items.push(item),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "skipped accessory records without an id");
        }
        Ok(Self::new(items, policy))
    }

    pub fn load(path: &Path, policy: MountabilityPolicy) -> Result<Self, CatalogLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&raw, policy).map_err(|source| CatalogLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), items = catalog.len(), "accessory catalog loaded");
        Ok(catalog)
    }

    pub fn load_or_empty(path: &Path, policy: MountabilityPolicy) -> Self {
        match Self::load(path, policy.clone()) {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!(error = %err, "accessory catalog unavailable; every id will resolve as missing");
                Self::empty(policy)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AccessoryItem> {
        self.items.get(id.trim())
    }

    pub fn items(&self) -> impl Iterator<Item = &AccessoryItem> {
        self.items.values()
    }

    pub fn policy(&self) -> &MountabilityPolicy {
        &self.policy
    }

    pub fn is_mountable(&self, item: &AccessoryItem) -> bool {
        self.policy.is_mountable(item)
    }

    pub fn search(&self, query: &str, limit: Option<usize>, mountable_only: bool) -> SearchResult {
        let needle = query.trim().to_lowercase();
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        let matches: Vec<&AccessoryItem> = self
            .items
            .values()
            .filter(|item| needle.is_empty() || item.search_text().contains(&needle))
            .filter(|item| !mountable_only || self.policy.is_mountable(item))
            .collect();
        SearchResult {
            total: matches.len(),
            items: matches
                .into_iter()
                .take(limit)
                .map(AccessoryItem::summary)
                .collect(),
        }
    }

    /// Every occurrence is resolved on its own, so a repeated id lands in its
    /// bucket once per occurrence.
    pub fn resolve_from_csv(&self, ids_csv: &str, options: ResolveOptions) -> ResolutionResult {
        let mut result = ResolutionResult::default();
        for id in ids_csv
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            let Some(item) = self.items.get(id) else {
                result.missing.push(id.to_string());
                continue;
            };
            if options.mountable_only {
                if let Some(exclusion) = self.policy.exclusion(item) {
                    result.filtered_out.push(FilteredAccessory {
                        id: id.to_string(),
                        reason: exclusion.reason(),
                    });
                    continue;
                }
            }
            result.selected.push(item.summary());
        }
        result
    }
}
