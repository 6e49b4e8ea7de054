use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::item::AccessoryItem;

const DEFAULT_POLICY_JSON: &str = include_str!("../../resources/mountability_policy.json");

#[derive(Debug, Error)]
pub enum PolicyLoadError {
    #[error("failed reading mountability policy {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mountability policy {path} is not valid JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why an item was judged not mountable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    ProductTypes(Vec<String>),
    TextHint(String),
}

impl Exclusion {
    pub fn reason(&self) -> String {
        match self {
            Exclusion::ProductTypes(keywords) => {
                format!("disallowed product_type: {}", keywords.join(", "))
            }
            Exclusion::TextHint(hint) => format!("non-mountable text hint: {hint}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    #[serde(default)]
    disallowed_product_types: Vec<String>,
    #[serde(default)]
    text_hints: Vec<String>,
}

/// Editorial exclusion policy deciding which accessories may be drawn on the bike.
/// A single product-type or text-hint hit excludes the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountabilityPolicy {
    disallowed_product_types: Vec<String>,
    text_hints: Vec<String>,
}

impl Default for MountabilityPolicy {
    fn default() -> Self {
        // The embedded document is checked by `default_policy_parses`.
        Self::from_json(DEFAULT_POLICY_JSON).unwrap_or_else(|_| Self::new(Vec::new(), Vec::new()))
    }
}

impl MountabilityPolicy {
    pub fn new(disallowed_product_types: Vec<String>, text_hints: Vec<String>) -> Self {
        Self {
            disallowed_product_types: disallowed_product_types
                .iter()
                .map(|value| normalize_keyword(value))
                .filter(|value| !value.is_empty())
                .collect(),
            text_hints: text_hints
                .iter()
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty())
                .collect(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let parsed: RawPolicy = serde_json::from_str(raw)?;
        Ok(Self::new(parsed.disallowed_product_types, parsed.text_hints))
    }

    pub fn load(path: &Path) -> Result<Self, PolicyLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| PolicyLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn disallowed_product_types(&self) -> &[String] {
        &self.disallowed_product_types
    }

    pub fn text_hints(&self) -> &[String] {
        &self.text_hints
    }

    /// Product-type hits take precedence over text hints when both apply.
    pub fn exclusion(&self, item: &AccessoryItem) -> Option<Exclusion> {
        let hits: Vec<String> = item
            .product_types
            .iter()
            .filter(|keyword| {
                let normalized = normalize_keyword(keyword);
                self.disallowed_product_types
                    .iter()
                    .any(|disallowed| *disallowed == normalized)
            })
            .cloned()
            .collect();
        if !hits.is_empty() {
            return Some(Exclusion::ProductTypes(hits));
        }

        let text = item.search_text();
        self.text_hints
            .iter()
            .find(|hint| text.contains(hint.as_str()))
            .map(|hint| Exclusion::TextHint(hint.clone()))
    }

    pub fn is_mountable(&self, item: &AccessoryItem) -> bool {
        self.exclusion(item).is_none()
    }
}

fn normalize_keyword(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}
