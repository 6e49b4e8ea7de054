use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One accessory as loaded from the catalog dataset. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub product_types: Vec<String>,
}

impl AccessoryItem {
    pub fn summary(&self) -> AccessorySummary {
        AccessorySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }

    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.name, self.description, self.category).to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorySummary {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawDataset {
    List(Vec<RawRecord>),
    Wrapped {
        #[serde(alias = "items")]
        accessories: Vec<RawRecord>,
    },
}

impl RawDataset {
    pub(crate) fn into_records(self) -> Vec<RawRecord> {
        match self {
            RawDataset::List(records) => records,
            RawDataset::Wrapped { accessories } => accessories,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRecord {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "productTypes")]
    product_types: Option<RawProductTypes>,
}

/// Weighted keyword map or plain keyword list. Weights are ignored.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawProductTypes {
    Weighted(IndexMap<String, Value>),
    Keywords(Vec<String>),
}

impl RawRecord {
    pub(crate) fn into_item(self) -> Option<AccessoryItem> {
        let id = match &self.id {
            Value::String(raw) => raw.trim().to_string(),
            Value::Number(raw) => raw.to_string(),
            _ => String::new(),
        };
        if id.is_empty() {
            return None;
        }
        let product_types = match self.product_types {
            Some(RawProductTypes::Weighted(map)) => map.into_keys().collect(),
            Some(RawProductTypes::Keywords(list)) => list,
            None => Vec::new(),
        }
        .into_iter()
        .map(|keyword| keyword.trim().to_string())
        .filter(|keyword| !keyword.is_empty())
        .collect();

        Some(AccessoryItem {
            id,
            name: self.name.unwrap_or_default().trim().to_string(),
            category: self.category.unwrap_or_default().trim().to_string(),
            description: self.description.unwrap_or_default().trim().to_string(),
            product_types,
        })
    }
}
