//! Product model
//!
//! The record the application caches per scanned barcode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dietary classification of a product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Vegan,
    Vegetarian,
    NonVegetarian,
    #[default]
    #[serde(other)]
    Undetermined,
}

impl Classification {
    /// True for products suitable for vegetarians (vegan included).
    pub fn is_vegetarian(&self) -> bool {
        matches!(self, Classification::Vegan | Classification::Vegetarian)
    }
}

/// A scanned product as returned by the product database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// EAN-13 barcode; the cache key
    pub ean13: String,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    /// Ingredient titles in label order
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub issues: Option<String>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Product {
    /// Creates an unclassified product with only its barcode set.
    pub fn new(ean13: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            ean13: ean13.into(),
            upc: None,
            product_name: None,
            brand: None,
            ingredients: Vec::new(),
            analysis: None,
            manufacturer: None,
            image_url: None,
            classification: Classification::Undetermined,
            issues: None,
            created: now,
            last_updated: now,
        }
    }

    /// Key under which this product is cached.
    pub fn cache_key(&self) -> &str {
        &self.ean13
    }
}
