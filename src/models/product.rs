use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A catalog entry the scanner can recognize
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Substrings expected verbatim (after normalization) in OCR output
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Product {
    pub fn new(id: &str, name: &str, keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Ordered product list. Order is match priority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Load a catalog from a JSON array of products
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read catalog {}: {}", path.display(), e))?;

        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse catalog {}: {}", path.display(), e))
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn find(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }
}

/// Which matcher tier produced a result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Keyword,
    Fuzzy,
    None,
}

/// Outcome of matching recognized text against the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
    pub product: Option<&'a Product>,
    pub method: MatchMethod,
}

impl<'a> MatchResult<'a> {
    pub fn none() -> Self {
        Self {
            product: None,
            method: MatchMethod::None,
        }
    }

    pub fn product_id(&self) -> Option<&str> {
        self.product.map(|p| p.id.as_str())
    }
}
