use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Index reserved for padding and for item ids the catalog does not know
pub const PADDING_INDEX: usize = 0;

const SAMPLE_CATEGORIES: [&str; 5] = ["Electronics", "Clothing", "Books", "Home", "Sports"];

/// A purchasable catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub item_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl CatalogItem {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            name: None,
            category: None,
            price: None,
        }
    }
}

/// Ordered item catalog with stable numeric indices
///
/// Indices start at 1 so that 0 can act as the model's padding token. Catalog
/// order is also the tie-break order everywhere items are ranked.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    items: Vec<CatalogItem>,
    index: HashMap<String, usize>,
}

impl ItemCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        let mut catalog = Self::default();
        for item in items {
            catalog.push(item);
        }
        catalog
    }

    /// `item_0000 .. item_{n-1}` with rotating categories
    pub fn sample(num_items: usize) -> Self {
        let items = (0..num_items)
            .map(|i| CatalogItem {
                item_id: format!("item_{:04}", i),
                name: Some(format!("Product {}", i)),
                category: Some(SAMPLE_CATEGORIES[i % SAMPLE_CATEGORIES.len()].to_string()),
                price: Some(10.0 + i as f64 * 5.0),
            })
            .collect();
        Self::new(items)
    }

    /// Reads a JSON array of [`CatalogItem`]s
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let items: Vec<CatalogItem> = serde_json::from_str(&raw)?;
        Ok(Self::new(items))
    }

    fn push(&mut self, item: CatalogItem) {
        // Duplicate ids keep their first position
        if self.index.contains_key(&item.item_id) {
            return;
        }
        self.index
            .insert(item.item_id.clone(), self.items.len() + 1);
        self.items.push(item);
    }

    /// Model index of an item, [`PADDING_INDEX`] when unknown
    pub fn index_of(&self, item_id: &str) -> usize {
        self.index.get(item_id).copied().unwrap_or(PADDING_INDEX)
    }

    pub fn item_at(&self, index: usize) -> Option<&str> {
        if index == PADDING_INDEX {
            return None;
        }
        self.items.get(index - 1).map(|item| item.item_id.as_str())
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.index.contains_key(item_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.item_id.as_str())
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sample_catalog() {
        let catalog = ItemCatalog::sample(100);
        assert_eq!(catalog.len(), 100);
        assert_eq!(catalog.items()[10].item_id, "item_0010");
        assert_eq!(catalog.items()[10].category.as_deref(), Some("Electronics"));
        assert_eq!(catalog.items()[3].price, Some(25.0));
    }

    #[test]
    fn test_indices_start_at_one() {
        let catalog = ItemCatalog::sample(3);
        assert_eq!(catalog.index_of("item_0000"), 1);
        assert_eq!(catalog.index_of("item_0002"), 3);
        assert_eq!(catalog.item_at(1), Some("item_0000"));
        assert_eq!(catalog.item_at(3), Some("item_0002"));
        assert_eq!(catalog.item_at(4), None);
    }

    #[test]
    fn test_unknown_item_maps_to_padding() {
        let catalog = ItemCatalog::sample(3);
        assert_eq!(catalog.index_of("nope"), PADDING_INDEX);
        assert_eq!(catalog.item_at(PADDING_INDEX), None);
        assert!(!catalog.contains("nope"));
    }

    #[test]
    fn test_duplicate_ids_are_ignored() {
        let catalog = ItemCatalog::new(vec![
            CatalogItem::new("a"),
            CatalogItem::new("b"),
            CatalogItem::new("a"),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_load_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"item_id": "sku-1", "name": "Lamp"}}, {{"item_id": "sku-2"}}]"#
        )
        .unwrap();

        let catalog = ItemCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.items()[0].name.as_deref(), Some("Lamp"));
        assert_eq!(catalog.index_of("sku-2"), 2);
    }
}
