//! Menu Model
//!
//! One document per POS menu or per aggregator menu. The POS menu's
//! `stop_lists` is the ground truth for availability; aggregator menus
//! mirror it through their items' `is_available` flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::store::DeliveryService;

/// Separator between restaurant id and local id inside virtual-store item ids
pub const COMPOSITE_ID_SEPARATOR: char = '_';

/// Resolve the identity used to match an item against the POS stop set.
///
/// `pos_id` wins when it is set and differs from `ext_id`.
pub fn resolve_identity<'a>(ext_id: &'a str, pos_id: Option<&'a str>) -> &'a str {
    match pos_id {
        Some(pos_id) if !pos_id.is_empty() && pos_id != ext_id => pos_id,
        _ => ext_id,
    }
}

/// Item id inside a virtual-store aggregator menu: `"<restaurantID>_<localID>"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeId<'a> {
    pub restaurant_id: &'a str,
    pub local_id: &'a str,
}

impl<'a> CompositeId<'a> {
    /// Split on the first separator. Ids without a separator, or with an
    /// empty half, are not composite.
    pub fn parse(id: &'a str) -> Option<Self> {
        let (restaurant_id, local_id) = id.split_once(COMPOSITE_ID_SEPARATOR)?;
        if restaurant_id.is_empty() || local_id.is_empty() {
            return None;
        }
        Some(Self {
            restaurant_id,
            local_id,
        })
    }

    pub fn join(restaurant_id: &str, local_id: &str) -> String {
        format!("{restaurant_id}{COMPOSITE_ID_SEPARATOR}{local_id}")
    }
}

/// Menu document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    pub id: String,
    pub name: String,
    /// Aggregator this menu belongs to (None for the POS menu)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryService>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub attribute_groups: Vec<AttributeGroup>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    /// Ids currently unavailable
    #[serde(default)]
    pub stop_lists: BTreeSet<String>,
    /// Last update timestamp (Unix millis)
    #[serde(default)]
    pub updated_at: i64,
}

impl Menu {
    pub fn product_by_ext_id(&self, ext_id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.ext_id == ext_id)
    }

    pub fn attribute_by_ext_id(&self, ext_id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.ext_id == ext_id)
    }

    /// Display name for a POS id, falling back to the id itself
    pub fn item_name(&self, id: &str) -> String {
        self.products
            .iter()
            .find(|p| p.identity() == id)
            .map(|p| p.name.clone())
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|a| a.identity() == id)
                    .map(|a| a.name.clone())
            })
            .unwrap_or_else(|| id.to_string())
    }

    /// Rebuild an aggregator menu's `stop_lists` from its items: the
    /// resolved identity of every unavailable product and attribute.
    /// Virtual-store items without a `pos_id` keep their composite ext id.
    pub fn refresh_stop_lists(&mut self) {
        self.stop_lists = self
            .products
            .iter()
            .filter(|p| !p.is_available)
            .map(|p| p.identity().to_string())
            .chain(
                self.attributes
                    .iter()
                    .filter(|a| !a.is_available)
                    .map(|a| a.identity().to_string()),
            )
            .collect();
    }
}

/// Product (unit of sale)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Aggregator-local identity
    pub ext_id: String,
    /// Identity inside the POS (may differ from ext_id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default)]
    pub attribute_group_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub is_deleted: bool,
    /// Administratively excluded from availability sync
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default = "default_true")]
    pub is_included_in_menu: bool,
}

impl Product {
    pub fn new(ext_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ext_id: ext_id.into(),
            pos_id: None,
            name: name.into(),
            price: 0.0,
            section_id: None,
            attribute_group_ids: Vec::new(),
            is_available: true,
            is_deleted: false,
            is_disabled: false,
            is_included_in_menu: true,
        }
    }

    pub fn with_pos_id(mut self, pos_id: impl Into<String>) -> Self {
        self.pos_id = Some(pos_id.into());
        self
    }

    pub fn identity(&self) -> &str {
        resolve_identity(&self.ext_id, self.pos_id.as_deref())
    }
}

/// Attribute (modifier)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub ext_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_group_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_disabled: bool,
}

impl Attribute {
    pub fn new(ext_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ext_id: ext_id.into(),
            pos_id: None,
            name: name.into(),
            price: 0.0,
            attribute_group_id: None,
            is_available: true,
            is_deleted: false,
            is_disabled: false,
        }
    }

    pub fn with_pos_id(mut self, pos_id: impl Into<String>) -> Self {
        self.pos_id = Some(pos_id.into());
        self
    }

    pub fn identity(&self) -> &str {
        resolve_identity(&self.ext_id, self.pos_id.as_deref())
    }
}

/// Attribute group (modifier group)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeGroup {
    pub ext_id: String,
    pub name: String,
    #[serde(default)]
    pub min: i32,
    #[serde(default)]
    pub max: i32,
    #[serde(default)]
    pub attribute_ids: Vec<String>,
}

/// Menu section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub ext_id: String,
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// Collection of sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub ext_id: String,
    pub name: String,
    #[serde(default)]
    pub section_ids: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_identity_prefers_distinct_pos_id() {
        assert_eq!(resolve_identity("a", Some("b")), "b");
        assert_eq!(resolve_identity("a", Some("a")), "a");
        assert_eq!(resolve_identity("a", Some("")), "a");
        assert_eq!(resolve_identity("a", None), "a");
    }

    #[test]
    fn test_composite_id_parse() {
        let id = CompositeId::parse("R1_P7").unwrap();
        assert_eq!(id.restaurant_id, "R1");
        assert_eq!(id.local_id, "P7");

        // Only the first separator splits
        let id = CompositeId::parse("R1_P7_large").unwrap();
        assert_eq!(id.restaurant_id, "R1");
        assert_eq!(id.local_id, "P7_large");

        assert!(CompositeId::parse("P7").is_none());
        assert!(CompositeId::parse("_P7").is_none());
        assert!(CompositeId::parse("R1_").is_none());
    }

    #[test]
    fn test_composite_id_join() {
        assert_eq!(CompositeId::join("R1", "P7"), "R1_P7");
    }

    #[test]
    fn test_product_deserialize_defaults() {
        let json = r#"{"ext_id":"p1","name":"Burger"}"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert!(product.is_available);
        assert!(product.is_included_in_menu);
        assert!(!product.is_disabled);
        assert_eq!(product.identity(), "p1");
    }

    #[test]
    fn test_item_name_lookup() {
        let menu = Menu {
            products: vec![Product::new("p1", "Burger").with_pos_id("pos-1")],
            attributes: vec![Attribute::new("a1", "Cheese")],
            ..Default::default()
        };
        assert_eq!(menu.item_name("pos-1"), "Burger");
        assert_eq!(menu.item_name("a1"), "Cheese");
        assert_eq!(menu.item_name("unknown"), "unknown");
    }

    #[test]
    fn test_refresh_stop_lists_uses_identities() {
        let mut mapped = Product::new("a", "Burger").with_pos_id("b");
        mapped.is_available = false;
        let mut composite = Product::new("R1_P7", "Pho");
        composite.is_available = false;
        let mut cheese = Attribute::new("a1", "Cheese").with_pos_id("m1");
        cheese.is_available = false;
        let mut menu = Menu {
            products: vec![mapped, composite, Product::new("p2", "Fries")],
            attributes: vec![cheese],
            stop_lists: ["stale".to_string()].into(),
            ..Default::default()
        };

        menu.refresh_stop_lists();
        assert_eq!(
            menu.stop_lists.iter().collect::<Vec<_>>(),
            ["R1_P7", "b", "m1"]
        );
    }
}
