//! 可售状态计算
//!
//! 纯函数部分：POS 状态表、身份解析 (含虚拟门店复合 id)、
//! 单个菜单的可售差异计算。引擎只负责加载、持久化和推送。

use shared::models::{ChangedItem, CompositeId, Menu, resolve_identity};
use std::collections::{BTreeSet, HashMap, HashSet};

// ============================================================================
// Scope
// ============================================================================

/// Which item kinds a run touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemKinds {
    #[default]
    All,
    Products,
    Attributes,
}

impl ItemKinds {
    pub fn products(self) -> bool {
        matches!(self, Self::All | Self::Products)
    }

    pub fn attributes(self) -> bool {
        matches!(self, Self::All | Self::Attributes)
    }
}

/// How product deltas are pushed to aggregators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushMode {
    /// One `bulk_update` / `bulk_attribute` call per external store id
    #[default]
    Bulk,
    /// One `modify_product` call per changed product and external store id
    PerProduct,
}

/// Restrictions of one propagation run
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Only these aggregators (None = all active menus)
    pub deliveries: Option<Vec<shared::models::DeliveryService>>,
    /// Only items whose resolved identity is listed
    pub only_ids: Option<HashSet<String>>,
    pub kinds: ItemKinds,
    /// Attribute prices to write, keyed by POS identity
    pub prices: HashMap<String, f64>,
    pub push: PushMode,
}

impl Scope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only_ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn includes(&self, delivery: shared::models::DeliveryService) -> bool {
        self.deliveries
            .as_ref()
            .is_none_or(|list| list.contains(&delivery))
    }

    fn admits(&self, identity: &str) -> bool {
        self.only_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(identity))
    }
}

// ============================================================================
// POS status map
// ============================================================================

/// Per-item facts taken from the POS menu
#[derive(Debug, Clone, PartialEq)]
pub struct PosStatus {
    pub name: String,
    pub is_deleted: bool,
    pub is_included_in_menu: bool,
    pub attribute_group_ids: Vec<String>,
    pub default_price: f64,
}

/// Identity-keyed view of the POS menu
#[derive(Debug, Clone, Default)]
pub struct StatusMap {
    products: HashMap<String, PosStatus>,
    attributes: HashMap<String, PosStatus>,
}

impl StatusMap {
    pub fn from_pos_menu(menu: &Menu) -> Self {
        let products = menu
            .products
            .iter()
            .map(|p| {
                (
                    p.identity().to_string(),
                    PosStatus {
                        name: p.name.clone(),
                        is_deleted: p.is_deleted,
                        is_included_in_menu: p.is_included_in_menu,
                        attribute_group_ids: p.attribute_group_ids.clone(),
                        default_price: p.price,
                    },
                )
            })
            .collect();
        let attributes = menu
            .attributes
            .iter()
            .map(|a| {
                (
                    a.identity().to_string(),
                    PosStatus {
                        name: a.name.clone(),
                        is_deleted: a.is_deleted,
                        is_included_in_menu: true,
                        attribute_group_ids: a.attribute_group_id.iter().cloned().collect(),
                        default_price: a.price,
                    },
                )
            })
            .collect();
        Self {
            products,
            attributes,
        }
    }

    pub fn product(&self, identity: &str) -> Option<&PosStatus> {
        self.products.get(identity)
    }

    pub fn attribute(&self, identity: &str) -> Option<&PosStatus> {
        self.attributes.get(identity)
    }
}

// ============================================================================
// Identity & decision
// ============================================================================

/// Identity used to match an aggregator item against the POS.
///
/// With a target restaurant the ext id must be composite and carry that
/// restaurant's prefix; matching then uses the local id.
pub fn match_identity<'a>(
    ext_id: &'a str,
    pos_id: Option<&'a str>,
    restaurant: Option<&str>,
) -> Option<&'a str> {
    let Some(restaurant) = restaurant else {
        return Some(resolve_identity(ext_id, pos_id));
    };
    let composite = CompositeId::parse(ext_id)?;
    if composite.restaurant_id != restaurant {
        return None;
    }
    let local_pos = pos_id.map(|id| match CompositeId::parse(id) {
        Some(c) if c.restaurant_id == restaurant => c.local_id,
        _ => id,
    });
    Some(resolve_identity(composite.local_id, local_pos))
}

/// Availability flags of one aggregator item
#[derive(Debug, Clone, Copy)]
pub struct ItemState {
    pub is_available: bool,
    pub is_deleted: bool,
    pub is_disabled: bool,
}

/// New `is_available` for an item, or None to leave it as is.
///
/// Checked in order: disabled, unknown to the POS, deleted or stopped,
/// released. Disabled items and items unknown to the POS are never touched,
/// not even when the aggregator copy is marked deleted.
pub fn decide_availability(item: ItemState, pos: Option<&PosStatus>, stopped: bool) -> Option<bool> {
    if item.is_disabled {
        return None;
    }
    // unknown to the POS wins over deleted
    let pos = pos?;
    if item.is_deleted || pos.is_deleted || stopped {
        return Some(false);
    }
    if !item.is_available {
        return Some(true);
    }
    None
}

// ============================================================================
// Menu delta
// ============================================================================

/// Items whose availability (or price) changed in one menu
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuDelta {
    pub products: Vec<ChangedItem>,
    pub attributes: Vec<ChangedItem>,
}

impl MenuDelta {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.attributes.is_empty()
    }
}

/// Apply the POS stop set to one aggregator menu in place.
///
/// Recomputes `stop_lists` as the identities now unavailable and returns
/// what changed.
pub fn apply_to_menu(
    menu: &mut Menu,
    status: &StatusMap,
    stop: &BTreeSet<String>,
    scope: &Scope,
    restaurant: Option<&str>,
) -> MenuDelta {
    let mut delta = MenuDelta::default();

    if scope.kinds.products() {
        for product in &mut menu.products {
            let Some(identity) =
                match_identity(&product.ext_id, product.pos_id.as_deref(), restaurant)
            else {
                continue;
            };
            if !scope.admits(identity) {
                continue;
            }
            let state = ItemState {
                is_available: product.is_available,
                is_deleted: product.is_deleted,
                is_disabled: product.is_disabled,
            };
            let Some(available) =
                decide_availability(state, status.product(identity), stop.contains(identity))
            else {
                continue;
            };
            if available != product.is_available {
                product.is_available = available;
                delta.products.push(ChangedItem {
                    ext_id: product.ext_id.clone(),
                    name: product.name.clone(),
                    is_available: available,
                    price: None,
                });
            }
        }
    }

    if scope.kinds.attributes() {
        for attribute in &mut menu.attributes {
            let Some(identity) =
                match_identity(&attribute.ext_id, attribute.pos_id.as_deref(), restaurant)
            else {
                continue;
            };
            if !scope.admits(identity) || attribute.is_disabled {
                continue;
            }
            let state = ItemState {
                is_available: attribute.is_available,
                is_deleted: attribute.is_deleted,
                is_disabled: attribute.is_disabled,
            };
            let decided =
                decide_availability(state, status.attribute(identity), stop.contains(identity));
            let new_price = scope
                .prices
                .get(identity)
                .copied()
                .filter(|p| (p - attribute.price).abs() > f64::EPSILON);

            let available = decided.unwrap_or(attribute.is_available);
            if available != attribute.is_available || new_price.is_some() {
                attribute.is_available = available;
                if let Some(price) = new_price {
                    attribute.price = price;
                }
                delta.attributes.push(ChangedItem {
                    ext_id: attribute.ext_id.clone(),
                    name: attribute.name.clone(),
                    is_available: available,
                    price: new_price,
                });
            }
        }
    }

    menu.refresh_stop_lists();
    delta
}

/// Current POS stop list as display names
pub fn stop_list_names(pos_menu: &Menu) -> Vec<String> {
    pos_menu
        .stop_lists
        .iter()
        .map(|id| pos_menu.item_name(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Attribute, Product};

    fn pos_menu(ids: &[&str]) -> Menu {
        Menu {
            id: "pos".into(),
            products: ids.iter().map(|id| Product::new(*id, *id)).collect(),
            ..Default::default()
        }
    }

    fn stop(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pos_id_wins_over_ext_id() {
        let status = StatusMap::from_pos_menu(&pos_menu(&["a", "b"]));
        let mut menu = Menu {
            products: vec![Product::new("a", "Burger").with_pos_id("b")],
            ..Default::default()
        };

        // "a" on stop: the item resolves to "b", so nothing happens
        let delta = apply_to_menu(&mut menu, &status, &stop(&["a"]), &Scope::all(), None);
        assert!(delta.is_empty());
        assert!(menu.products[0].is_available);

        let delta = apply_to_menu(&mut menu, &status, &stop(&["b"]), &Scope::all(), None);
        assert_eq!(delta.products.len(), 1);
        assert!(!menu.products[0].is_available);
        assert_eq!(menu.stop_lists, stop(&["b"]));
    }

    #[test]
    fn test_disabled_never_changes() {
        let status = StatusMap::from_pos_menu(&pos_menu(&["p1"]));
        let mut product = Product::new("p1", "Soup");
        product.is_disabled = true;
        let mut menu = Menu {
            products: vec![product],
            ..Default::default()
        };

        apply_to_menu(&mut menu, &status, &stop(&["p1"]), &Scope::all(), None);
        assert!(menu.products[0].is_available);

        menu.products[0].is_available = false;
        apply_to_menu(&mut menu, &status, &stop(&[]), &Scope::all(), None);
        assert!(!menu.products[0].is_available);
    }

    #[test]
    fn test_released_and_unknown_items() {
        let status = StatusMap::from_pos_menu(&pos_menu(&["p1"]));
        let mut known = Product::new("p1", "Soup");
        known.is_available = false;
        let mut unknown = Product::new("x9", "Ghost");
        unknown.is_available = false;
        let mut menu = Menu {
            products: vec![known, unknown],
            ..Default::default()
        };

        let delta = apply_to_menu(&mut menu, &status, &stop(&[]), &Scope::all(), None);
        assert_eq!(delta.products.len(), 1);
        assert!(menu.products[0].is_available);
        // unknown to the POS: left unchanged
        assert!(!menu.products[1].is_available);
        assert_eq!(menu.stop_lists, stop(&["x9"]));
    }

    #[test]
    fn test_deleted_items_are_unavailable() {
        let status = StatusMap::from_pos_menu(&pos_menu(&["p1"]));
        let mut product = Product::new("p1", "Soup");
        product.is_deleted = true;
        let mut menu = Menu {
            products: vec![product],
            ..Default::default()
        };
        apply_to_menu(&mut menu, &status, &stop(&[]), &Scope::all(), None);
        assert!(!menu.products[0].is_available);
    }

    #[test]
    fn test_availability_precedence() {
        let status = StatusMap::from_pos_menu(&pos_menu(&["p1"]));
        let known = status.product("p1");
        let deleted = ItemState {
            is_available: true,
            is_deleted: true,
            is_disabled: false,
        };

        assert_eq!(decide_availability(deleted, None, true), None);
        assert_eq!(decide_availability(deleted, known, false), Some(false));

        let disabled = ItemState {
            is_disabled: true,
            ..deleted
        };
        assert_eq!(decide_availability(disabled, known, true), None);

        let stopped = ItemState {
            is_available: false,
            is_deleted: false,
            is_disabled: false,
        };
        assert_eq!(decide_availability(stopped, known, false), Some(true));
        assert_eq!(decide_availability(stopped, known, true), Some(false));

        // deleted in the aggregator but unknown to the POS: left as is
        let mut ghost = Product::new("x9", "Ghost");
        ghost.is_deleted = true;
        let mut menu = Menu {
            products: vec![ghost],
            ..Default::default()
        };
        let delta = apply_to_menu(&mut menu, &status, &stop(&[]), &Scope::all(), None);
        assert!(delta.is_empty());
        assert!(menu.products[0].is_available);
    }

    #[test]
    fn test_composite_ids_restricted_to_restaurant() {
        assert_eq!(match_identity("R1_P7", None, Some("R1")), Some("P7"));
        assert_eq!(match_identity("R1_P7", None, Some("R2")), None);
        assert_eq!(match_identity("P7", None, Some("R1")), None);
        assert_eq!(match_identity("R1_P7", Some("R1_X"), Some("R1")), Some("X"));

        let status = StatusMap::from_pos_menu(&pos_menu(&["P7"]));
        let mut menu = Menu {
            products: vec![Product::new("R1_P7", "Pho"), Product::new("R2_P7", "Pho")],
            ..Default::default()
        };
        let delta = apply_to_menu(&mut menu, &status, &stop(&["P7"]), &Scope::all(), Some("R1"));
        assert_eq!(delta.products.len(), 1);
        assert_eq!(delta.products[0].ext_id, "R1_P7");
        assert!(menu.products[1].is_available);
    }

    #[test]
    fn test_attribute_price_written() {
        let mut pos = pos_menu(&[]);
        pos.attributes.push(Attribute::new("m1", "Cheese"));
        let status = StatusMap::from_pos_menu(&pos);

        let mut menu = Menu {
            attributes: vec![Attribute::new("m1", "Cheese")],
            ..Default::default()
        };
        let mut scope = Scope::only(["m1"]);
        scope.kinds = ItemKinds::Attributes;
        scope.prices.insert("m1".into(), 1.5);

        let delta = apply_to_menu(&mut menu, &status, &stop(&[]), &scope, None);
        assert_eq!(delta.attributes.len(), 1);
        assert_eq!(delta.attributes[0].price, Some(1.5));
        assert!(delta.attributes[0].is_available);
        assert!((menu.attributes[0].price - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_only_ids_scope() {
        let status = StatusMap::from_pos_menu(&pos_menu(&["p1", "p2"]));
        let mut menu = Menu {
            products: vec![Product::new("p1", "A"), Product::new("p2", "B")],
            ..Default::default()
        };
        let delta = apply_to_menu(&mut menu, &status, &stop(&["p1", "p2"]), &Scope::only(["p2"]), None);
        assert_eq!(delta.products.len(), 1);
        assert!(menu.products[0].is_available);
    }
}
