//! r_keeper delivery gateway adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::{Attribute, Menu, PosType, Product, Store};
use shared::order::{Order, OrderStatus};

use super::http::PosHttp;
use super::{PosClient, PosResult};

pub struct RkeeperClient {
    http: PosHttp,
}

impl RkeeperClient {
    pub fn new(http: PosHttp) -> Self {
        Self { http }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RkOrderRequest<'a> {
    restaurant_id: &'a str,
    external_id: &'a str,
    comment: Option<&'a str>,
    expected_at: Option<i64>,
    guest: RkGuest<'a>,
    dishes: Vec<RkDish<'a>>,
    payment_type_id: Option<&'a str>,
    total: f64,
}

#[derive(Serialize)]
struct RkGuest<'a> {
    name: &'a str,
    phone: &'a str,
}

#[derive(Serialize)]
struct RkDish<'a> {
    id: &'a str,
    quantity: i32,
    price: f64,
    ingredients: Vec<RkIngredient<'a>>,
}

#[derive(Serialize)]
struct RkIngredient<'a> {
    id: &'a str,
    quantity: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RkOrderCreated {
    order_guid: String,
}

#[derive(Deserialize)]
struct RkOrderState {
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RkMenu {
    #[serde(default)]
    dishes: Vec<RkMenuItem>,
    #[serde(default)]
    ingredients: Vec<RkMenuItem>,
    #[serde(default)]
    stop_list: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RkMenuItem {
    id: String,
    name: String,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default = "active")]
    is_active: bool,
}

fn active() -> bool {
    true
}

fn build_menu(store: &Store, raw: RkMenu) -> Menu {
    Menu {
        id: store.pos_menu_id.clone(),
        name: format!("{} POS", store.name),
        products: raw
            .dishes
            .into_iter()
            .map(|d| {
                let mut product = Product::new(d.id, d.name);
                product.price = d.price;
                product.section_id = d.category_id;
                product.is_deleted = !d.is_active;
                product
            })
            .collect(),
        attributes: raw
            .ingredients
            .into_iter()
            .map(|i| {
                let mut attribute = Attribute::new(i.id, i.name);
                attribute.price = i.price;
                attribute.is_deleted = !i.is_active;
                attribute
            })
            .collect(),
        stop_lists: raw.stop_list.into_iter().collect(),
        ..Default::default()
    }
}

#[async_trait]
impl PosClient for RkeeperClient {
    fn pos_type(&self) -> PosType {
        PosType::Rkeeper
    }

    async fn get_menu(&self, store: &Store) -> PosResult<Menu> {
        let raw: RkMenu = self
            .http
            .get(
                store,
                &format!("/api/restaurants/{}/menu", store.pos.organization_id),
            )
            .await?;
        Ok(build_menu(store, raw))
    }

    async fn create_order(&self, store: &Store, order: &Order) -> PosResult<String> {
        let request = RkOrderRequest {
            restaurant_id: &store.pos.organization_id,
            external_id: &order.order_id,
            comment: order.comment.as_deref(),
            expected_at: order.pickup_time,
            guest: RkGuest {
                name: &order.customer.name,
                phone: &order.customer.phone,
            },
            dishes: order
                .items
                .iter()
                .map(|item| RkDish {
                    id: item.pos_id.as_deref().unwrap_or(&item.id),
                    quantity: item.quantity,
                    price: item.price,
                    ingredients: item
                        .attributes
                        .iter()
                        .map(|a| RkIngredient {
                            id: a.pos_id.as_deref().unwrap_or(&a.id),
                            quantity: a.quantity,
                        })
                        .collect(),
                })
                .collect(),
            payment_type_id: order.payment.payment_type_id.as_deref(),
            total: order.total,
        };
        let created: RkOrderCreated = self.http.post(store, "/api/orders", &request).await?;
        Ok(created.order_guid)
    }

    async fn get_order_status(&self, store: &Store, pos_order_id: &str) -> PosResult<String> {
        let state: RkOrderState = self
            .http
            .get(store, &format!("/api/orders/{pos_order_id}"))
            .await?;
        Ok(state.status)
    }

    fn map_pos_status_to_system_status(&self, pos_status: &str) -> Option<OrderStatus> {
        match pos_status {
            "Accepted" => Some(OrderStatus::Accepted),
            "Cooking" => Some(OrderStatus::CookingStarted),
            "Ready" => Some(OrderStatus::CookingComplete),
            "Completed" => Some(OrderStatus::Closed),
            "Canceled" => Some(OrderStatus::CancelledByPosSystem),
            _ => None,
        }
    }

    async fn cancel_order(
        &self,
        store: &Store,
        pos_order_id: &str,
        reason: &str,
    ) -> PosResult<()> {
        self.http
            .post::<_, serde_json::Value>(
                store,
                &format!("/api/orders/{pos_order_id}/cancel"),
                &serde_json::json!({ "reason": reason }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_menu_marks_inactive_dishes_deleted() {
        let raw: RkMenu = serde_json::from_value(json!({
            "dishes": [{"id": "d1", "name": "Plov", "price": 9.0},
                       {"id": "d2", "name": "Old", "isActive": false}],
            "ingredients": [{"id": "i1", "name": "Onion"}],
            "stopList": ["d1"]
        }))
        .unwrap();
        let store = Store {
            pos_menu_id: "pm".into(),
            ..Default::default()
        };
        let menu = build_menu(&store, raw);
        assert!(!menu.products[0].is_deleted);
        assert!(menu.products[1].is_deleted);
        assert_eq!(menu.attributes.len(), 1);
        assert!(menu.stop_lists.contains("d1"));
    }
}
