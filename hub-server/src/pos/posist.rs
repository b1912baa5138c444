//! Posist online-order adapter

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shared::models::{Menu, PosType, Product, Store};
use shared::order::{Order, OrderStatus};

use super::http::PosHttp;
use super::{PosClient, PosError, PosResult};

pub struct PosistClient {
    http: PosHttp,
}

impl PosistClient {
    pub fn new(http: PosHttp) -> Self {
        Self { http }
    }
}

#[derive(Deserialize)]
struct PosistAck {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct PosistStatus {
    status: String,
}

#[derive(Deserialize)]
struct PosistMenu {
    #[serde(default)]
    items: Vec<PosistItem>,
}

#[derive(Deserialize)]
struct PosistItem {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    rate: f64,
    #[serde(default, rename = "stockQuantity")]
    stock_quantity: Option<f64>,
}

fn build_menu(store: &Store, raw: PosistMenu) -> Menu {
    let mut menu = Menu {
        id: store.pos_menu_id.clone(),
        name: format!("{} POS", store.name),
        ..Default::default()
    };
    for item in raw.items {
        if item.stock_quantity.is_some_and(|q| q <= 0.0) {
            menu.stop_lists.insert(item.id.clone());
        }
        let mut product = Product::new(item.id, item.name);
        product.price = item.rate;
        menu.products.push(product);
    }
    menu
}

#[async_trait]
impl PosClient for PosistClient {
    fn pos_type(&self) -> PosType {
        PosType::Posist
    }

    async fn get_menu(&self, store: &Store) -> PosResult<Menu> {
        let raw: PosistMenu = self
            .http
            .get(
                store,
                &format!("/api/v1/customer/{}/items", store.pos.organization_id),
            )
            .await?;
        Ok(build_menu(store, raw))
    }

    async fn create_order(&self, store: &Store, order: &Order) -> PosResult<String> {
        let items: Vec<_> = order
            .items
            .iter()
            .map(|item| {
                json!({
                    "id": item.pos_id.as_deref().unwrap_or(&item.id),
                    "quantity": item.quantity,
                    "rate": item.price,
                    "addOns": item.attributes.iter().map(|a| json!({
                        "id": a.pos_id.as_deref().unwrap_or(&a.id),
                        "quantity": a.quantity,
                        "rate": a.price,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        let body = json!({
            "source": {"name": order.delivery_service.map(|d| d.as_str()), "id": order.order_id},
            "customer": {"firstname": order.customer.name, "mobile": order.customer.phone},
            "payments": {"type": order.payment.method, "amount": order.total},
            "items": items,
            "comment": order.comment,
        });
        let ack: PosistAck = self
            .http
            .post(
                store,
                &format!("/api/v1/online_order/push?customer_key={}", store.pos.organization_id),
                &body,
            )
            .await?;
        Ok(ack.id)
    }

    async fn get_order_status(&self, store: &Store, pos_order_id: &str) -> PosResult<String> {
        let status: PosistStatus = self
            .http
            .get(store, &format!("/api/v1/online_order/{pos_order_id}/status"))
            .await?;
        Ok(status.status)
    }

    fn map_pos_status_to_system_status(&self, pos_status: &str) -> Option<OrderStatus> {
        match pos_status.to_ascii_lowercase().as_str() {
            "acknowledged" => Some(OrderStatus::Accepted),
            "food ready" => Some(OrderStatus::CookingComplete),
            "dispatched" => Some(OrderStatus::OutForDelivery),
            "delivered" => Some(OrderStatus::Closed),
            "cancelled" => Some(OrderStatus::CancelledByPosSystem),
            _ => None,
        }
    }

    /// Online orders can only be voided from the Posist terminal
    async fn cancel_order(
        &self,
        _store: &Store,
        _pos_order_id: &str,
        _reason: &str,
    ) -> PosResult<()> {
        Err(PosError::Unsupported {
            pos: PosType::Posist,
            operation: "cancel_order",
        })
    }
}
