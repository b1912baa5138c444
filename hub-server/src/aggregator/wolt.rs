//! Wolt adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{ChangedItem, DeliveryService};
use shared::order::{Customer, Order, OrderItem, OrderItemAttribute, OrderStatus, PaymentInfo};

use super::http::AggregatorHttp;
use super::{AggregatorClient, AggregatorResult, parse_payload, parse_time, require_items};

pub struct WoltClient {
    http: AggregatorHttp,
}

impl WoltClient {
    pub fn new(http: AggregatorHttp) -> Self {
        Self { http }
    }
}

// ========== Payload ==========

#[derive(Debug, Deserialize)]
struct WoltOrder {
    id: String,
    #[serde(default)]
    order_number: String,
    #[serde(default, rename = "type")]
    order_type: String,
    #[serde(default)]
    pre_order: Option<WoltPreOrder>,
    #[serde(default)]
    delivery: Option<WoltDelivery>,
    #[serde(default)]
    consumer_name: String,
    #[serde(default)]
    consumer_phone_number: String,
    #[serde(default)]
    consumer_comment: Option<String>,
    items: Vec<WoltItem>,
    #[serde(default)]
    price: WoltPrice,
    #[serde(default)]
    payment_method: String,
}

#[derive(Debug, Deserialize)]
struct WoltPreOrder {
    preorder_time: String,
}

#[derive(Debug, Deserialize)]
struct WoltDelivery {
    #[serde(default, rename = "type")]
    delivery_type: String,
    #[serde(default)]
    self_delivery: bool,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WoltPrice {
    #[serde(default)]
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct WoltItem {
    id: String,
    #[serde(default)]
    pos_id: Option<String>,
    name: String,
    count: i32,
    #[serde(default)]
    base_price: f64,
    #[serde(default)]
    options: Vec<WoltOption>,
}

#[derive(Debug, Deserialize)]
struct WoltOption {
    id: String,
    name: String,
    #[serde(default = "one")]
    count: i32,
    #[serde(default)]
    price: f64,
}

fn one() -> i32 {
    1
}

#[derive(Serialize)]
struct WoltInventoryUpdate<'a> {
    data: Vec<WoltInventoryItem<'a>>,
}

#[derive(Serialize)]
struct WoltInventoryItem<'a> {
    external_id: &'a str,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
}

impl<'a> From<&'a ChangedItem> for WoltInventoryItem<'a> {
    fn from(item: &'a ChangedItem) -> Self {
        Self {
            external_id: &item.ext_id,
            enabled: item.is_available,
            price: item.price,
        }
    }
}

// ========== Adapter ==========

#[async_trait]
impl AggregatorClient for WoltClient {
    fn delivery(&self) -> DeliveryService {
        DeliveryService::Wolt
    }

    async fn modify_product(
        &self,
        external_store_id: &str,
        product: &ChangedItem,
    ) -> AggregatorResult<()> {
        self.bulk_update(external_store_id, std::slice::from_ref(product))
            .await
    }

    async fn bulk_update(
        &self,
        external_store_id: &str,
        products: &[ChangedItem],
    ) -> AggregatorResult<()> {
        let body = WoltInventoryUpdate {
            data: products.iter().map(Into::into).collect(),
        };
        self.http
            .patch(&format!("/venues/{external_store_id}/items"), &body)
            .await
    }

    async fn bulk_attribute(
        &self,
        external_store_id: &str,
        attributes: &[ChangedItem],
    ) -> AggregatorResult<()> {
        let body = WoltInventoryUpdate {
            data: attributes.iter().map(Into::into).collect(),
        };
        self.http
            .patch(&format!("/venues/{external_store_id}/options/values"), &body)
            .await
    }

    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order> {
        let raw: WoltOrder = parse_payload(DeliveryService::Wolt, payload)?;
        let delivery = raw.delivery.as_ref();

        let mut order = Order::new(DeliveryService::Wolt, raw.id);
        order.order_code = raw.order_number;
        order.is_preorder = raw.order_type == "preorder";
        order.pickup_time = parse_time(raw.pre_order.as_ref().map(|p| p.preorder_time.as_str()))?;
        order.is_marketplace =
            delivery.is_some_and(|d| d.delivery_type == "homedelivery" && !d.self_delivery);
        order.customer = Customer {
            name: raw.consumer_name,
            phone: raw.consumer_phone_number,
            address: delivery.and_then(|d| d.address.clone()),
        };
        order.comment = raw.consumer_comment;
        order.payment = PaymentInfo {
            method: raw.payment_method,
            ..Default::default()
        };
        order.items = raw
            .items
            .into_iter()
            .map(|item| OrderItem {
                id: item.id,
                pos_id: item.pos_id,
                name: item.name,
                quantity: item.count,
                price: item.base_price,
                attributes: item
                    .options
                    .into_iter()
                    .map(|o| OrderItemAttribute {
                        id: o.id,
                        pos_id: None,
                        name: o.name,
                        quantity: o.count,
                        price: o.price,
                    })
                    .collect(),
            })
            .collect();
        order.total = raw.price.amount;
        require_items(&order)?;
        Ok(order)
    }

    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str> {
        match status {
            OrderStatus::Accepted => Some("accept"),
            OrderStatus::CookingComplete | OrderStatus::ReadyForPickup => Some("ready"),
            OrderStatus::Closed => Some("delivered"),
            OrderStatus::CancelledByPosSystem | OrderStatus::Failed => Some("reject"),
            _ => None,
        }
    }

    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()> {
        let Some(action) = self.map_system_status_to_aggregator_status(status) else {
            return Ok(());
        };
        self.http
            .put(
                &format!("/orders/{}/{action}", order.order_id),
                &serde_json::json!({}),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Endpoint;
    use serde_json::json;
    use std::time::Duration;

    fn client() -> WoltClient {
        let endpoint = Endpoint {
            base_url: "https://wolt.invalid".into(),
            token: None,
        };
        WoltClient::new(
            AggregatorHttp::new(DeliveryService::Wolt, endpoint, Duration::from_secs(1)).unwrap(),
        )
    }

    #[test]
    fn test_order_from_request() {
        let payload = json!({
            "id": "wolt-123",
            "order_number": "A12",
            "type": "preorder",
            "pre_order": {"preorder_time": "2026-10-19T12:00:00Z"},
            "delivery": {"type": "homedelivery", "self_delivery": false, "address": "Main st 1"},
            "consumer_name": "Aigerim",
            "consumer_phone_number": "+7700",
            "items": [
                {"id": "p1", "name": "Burger", "count": 2, "base_price": 5.0,
                 "options": [{"id": "a1", "name": "Cheese", "price": 0.5}]}
            ],
            "price": {"amount": 11.0},
            "payment_method": "card"
        });

        let order = client().order_from_request(&payload).unwrap();
        assert_eq!(order.order_id, "wolt-123");
        assert_eq!(order.delivery_service, Some(DeliveryService::Wolt));
        assert!(order.is_preorder);
        assert!(order.is_marketplace);
        assert_eq!(order.pickup_time, Some(1_792_411_200_000));
        assert_eq!(order.items[0].attributes[0].quantity, 1);
        assert_eq!(order.customer.address.as_deref(), Some("Main st 1"));
    }

    #[test]
    fn test_order_without_items_is_invalid() {
        let payload = json!({"id": "wolt-1", "items": []});
        assert!(client().order_from_request(&payload).is_err());
    }

    #[test]
    fn test_status_map() {
        let c = client();
        assert_eq!(
            c.map_system_status_to_aggregator_status(OrderStatus::Accepted),
            Some("accept")
        );
        assert_eq!(
            c.map_system_status_to_aggregator_status(OrderStatus::Pending),
            None
        );
    }
}
