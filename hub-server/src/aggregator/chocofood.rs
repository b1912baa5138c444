//! Chocofood adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{ChangedItem, DeliveryService};
use shared::order::{Customer, Order, OrderItem, OrderItemAttribute, OrderStatus, PaymentInfo};

use super::http::AggregatorHttp;
use super::{AggregatorClient, AggregatorError, AggregatorResult, parse_payload, parse_time, require_items};

pub struct ChocofoodClient {
    http: AggregatorHttp,
}

impl ChocofoodClient {
    pub fn new(http: AggregatorHttp) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct ChocofoodOrder {
    order_id: String,
    #[serde(default)]
    restaurant_id: String,
    #[serde(default)]
    delivery_type: String,
    #[serde(default)]
    scheduled_at: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    payment_type: String,
    #[serde(default)]
    total: f64,
    #[serde(default)]
    client: ChocofoodClientInfo,
    items: Vec<ChocofoodItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ChocofoodClientInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChocofoodItem {
    product_id: String,
    name: String,
    amount: i32,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    toppings: Vec<ChocofoodTopping>,
}

#[derive(Debug, Deserialize)]
struct ChocofoodTopping {
    topping_id: String,
    name: String,
    #[serde(default = "one")]
    amount: i32,
    #[serde(default)]
    price: f64,
}

fn one() -> i32 {
    1
}

#[derive(Serialize)]
struct ChocofoodStopList<'a> {
    stop_list: Vec<&'a str>,
    go_list: Vec<&'a str>,
}

fn stop_list(items: &[ChangedItem]) -> ChocofoodStopList<'_> {
    let (go, stop): (Vec<_>, Vec<_>) = items.iter().partition(|i| i.is_available);
    ChocofoodStopList {
        stop_list: stop.into_iter().map(|i| i.ext_id.as_str()).collect(),
        go_list: go.into_iter().map(|i| i.ext_id.as_str()).collect(),
    }
}

#[async_trait]
impl AggregatorClient for ChocofoodClient {
    fn delivery(&self) -> DeliveryService {
        DeliveryService::Chocofood
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
        self.http
            .post(
                &format!("/restaurants/{external_store_id}/stop-list/products"),
                &stop_list(products),
            )
            .await
    }

    async fn bulk_attribute(
        &self,
        _external_store_id: &str,
        _attributes: &[ChangedItem],
    ) -> AggregatorResult<()> {
        Err(AggregatorError::Unsupported {
            delivery: DeliveryService::Chocofood,
            operation: "bulk_attribute",
        })
    }

    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order> {
        let raw: ChocofoodOrder = parse_payload(DeliveryService::Chocofood, payload)?;

        let mut order = Order::new(DeliveryService::Chocofood, raw.order_id);
        order.external_store_id = raw.restaurant_id;
        order.is_marketplace = raw.delivery_type == "chocofood";
        order.pickup_time = parse_time(raw.scheduled_at.as_deref())?;
        order.is_preorder = order.pickup_time.is_some();
        order.customer = Customer {
            name: raw.client.name,
            phone: raw.client.phone,
            address: raw.client.address,
        };
        order.comment = raw.comment;
        order.payment = PaymentInfo {
            method: raw.payment_type.to_lowercase(),
            ..Default::default()
        };
        order.items = raw
            .items
            .into_iter()
            .map(|i| OrderItem {
                id: i.product_id,
                pos_id: None,
                name: i.name,
                quantity: i.amount,
                price: i.price,
                attributes: i
                    .toppings
                    .into_iter()
                    .map(|t| OrderItemAttribute {
                        id: t.topping_id,
                        pos_id: None,
                        name: t.name,
                        quantity: t.amount,
                        price: t.price,
                    })
                    .collect(),
            })
            .collect();
        order.total = raw.total;
        require_items(&order)?;
        Ok(order)
    }

    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str> {
        match status {
            OrderStatus::Accepted => Some("accepted"),
            OrderStatus::CookingStarted => Some("cooking"),
            OrderStatus::ReadyForPickup | OrderStatus::CookingComplete => Some("ready"),
            OrderStatus::Closed => Some("completed"),
            OrderStatus::CancelledByPosSystem => Some("canceled"),
            _ => None,
        }
    }

    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()> {
        let Some(choco_status) = self.map_system_status_to_aggregator_status(status) else {
            return Ok(());
        };
        self.http
            .patch(
                &format!("/orders/{}", order.order_id),
                &serde_json::json!({ "status": choco_status }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Endpoint;
    use std::time::Duration;

    fn client() -> ChocofoodClient {
        let endpoint = Endpoint {
            base_url: "https://chocofood.invalid".into(),
            token: None,
        };
        ChocofoodClient::new(
            AggregatorHttp::new(DeliveryService::Chocofood, endpoint, Duration::from_secs(1))
                .unwrap(),
        )
    }

    #[test]
    fn test_stop_list_partition() {
        let items = [
            ChangedItem {
                ext_id: "p1".into(),
                name: String::new(),
                is_available: false,
                price: None,
            },
            ChangedItem {
                ext_id: "p2".into(),
                name: String::new(),
                is_available: true,
                price: None,
            },
        ];
        let body = stop_list(&items);
        assert_eq!(body.stop_list, ["p1"]);
        assert_eq!(body.go_list, ["p2"]);
    }

    #[tokio::test]
    async fn test_attributes_unsupported() {
        let err = client().bulk_attribute("c1", &[]).await.unwrap_err();
        assert!(matches!(err, AggregatorError::Unsupported { .. }));
    }
}
