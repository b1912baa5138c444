//! Glovo adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{ChangedItem, DeliveryService};
use shared::order::{Customer, Order, OrderItem, OrderItemAttribute, OrderStatus, PaymentInfo};

use super::http::AggregatorHttp;
use super::{AggregatorClient, AggregatorResult, parse_payload, require_items};

pub struct GlovoClient {
    http: AggregatorHttp,
}

impl GlovoClient {
    pub fn new(http: AggregatorHttp) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct GlovoOrder {
    order_id: String,
    #[serde(default)]
    order_code: String,
    store_id: String,
    /// Unix millis, present for scheduled orders
    #[serde(default)]
    scheduled_time: Option<i64>,
    #[serde(default)]
    is_picked_up_by_customer: bool,
    #[serde(default)]
    payment_method: String,
    #[serde(default)]
    estimated_total_price: f64,
    #[serde(default)]
    customer: GlovoCustomer,
    #[serde(default)]
    delivery_address: Option<GlovoAddress>,
    #[serde(default)]
    allergy_info: Option<String>,
    products: Vec<GlovoProduct>,
}

#[derive(Debug, Default, Deserialize)]
struct GlovoCustomer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone_number: String,
}

#[derive(Debug, Deserialize)]
struct GlovoAddress {
    label: String,
}

#[derive(Debug, Deserialize)]
struct GlovoProduct {
    id: String,
    #[serde(default)]
    purchased_product_id: Option<String>,
    name: String,
    quantity: i32,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    attributes: Vec<GlovoAttribute>,
}

#[derive(Debug, Deserialize)]
struct GlovoAttribute {
    id: String,
    name: String,
    #[serde(default = "one")]
    quantity: i32,
    #[serde(default)]
    price: f64,
}

fn one() -> i32 {
    1
}

#[derive(Serialize)]
struct GlovoBulkUpdate<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    products: Vec<GlovoAvailability<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<GlovoAvailability<'a>>,
}

#[derive(Serialize)]
struct GlovoAvailability<'a> {
    id: &'a str,
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
}

impl<'a> From<&'a ChangedItem> for GlovoAvailability<'a> {
    fn from(item: &'a ChangedItem) -> Self {
        Self {
            id: &item.ext_id,
            available: item.is_available,
            price: item.price,
        }
    }
}

#[async_trait]
impl AggregatorClient for GlovoClient {
    fn delivery(&self) -> DeliveryService {
        DeliveryService::Glovo
    }

    async fn modify_product(
        &self,
        external_store_id: &str,
        product: &ChangedItem,
    ) -> AggregatorResult<()> {
        self.http
            .patch(
                &format!("/webhook/stores/{external_store_id}/products/{}", product.ext_id),
                &GlovoAvailability::from(product),
            )
            .await
    }

    async fn bulk_update(
        &self,
        external_store_id: &str,
        products: &[ChangedItem],
    ) -> AggregatorResult<()> {
        let body = GlovoBulkUpdate {
            products: products.iter().map(Into::into).collect(),
            attributes: Vec::new(),
        };
        self.http
            .post(&format!("/webhook/stores/{external_store_id}/menu/updates"), &body)
            .await
    }

    async fn bulk_attribute(
        &self,
        external_store_id: &str,
        attributes: &[ChangedItem],
    ) -> AggregatorResult<()> {
        let body = GlovoBulkUpdate {
            products: Vec::new(),
            attributes: attributes.iter().map(Into::into).collect(),
        };
        self.http
            .post(&format!("/webhook/stores/{external_store_id}/menu/updates"), &body)
            .await
    }

    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order> {
        let raw: GlovoOrder = parse_payload(DeliveryService::Glovo, payload)?;

        let mut order = Order::new(DeliveryService::Glovo, raw.order_id);
        order.order_code = raw.order_code;
        order.external_store_id = raw.store_id;
        order.is_preorder = raw.scheduled_time.is_some();
        order.pickup_time = raw.scheduled_time;
        order.is_marketplace = !raw.is_picked_up_by_customer;
        order.customer = Customer {
            name: raw.customer.name,
            phone: raw.customer.phone_number,
            address: raw.delivery_address.map(|a| a.label),
        };
        order.comment = raw.allergy_info;
        order.payment = PaymentInfo {
            method: raw.payment_method.to_lowercase(),
            ..Default::default()
        };
        order.items = raw
            .products
            .into_iter()
            .map(|p| OrderItem {
                id: p.id,
                pos_id: p.purchased_product_id,
                name: p.name,
                quantity: p.quantity,
                price: p.price,
                attributes: p
                    .attributes
                    .into_iter()
                    .map(|a| OrderItemAttribute {
                        id: a.id,
                        pos_id: None,
                        name: a.name,
                        quantity: a.quantity,
                        price: a.price,
                    })
                    .collect(),
            })
            .collect();
        order.total = raw.estimated_total_price;
        require_items(&order)?;
        Ok(order)
    }

    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str> {
        match status {
            OrderStatus::Accepted => Some("ACCEPTED"),
            OrderStatus::ReadyForPickup | OrderStatus::CookingComplete => Some("READY_FOR_PICKUP"),
            OrderStatus::OutForDelivery => Some("OUT_FOR_DELIVERY"),
            OrderStatus::Closed => Some("PICKED_UP_BY_CUSTOMER"),
            _ => None,
        }
    }

    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()> {
        let Some(glovo_status) = self.map_system_status_to_aggregator_status(status) else {
            return Ok(());
        };
        self.http
            .put(
                &format!(
                    "/api/stores/{}/orders/{}/status",
                    order.external_store_id, order.order_id
                ),
                &serde_json::json!({ "status": glovo_status }),
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

    fn client() -> GlovoClient {
        let endpoint = Endpoint {
            base_url: "https://glovo.invalid".into(),
            token: None,
        };
        GlovoClient::new(
            AggregatorHttp::new(DeliveryService::Glovo, endpoint, Duration::from_secs(1)).unwrap(),
        )
    }

    #[test]
    fn test_order_from_request() {
        let payload = json!({
            "order_id": "100200",
            "order_code": "X7",
            "store_id": "g-store",
            "is_picked_up_by_customer": true,
            "payment_method": "CASH",
            "estimated_total_price": 9.5,
            "customer": {"name": "Ana", "phone_number": "+34600"},
            "products": [{"id": "p1", "purchased_product_id": "pos-p1", "name": "Taco",
                          "quantity": 1, "price": 9.5}]
        });
        let order = client().order_from_request(&payload).unwrap();
        assert_eq!(order.external_store_id, "g-store");
        assert!(!order.is_marketplace);
        assert!(!order.is_preorder);
        assert_eq!(order.payment.method, "cash");
        assert_eq!(order.items[0].pos_id.as_deref(), Some("pos-p1"));
    }

    #[test]
    fn test_malformed_payload() {
        let payload = json!({"order_id": 5});
        assert!(client().order_from_request(&payload).is_err());
    }

    #[test]
    fn test_bulk_body_shape() {
        let item = ChangedItem {
            ext_id: "a1".into(),
            name: "Salsa".into(),
            is_available: false,
            price: None,
        };
        let body = GlovoBulkUpdate {
            products: Vec::new(),
            attributes: vec![(&item).into()],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, json!({"attributes": [{"id": "a1", "available": false}]}));
    }
}
