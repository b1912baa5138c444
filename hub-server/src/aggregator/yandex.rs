//! Yandex Eats adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{AggregatorSettings, ChangedItem, DeliveryService};
use shared::order::{Customer, Order, OrderItem, OrderItemAttribute, OrderStatus, PaymentInfo};

use super::http::AggregatorHttp;
use super::{AggregatorClient, AggregatorResult, parse_payload, parse_time, require_items};

pub struct YandexClient {
    http: AggregatorHttp,
}

impl YandexClient {
    pub fn new(http: AggregatorHttp) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexOrder {
    eats_id: String,
    #[serde(default)]
    restaurant_id: String,
    #[serde(default)]
    comment: Option<String>,
    /// `marketplace` when the restaurant delivers itself
    #[serde(default)]
    discriminator: String,
    #[serde(default)]
    delivery_info: YandexDeliveryInfo,
    #[serde(default)]
    payment_info: YandexPaymentInfo,
    items: Vec<YandexItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexDeliveryInfo {
    #[serde(default)]
    client_name: String,
    #[serde(default)]
    phone_number: String,
    #[serde(default)]
    delivery_date: Option<String>,
    #[serde(default)]
    is_preorder: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexPaymentInfo {
    #[serde(default)]
    payment_type: String,
    #[serde(default)]
    items_cost: f64,
}

#[derive(Debug, Deserialize)]
struct YandexItem {
    id: String,
    name: String,
    quantity: i32,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    modifications: Vec<YandexModification>,
}

#[derive(Debug, Deserialize)]
struct YandexModification {
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
struct YandexAvailability<'a> {
    items: Vec<YandexAvailabilityItem<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct YandexAvailabilityItem<'a> {
    id: &'a str,
    is_available: bool,
}

fn availability(items: &[ChangedItem]) -> YandexAvailability<'_> {
    YandexAvailability {
        items: items
            .iter()
            .map(|i| YandexAvailabilityItem {
                id: &i.ext_id,
                is_available: i.is_available,
            })
            .collect(),
    }
}

#[async_trait]
impl AggregatorClient for YandexClient {
    fn delivery(&self) -> DeliveryService {
        DeliveryService::Yandex
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
                &format!("/menu/{external_store_id}/availability"),
                &availability(products),
            )
            .await
    }

    async fn bulk_attribute(
        &self,
        external_store_id: &str,
        attributes: &[ChangedItem],
    ) -> AggregatorResult<()> {
        self.http
            .post(
                &format!("/menu/{external_store_id}/modifiers/availability"),
                &availability(attributes),
            )
            .await
    }

    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order> {
        let raw: YandexOrder = parse_payload(DeliveryService::Yandex, payload)?;

        let mut order = Order::new(DeliveryService::Yandex, raw.eats_id.clone());
        order.order_code = raw.eats_id;
        order.external_store_id = raw.restaurant_id;
        order.is_marketplace = raw.discriminator != "marketplace";
        order.is_preorder = raw.delivery_info.is_preorder;
        order.pickup_time = parse_time(raw.delivery_info.delivery_date.as_deref())?;
        order.customer = Customer {
            name: raw.delivery_info.client_name,
            phone: raw.delivery_info.phone_number,
            address: None,
        };
        order.comment = raw.comment;
        order.payment = PaymentInfo {
            method: raw.payment_info.payment_type.to_lowercase(),
            ..Default::default()
        };
        order.items = raw
            .items
            .into_iter()
            .map(|i| OrderItem {
                id: i.id,
                pos_id: None,
                name: i.name,
                quantity: i.quantity,
                price: i.price,
                attributes: i
                    .modifications
                    .into_iter()
                    .map(|m| OrderItemAttribute {
                        id: m.id,
                        pos_id: None,
                        name: m.name,
                        quantity: m.quantity,
                        price: m.price,
                    })
                    .collect(),
            })
            .collect();
        order.total = raw.payment_info.items_cost;
        require_items(&order)?;
        Ok(order)
    }

    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str> {
        match status {
            OrderStatus::Accepted => Some("ACCEPTED_BY_RESTAURANT"),
            OrderStatus::CookingStarted => Some("COOKING"),
            OrderStatus::CookingComplete | OrderStatus::ReadyForPickup => Some("READY"),
            OrderStatus::OutForDelivery => Some("TAKEN_BY_COURIER"),
            OrderStatus::Closed => Some("DELIVERED"),
            OrderStatus::CancelledByPosSystem => Some("CANCELLED"),
            _ => None,
        }
    }

    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()> {
        let Some(yandex_status) = self.map_system_status_to_aggregator_status(status) else {
            return Ok(());
        };
        self.http
            .put(
                &format!("/order/{}/status", order.order_id),
                &serde_json::json!({ "status": yandex_status }),
            )
            .await
    }

    /// Only `marketplace` orders are delivered by the restaurant
    fn is_marketplace(&self, order: &Order, _settings: &AggregatorSettings) -> bool {
        order.is_marketplace
    }
}
