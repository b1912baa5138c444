//! Deliveroo adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{ChangedItem, DeliveryService};
use shared::order::{Customer, Order, OrderItem, OrderItemAttribute, OrderStatus, PaymentInfo};

use super::http::AggregatorHttp;
use super::{AggregatorClient, AggregatorResult, parse_payload, parse_time, require_items};

pub struct DeliverooClient {
    http: AggregatorHttp,
}

impl DeliverooClient {
    pub fn new(http: AggregatorHttp) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct DeliverooEnvelope {
    order: DeliverooOrder,
}

#[derive(Debug, Deserialize)]
struct DeliverooOrder {
    id: String,
    #[serde(default)]
    display_id: String,
    #[serde(default)]
    location_id: String,
    /// `deliveroo` | `restaurant` | `customer_collection`
    #[serde(default)]
    fulfillment_type: String,
    #[serde(default = "yes")]
    asap: bool,
    #[serde(default)]
    prep_for: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    customer: DeliverooCustomer,
    #[serde(default)]
    payment_type: String,
    #[serde(default)]
    total_price: Money,
    items: Vec<DeliverooItem>,
}

#[derive(Debug, Default, Deserialize)]
struct DeliverooCustomer {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    contact_number: String,
}

/// Amount in minor units
#[derive(Debug, Default, Deserialize)]
struct Money {
    #[serde(default)]
    fractional: i64,
}

impl Money {
    fn major(&self) -> f64 {
        self.fractional as f64 / 100.0
    }
}

#[derive(Debug, Deserialize)]
struct DeliverooItem {
    pos_item_id: String,
    name: String,
    quantity: i32,
    #[serde(default)]
    unit_price: Money,
    #[serde(default)]
    modifiers: Vec<DeliverooModifier>,
}

#[derive(Debug, Deserialize)]
struct DeliverooModifier {
    pos_item_id: String,
    name: String,
    #[serde(default = "one")]
    quantity: i32,
    #[serde(default)]
    unit_price: Money,
}

fn one() -> i32 {
    1
}

fn yes() -> bool {
    true
}

#[derive(Serialize)]
struct DeliverooItemUnavailabilities<'a> {
    item_unavailabilities: Vec<DeliverooUnavailability<'a>>,
}

#[derive(Serialize)]
struct DeliverooUnavailability<'a> {
    item_id: &'a str,
    /// `available` | `unavailable`
    status: &'static str,
}

fn unavailabilities(items: &[ChangedItem]) -> DeliverooItemUnavailabilities<'_> {
    DeliverooItemUnavailabilities {
        item_unavailabilities: items
            .iter()
            .map(|i| DeliverooUnavailability {
                item_id: &i.ext_id,
                status: if i.is_available { "available" } else { "unavailable" },
            })
            .collect(),
    }
}

#[async_trait]
impl AggregatorClient for DeliverooClient {
    fn delivery(&self) -> DeliveryService {
        DeliveryService::Deliveroo
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
                &format!("/menu/v1/sites/{external_store_id}/menu/item_unavailabilities"),
                &unavailabilities(products),
            )
            .await
    }

    /// Modifiers share the item unavailability endpoint
    async fn bulk_attribute(
        &self,
        external_store_id: &str,
        attributes: &[ChangedItem],
    ) -> AggregatorResult<()> {
        self.bulk_update(external_store_id, attributes).await
    }

    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order> {
        let DeliverooEnvelope { order: raw } =
            parse_payload(DeliveryService::Deliveroo, payload)?;

        let mut order = Order::new(DeliveryService::Deliveroo, raw.id);
        order.order_code = raw.display_id;
        order.external_store_id = raw.location_id;
        order.is_marketplace = raw.fulfillment_type == "deliveroo";
        order.is_preorder = !raw.asap;
        order.pickup_time = parse_time(raw.prep_for.as_deref())?;
        order.customer = Customer {
            name: raw.customer.first_name,
            phone: raw.customer.contact_number,
            address: None,
        };
        order.comment = raw.notes;
        order.payment = PaymentInfo {
            method: raw.payment_type.to_lowercase(),
            ..Default::default()
        };
        order.items = raw
            .items
            .into_iter()
            .map(|i| OrderItem {
                id: i.pos_item_id,
                pos_id: None,
                name: i.name,
                quantity: i.quantity,
                price: i.unit_price.major(),
                attributes: i
                    .modifiers
                    .into_iter()
                    .map(|m| OrderItemAttribute {
                        id: m.pos_item_id,
                        pos_id: None,
                        name: m.name,
                        quantity: m.quantity,
                        price: m.unit_price.major(),
                    })
                    .collect(),
            })
            .collect();
        order.total = raw.total_price.major();
        require_items(&order)?;
        Ok(order)
    }

    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str> {
        match status {
            OrderStatus::Accepted => Some("accepted"),
            OrderStatus::CookingStarted => Some("in_kitchen"),
            OrderStatus::CookingComplete | OrderStatus::ReadyForPickup => Some("ready_for_collection"),
            OrderStatus::Closed => Some("collected"),
            OrderStatus::CancelledByPosSystem | OrderStatus::Failed => Some("rejected"),
            _ => None,
        }
    }

    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()> {
        let Some(stage) = self.map_system_status_to_aggregator_status(status) else {
            return Ok(());
        };
        self.http
            .post(
                &format!("/order/v1/orders/{}/prep_stage", order.order_id),
                &serde_json::json!({ "stage": stage }),
            )
            .await
    }
}
