//! First-party channels (QR menu, admin panel, starter app)
//!
//! 这些渠道直接提交规范订单结构，没有外部菜单需要同步。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use shared::models::{AggregatorSettings, ChangedItem, DeliveryService};
use shared::order::{Customer, Order, OrderItem, OrderStatus, PaymentInfo};

use super::http::AggregatorHttp;
use super::{AggregatorClient, AggregatorResult, parse_payload, parse_time, require_items};

pub struct DirectClient {
    http: AggregatorHttp,
}

impl DirectClient {
    pub fn new(http: AggregatorHttp) -> Self {
        Self { http }
    }
}

#[derive(Debug, Deserialize)]
struct DirectOrder {
    order_id: String,
    #[serde(default)]
    order_code: String,
    #[serde(default)]
    store_id: String,
    #[serde(default)]
    customer: Customer,
    #[serde(default)]
    payment_method: String,
    #[serde(default)]
    total: f64,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    pickup_time: Option<String>,
    #[serde(default)]
    is_preorder: bool,
    items: Vec<OrderItem>,
}

#[async_trait]
impl AggregatorClient for DirectClient {
    fn delivery(&self) -> DeliveryService {
        self.http.delivery()
    }

    /// Menus are served from the hub itself; nothing to push
    async fn modify_product(
        &self,
        _external_store_id: &str,
        _product: &ChangedItem,
    ) -> AggregatorResult<()> {
        Ok(())
    }

    async fn bulk_update(
        &self,
        _external_store_id: &str,
        _products: &[ChangedItem],
    ) -> AggregatorResult<()> {
        Ok(())
    }

    async fn bulk_attribute(
        &self,
        _external_store_id: &str,
        _attributes: &[ChangedItem],
    ) -> AggregatorResult<()> {
        Ok(())
    }

    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order> {
        let delivery = self.delivery();
        let raw: DirectOrder = parse_payload(delivery, payload)?;

        let mut order = Order::new(delivery, raw.order_id);
        order.order_code = raw.order_code;
        order.external_store_id = raw.store_id;
        order.customer = raw.customer;
        order.payment = PaymentInfo {
            method: raw.payment_method.to_lowercase(),
            ..Default::default()
        };
        order.comment = raw.comment;
        order.pickup_time = parse_time(raw.pickup_time.as_deref())?;
        order.is_preorder = raw.is_preorder;
        order.items = raw.items;
        order.total = if raw.total > 0.0 {
            raw.total
        } else {
            order.items_total()
        };
        require_items(&order)?;
        Ok(order)
    }

    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str> {
        match status {
            OrderStatus::Accepted
            | OrderStatus::CookingStarted
            | OrderStatus::CookingComplete
            | OrderStatus::ReadyForPickup
            | OrderStatus::Closed
            | OrderStatus::CancelledByPosSystem => Some(status.as_str()),
            _ => None,
        }
    }

    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()> {
        let Some(name) = self.map_system_status_to_aggregator_status(status) else {
            return Ok(());
        };
        self.http
            .post(
                &format!("/orders/{}/status", order.order_id),
                &serde_json::json!({ "status": name }),
            )
            .await
    }

    /// First-party channels never use aggregator couriers
    fn is_marketplace(&self, _order: &Order, _settings: &AggregatorSettings) -> bool {
        false
    }
}
