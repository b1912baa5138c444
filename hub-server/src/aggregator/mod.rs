//! 聚合平台适配器
//!
//! 每个外卖平台一个 [`AggregatorClient`] 实现，能力面完全一致；
//! 引擎和下单流程只通过 [`AggregatorRegistry`] 按 [`DeliveryService`] 取用。
//!
//! | 平台 | 实现 |
//! |------|------|
//! | Wolt | [`wolt::WoltClient`] |
//! | Glovo | [`glovo::GlovoClient`] |
//! | Yandex | [`yandex::YandexClient`] |
//! | Talabat | [`talabat::TalabatClient`] |
//! | Deliveroo | [`deliveroo::DeliverooClient`] |
//! | Chocofood | [`chocofood::ChocofoodClient`] |
//! | QR-menu / Admin / StarterApp | [`direct::DirectClient`] |

pub mod chocofood;
pub mod deliveroo;
pub mod direct;
pub mod glovo;
pub mod http;
pub mod talabat;
pub mod wolt;
pub mod yandex;

use async_trait::async_trait;
use serde_json::Value;
use shared::error::{AppError, ErrorCode};
use shared::models::{AggregatorSettings, ChangedItem, CompositeId, DeliveryService, VirtualStoreSettings};
use shared::order::{Order, OrderItem, OrderStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

use crate::core::Config;

/// Aggregator adapter errors
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("{delivery} does not support {operation}")]
    Unsupported {
        delivery: DeliveryService,
        operation: &'static str,
    },

    #[error("No adapter registered for {0}")]
    NotRegistered(DeliveryService),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown restaurant in virtual order: {0}")]
    UnknownRestaurant(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{delivery} returned {status}: {body}")]
    Api {
        delivery: DeliveryService,
        status: u16,
        body: String,
    },
}

impl From<AggregatorError> for AppError {
    fn from(err: AggregatorError) -> Self {
        let code = match &err {
            AggregatorError::Unsupported { .. } | AggregatorError::NotRegistered(_) => {
                ErrorCode::AggregatorUnsupported
            }
            AggregatorError::InvalidPayload(_) => ErrorCode::OrderPayloadInvalid,
            AggregatorError::UnknownRestaurant(_) => ErrorCode::VirtualRestaurantUnknown,
            AggregatorError::Http(e) if e.is_timeout() => ErrorCode::TimeoutError,
            AggregatorError::Http(_) | AggregatorError::Api { .. } => {
                ErrorCode::AggregatorRequestFailed
            }
        };
        AppError::with_message(code, err.to_string())
    }
}

pub type AggregatorResult<T> = Result<T, AggregatorError>;

/// Uniform capability surface of a delivery aggregator
#[async_trait]
pub trait AggregatorClient: Send + Sync + 'static {
    fn delivery(&self) -> DeliveryService;

    /// Change one product (availability and/or price)
    async fn modify_product(
        &self,
        external_store_id: &str,
        product: &ChangedItem,
    ) -> AggregatorResult<()>;

    /// Push availability of many products in one call
    async fn bulk_update(
        &self,
        external_store_id: &str,
        products: &[ChangedItem],
    ) -> AggregatorResult<()>;

    /// Push availability (and price) of many attributes in one call
    async fn bulk_attribute(
        &self,
        external_store_id: &str,
        attributes: &[ChangedItem],
    ) -> AggregatorResult<()>;

    /// Map the aggregator webhook payload into the canonical order
    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order>;

    /// Split a virtual-store parent order into one child per physical
    /// restaurant, grouping lines by the restaurant prefix of their
    /// composite ids.
    fn split_virtual_store_order(
        &self,
        parent: &Order,
        virtual_store: &VirtualStoreSettings,
    ) -> AggregatorResult<Vec<Order>> {
        split_by_restaurant(parent, virtual_store)
    }

    /// Aggregator-side status name, None when the status is not pushed
    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str>;

    /// Push a status change to the aggregator
    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()>;

    /// Whether the aggregator's couriers deliver this order
    fn is_marketplace(&self, order: &Order, settings: &AggregatorSettings) -> bool {
        order.is_marketplace || settings.is_marketplace
    }
}

/// Default virtual-store split
pub fn split_by_restaurant(
    parent: &Order,
    virtual_store: &VirtualStoreSettings,
) -> AggregatorResult<Vec<Order>> {
    let mut groups: BTreeMap<String, Vec<OrderItem>> = BTreeMap::new();
    for item in &parent.items {
        let composite = CompositeId::parse(&item.id).ok_or_else(|| {
            AggregatorError::InvalidPayload(format!("item {} has no restaurant prefix", item.id))
        })?;
        if virtual_store.store_for(composite.restaurant_id).is_none() {
            return Err(AggregatorError::UnknownRestaurant(
                composite.restaurant_id.to_string(),
            ));
        }
        let mut line = item.clone();
        line.id = composite.local_id.to_string();
        if let Some(pos_id) = line.pos_id.as_deref().and_then(CompositeId::parse) {
            line.pos_id = Some(pos_id.local_id.to_string());
        }
        for attribute in &mut line.attributes {
            if let Some(local) = CompositeId::parse(&attribute.id) {
                attribute.id = local.local_id.to_string();
            }
        }
        groups
            .entry(composite.restaurant_id.to_string())
            .or_default()
            .push(line);
    }

    Ok(groups
        .into_iter()
        .map(|(restaurant_id, items)| {
            let mut child = parent.clone();
            child.id = String::new();
            child.order_id = format!("{}-{}", parent.order_id, restaurant_id);
            child.is_parent_order = false;
            child.is_child_order = true;
            child.parent_order_id = Some(parent.order_id.clone());
            child.store_id = virtual_store
                .store_for(&restaurant_id)
                .unwrap_or_default()
                .to_string();
            child.restaurant_id = Some(restaurant_id);
            child.items = items;
            child.total = child.items_total();
            child.statuses_history.clear();
            child.status = OrderStatus::New;
            child
        })
        .collect())
}

/// Adapter lookup by variant tag
#[derive(Clone, Default)]
pub struct AggregatorRegistry {
    clients: HashMap<DeliveryService, Arc<dyn AggregatorClient>>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every HTTP adapter with endpoints from configuration
    pub fn from_config(config: &Config) -> AggregatorResult<Self> {
        let timeout = config.http_timeout();
        let http = |delivery: DeliveryService| {
            http::AggregatorHttp::new(delivery, config.endpoint(delivery.as_str()), timeout)
        };

        let mut registry = Self::new();
        registry.register(Arc::new(wolt::WoltClient::new(http(DeliveryService::Wolt)?)));
        registry.register(Arc::new(glovo::GlovoClient::new(http(DeliveryService::Glovo)?)));
        registry.register(Arc::new(yandex::YandexClient::new(http(DeliveryService::Yandex)?)));
        registry.register(Arc::new(talabat::TalabatClient::new(http(DeliveryService::Talabat)?)));
        registry.register(Arc::new(deliveroo::DeliverooClient::new(http(
            DeliveryService::Deliveroo,
        )?)));
        registry.register(Arc::new(chocofood::ChocofoodClient::new(http(
            DeliveryService::Chocofood,
        )?)));
        for delivery in [
            DeliveryService::QrMenu,
            DeliveryService::KwaakaAdmin,
            DeliveryService::StarterApp,
        ] {
            registry.register(Arc::new(direct::DirectClient::new(http(delivery)?)));
        }
        Ok(registry)
    }

    pub fn register(&mut self, client: Arc<dyn AggregatorClient>) {
        self.clients.insert(client.delivery(), client);
    }

    pub fn get(&self, delivery: DeliveryService) -> AggregatorResult<Arc<dyn AggregatorClient>> {
        self.clients
            .get(&delivery)
            .cloned()
            .ok_or(AggregatorError::NotRegistered(delivery))
    }
}

// ========== Payload helpers ==========

/// Deserialize a vendor payload
pub(crate) fn parse_payload<T: serde::de::DeserializeOwned>(
    delivery: DeliveryService,
    payload: &Value,
) -> AggregatorResult<T> {
    T::deserialize(payload)
        .map_err(|e| AggregatorError::InvalidPayload(format!("{delivery}: {e}")))
}

/// RFC 3339 → Unix millis
pub(crate) fn parse_time(value: Option<&str>) -> AggregatorResult<Option<i64>> {
    value
        .map(|raw| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| AggregatorError::InvalidPayload(format!("bad timestamp {raw}: {e}")))
        })
        .transpose()
}

pub(crate) fn require_items(order: &Order) -> AggregatorResult<()> {
    if order.items.is_empty() {
        return Err(AggregatorError::InvalidPayload(format!(
            "order {} has no items",
            order.order_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::VirtualRestaurant;

    fn line(id: &str, price: f64) -> OrderItem {
        OrderItem {
            id: id.into(),
            pos_id: None,
            name: id.into(),
            quantity: 1,
            price,
            attributes: vec![],
        }
    }

    fn virtual_store() -> VirtualStoreSettings {
        VirtualStoreSettings {
            restaurants: vec![
                VirtualRestaurant {
                    restaurant_id: "R1".into(),
                    store_id: "store-r1".into(),
                },
                VirtualRestaurant {
                    restaurant_id: "R2".into(),
                    store_id: "store-r2".into(),
                },
            ],
        }
    }

    #[test]
    fn test_split_groups_by_restaurant() {
        let mut parent = Order::new(DeliveryService::Wolt, "w-1");
        parent.is_parent_order = true;
        parent.items = vec![line("R1_P7", 3.0), line("R2_P1", 4.0), line("R1_P8", 1.0)];

        let children = split_by_restaurant(&parent, &virtual_store()).unwrap();
        assert_eq!(children.len(), 2);

        let r1 = &children[0];
        assert_eq!(r1.restaurant_id.as_deref(), Some("R1"));
        assert_eq!(r1.store_id, "store-r1");
        assert_eq!(r1.order_id, "w-1-R1");
        assert!(r1.is_child_order && !r1.is_parent_order);
        assert_eq!(r1.parent_order_id.as_deref(), Some("w-1"));
        let ids: Vec<_> = r1.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["P7", "P8"]);
        assert!((r1.total - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_split_rejects_unknown_restaurant() {
        let mut parent = Order::new(DeliveryService::Wolt, "w-1");
        parent.items = vec![line("R9_P7", 3.0)];
        assert!(matches!(
            split_by_restaurant(&parent, &virtual_store()),
            Err(AggregatorError::UnknownRestaurant(r)) if r == "R9"
        ));
    }

    #[test]
    fn test_split_rejects_plain_ids() {
        let mut parent = Order::new(DeliveryService::Wolt, "w-1");
        parent.items = vec![line("P7", 3.0)];
        assert!(matches!(
            split_by_restaurant(&parent, &virtual_store()),
            Err(AggregatorError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_registry_unregistered() {
        let registry = AggregatorRegistry::new();
        assert!(matches!(
            registry.get(DeliveryService::Glovo),
            Err(AggregatorError::NotRegistered(DeliveryService::Glovo))
        ));
    }

    #[test]
    fn test_error_codes() {
        let err: AppError = AggregatorError::InvalidPayload("x".into()).into();
        assert_eq!(err.code, ErrorCode::OrderPayloadInvalid);
        let err: AppError = AggregatorError::Api {
            delivery: DeliveryService::Wolt,
            status: 502,
            body: String::new(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::AggregatorRequestFailed);
    }
}
