//! 测试替身 (仅测试编译)

use async_trait::async_trait;
use serde_json::Value;
use shared::models::{
    ChangedItem, DeliveryService, Menu, PosType, StopListTransaction, Store,
};
use shared::order::{Order, OrderStatus};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::aggregator::{AggregatorClient, AggregatorError, AggregatorResult};
use crate::db::{RepoError, RepoResult, StopListRepository};
use crate::notify::{Notification, Notifier, NotifyError, NotifyResult};
use crate::orders::{
    CreateOrderRequest, OrderCreator, PipelineError, PipelineResult, RuleEngine, StatusSubscriber,
};
use crate::pos::{PosClient, PosError, PosResult};

// ========== Aggregator ==========

/// Records every push; bulk pushes fail when told to
pub struct FakeAggregator {
    delivery: DeliveryService,
    bulk_error: Mutex<Option<String>>,
    bulk: Mutex<Vec<String>>,
    modified: Mutex<Vec<String>>,
    attributes: Mutex<Vec<String>>,
    statuses: Mutex<Vec<(String, OrderStatus)>>,
}

impl FakeAggregator {
    pub fn new(delivery: DeliveryService) -> Self {
        Self {
            delivery,
            bulk_error: Mutex::new(None),
            bulk: Mutex::new(Vec::new()),
            modified: Mutex::new(Vec::new()),
            attributes: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_bulk(&self, message: &str) {
        *self.bulk_error.lock().unwrap() = Some(message.to_string());
    }

    /// External store ids of bulk product pushes
    pub fn bulk_calls(&self) -> Vec<String> {
        self.bulk.lock().unwrap().clone()
    }

    /// Product ext ids of single-product pushes
    pub fn modify_calls(&self) -> Vec<String> {
        self.modified.lock().unwrap().clone()
    }

    /// External store ids of attribute pushes
    pub fn attribute_calls(&self) -> Vec<String> {
        self.attributes.lock().unwrap().clone()
    }

    /// (order id, status) pushed back to the aggregator
    pub fn status_pushes(&self) -> Vec<(String, OrderStatus)> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl AggregatorClient for FakeAggregator {
    fn delivery(&self) -> DeliveryService {
        self.delivery
    }

    async fn modify_product(
        &self,
        _external_store_id: &str,
        product: &ChangedItem,
    ) -> AggregatorResult<()> {
        self.modified.lock().unwrap().push(product.ext_id.clone());
        Ok(())
    }

    async fn bulk_update(
        &self,
        external_store_id: &str,
        _products: &[ChangedItem],
    ) -> AggregatorResult<()> {
        if let Some(message) = self.bulk_error.lock().unwrap().clone() {
            return Err(AggregatorError::Api {
                delivery: self.delivery,
                status: 502,
                body: message,
            });
        }
        self.bulk.lock().unwrap().push(external_store_id.to_string());
        Ok(())
    }

    async fn bulk_attribute(
        &self,
        external_store_id: &str,
        _attributes: &[ChangedItem],
    ) -> AggregatorResult<()> {
        self.attributes
            .lock()
            .unwrap()
            .push(external_store_id.to_string());
        Ok(())
    }

    fn order_from_request(&self, payload: &Value) -> AggregatorResult<Order> {
        let mut order: Order = serde_json::from_value(payload.clone())
            .map_err(|e| AggregatorError::InvalidPayload(e.to_string()))?;
        order.delivery_service = Some(self.delivery);
        Ok(order)
    }

    fn map_system_status_to_aggregator_status(&self, status: OrderStatus) -> Option<&'static str> {
        Some(status.as_str())
    }

    async fn update_order_in_aggregator(
        &self,
        order: &Order,
        status: OrderStatus,
    ) -> AggregatorResult<()> {
        self.statuses
            .lock()
            .unwrap()
            .push((order.order_id.clone(), status));
        Ok(())
    }
}

// ========== POS ==========

enum PosOutcome {
    Accept(String),
    Retry(String),
    Reject(String),
}

/// Scripted POS with an iiko-like status vocabulary
pub struct FakePos {
    pos_type: PosType,
    outcome: PosOutcome,
    menu: Mutex<Menu>,
    created: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<String, String>>,
    calls: Mutex<usize>,
    retries_left: Mutex<usize>,
    rejected_orders: HashMap<String, String>,
}

impl FakePos {
    fn with(pos_type: PosType, outcome: PosOutcome) -> Self {
        Self {
            pos_type,
            outcome,
            menu: Mutex::new(Menu::default()),
            created: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            calls: Mutex::new(0),
            retries_left: Mutex::new(0),
            rejected_orders: HashMap::new(),
        }
    }

    /// The first `n` create calls fail with `Retry`
    pub fn retry_first(self, n: usize) -> Self {
        *self.retries_left.lock().unwrap() = n;
        self
    }

    /// Reject only the order with this aggregator id
    pub fn reject_order(mut self, order_id: &str, message: &str) -> Self {
        self.rejected_orders
            .insert(order_id.to_string(), message.to_string());
        self
    }

    /// Number of create attempts, successful or not
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn accepting(pos_type: PosType, pos_order_id: &str) -> Self {
        Self::with(pos_type, PosOutcome::Accept(pos_order_id.to_string()))
    }

    pub fn retrying(pos_type: PosType, message: &str) -> Self {
        Self::with(pos_type, PosOutcome::Retry(message.to_string()))
    }

    pub fn rejecting(pos_type: PosType, message: &str) -> Self {
        Self::with(pos_type, PosOutcome::Reject(message.to_string()))
    }

    pub fn set_menu(&self, menu: Menu) {
        *self.menu.lock().unwrap() = menu;
    }

    pub fn set_status(&self, pos_order_id: &str, raw: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(pos_order_id.to_string(), raw.to_string());
    }

    /// Aggregator order ids that reached the POS
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl PosClient for FakePos {
    fn pos_type(&self) -> PosType {
        self.pos_type
    }

    async fn get_menu(&self, _store: &Store) -> PosResult<Menu> {
        Ok(self.menu.lock().unwrap().clone())
    }

    async fn create_order(&self, _store: &Store, order: &Order) -> PosResult<String> {
        *self.calls.lock().unwrap() += 1;
        if let Some(message) = self.rejected_orders.get(&order.order_id) {
            return Err(PosError::Rejected(message.clone()));
        }
        {
            let mut retries = self.retries_left.lock().unwrap();
            if *retries > 0 {
                *retries -= 1;
                return Err(PosError::Retry("timeout".into()));
            }
        }
        match &self.outcome {
            PosOutcome::Accept(id) => {
                self.created.lock().unwrap().push(order.order_id.clone());
                Ok(id.clone())
            }
            PosOutcome::Retry(message) => Err(PosError::Retry(message.clone())),
            PosOutcome::Reject(message) => Err(PosError::Rejected(message.clone())),
        }
    }

    async fn get_order_status(&self, _store: &Store, pos_order_id: &str) -> PosResult<String> {
        self.statuses
            .lock()
            .unwrap()
            .get(pos_order_id)
            .cloned()
            .ok_or_else(|| PosError::InvalidResponse(format!("unknown order {pos_order_id}")))
    }

    fn map_pos_status_to_system_status(&self, pos_status: &str) -> Option<OrderStatus> {
        match pos_status {
            "Unconfirmed" => Some(OrderStatus::Accepted),
            "CookingStarted" => Some(OrderStatus::CookingStarted),
            "CookingCompleted" => Some(OrderStatus::CookingComplete),
            "Delivered" => Some(OrderStatus::Closed),
            "Cancelled" => Some(OrderStatus::CancelledByPosSystem),
            _ => None,
        }
    }

    async fn cancel_order(&self, _store: &Store, pos_order_id: &str, _reason: &str) -> PosResult<()> {
        self.cancelled.lock().unwrap().push(pos_order_id.to_string());
        Ok(())
    }
}

// ========== Notifications ==========

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message_to_queue(&self, notification: Notification) -> NotifyResult<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Every send fails
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send_message_to_queue(&self, notification: Notification) -> NotifyResult<()> {
        Err(NotifyError::Rejected {
            queue: notification.queue,
            status: 503,
        })
    }
}

// ========== Stoplist ledger ==========

/// Every append fails; counts the attempts
#[derive(Default)]
pub struct FailingLedger {
    attempts: Mutex<usize>,
}

impl FailingLedger {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl StopListRepository for FailingLedger {
    async fn append(&self, _transaction: &StopListTransaction) -> RepoResult<()> {
        *self.attempts.lock().unwrap() += 1;
        Err(RepoError::Storage("disk full".into()))
    }

    async fn list_by_store(&self, _store_id: &str) -> RepoResult<Vec<StopListTransaction>> {
        Ok(Vec::new())
    }
}

// ========== Orders ==========

#[derive(Default)]
pub struct RecordingSubscriber {
    seen: Mutex<Vec<(String, OrderStatus)>>,
}

impl RecordingSubscriber {
    pub fn seen(&self) -> Vec<(String, OrderStatus)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSubscriber for RecordingSubscriber {
    async fn on_status_changed(&self, order: &Order, status: OrderStatus) {
        self.seen
            .lock()
            .unwrap()
            .push((order.order_id.clone(), status));
    }
}

/// Returns the same verdict for every order
pub struct FakeRules(Option<OrderStatus>);

impl FakeRules {
    pub fn verdict(status: OrderStatus) -> Self {
        Self(Some(status))
    }
}

#[async_trait]
impl RuleEngine for FakeRules {
    async fn evaluate(&self, _order: &Order, _store: &Store) -> Option<OrderStatus> {
        self.0
    }
}

/// Creator with a fixed answer; an error is returned once
pub struct ScriptedCreator {
    order: Option<Order>,
    error: Mutex<Option<PipelineError>>,
}

impl ScriptedCreator {
    pub fn ok(order: Order) -> Self {
        Self {
            order: Some(order),
            error: Mutex::new(None),
        }
    }

    pub fn err(error: PipelineError) -> Self {
        Self {
            order: None,
            error: Mutex::new(Some(error)),
        }
    }
}

#[async_trait]
impl OrderCreator for ScriptedCreator {
    async fn create_order(&self, _request: CreateOrderRequest) -> PipelineResult<Order> {
        if let Some(error) = self.error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.order.clone().expect("script exhausted"))
    }
}
