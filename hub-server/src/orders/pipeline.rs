//! 下单流程
//!
//! Webhook → 门店解析 → 密钥校验 → 订单映射 → 幂等入库 → (预订单/延迟)
//! → 自动接单 → 规则引擎 → 提交 POS → 结果持久化。
//!
//! # 错误分类
//!
//! | POS 结果 | 订单状态 | 返回 |
//! |----------|----------|------|
//! | 成功 | `PENDING` / `ACCEPTED` | `Ok(order)` |
//! | 超时 / 连接失败 / 5xx | 不变 | [`PipelineError::Retryable`] |
//! | 业务拒绝 | `FAILED` + 原因 | [`PipelineError::PosRejected`] |
//!
//! 虚拟门店订单: 父订单只入库不提交，按餐厅拆分的子订单各自走完整流程。

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use shared::error::{AppError, ErrorCode};
use shared::models::{AggregatorSettings, DeliveryService, Store};
use shared::order::{FailReason, Order, OrderStatus, fail_codes};
use shared::util::now_millis;
use std::sync::Arc;
use thiserror::Error;

use super::fail_reason::classify;
use super::money;
use super::rules::RuleEngine;
use crate::aggregator::{AggregatorClient, AggregatorError, AggregatorRegistry};
use crate::core::reference::ReferenceData;
use crate::db::{OrderRepository, RepoError, StoreRepository};
use crate::notify::{Notification, NotificationType, Notifier};
use crate::pos::{PosError, PosRegistry};
use crate::stoplist::StoplistEngine;
use crate::utils::time::minutes_to_millis;

// ============================================================================
// Request / Errors
// ============================================================================

/// Raw aggregator webhook
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub delivery: DeliveryService,
    pub external_store_id: String,
    pub payload: Value,
    /// Shared secret presented by the aggregator
    pub secret: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No store for {delivery} / {external_store_id}")]
    StoreNotFound {
        delivery: DeliveryService,
        external_store_id: String,
    },

    #[error("Store {store_id} has no {delivery} integration")]
    AggregatorNotConfigured {
        store_id: String,
        delivery: DeliveryService,
    },

    #[error("Invalid store secret")]
    InvalidSecret,

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Pos(#[from] PosError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    /// POS unreachable; the order is stored unchanged and may be resent
    #[error("POS unavailable, retry later: {reason}")]
    Retryable { order: Box<Order>, reason: String },

    /// POS rejected the order; it is stored as FAILED
    #[error("POS rejected the order: {reason}")]
    PosRejected { order: Box<Order>, reason: String },

    /// Virtual parent could not be split; it is stored as FAILED
    #[error("Virtual order split failed: {reason}")]
    VirtualSplit { order: Box<Order>, reason: String },

    #[error("Order {order_id} is already {status}")]
    InvalidTransition {
        order_id: String,
        status: OrderStatus,
    },
}

impl PipelineError {
    /// Order carried by the error, if it was persisted
    pub fn order(&self) -> Option<&Order> {
        match self {
            Self::Retryable { order, .. }
            | Self::PosRejected { order, .. }
            | Self::VirtualSplit { order, .. } => Some(order),
            _ => None,
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::StoreNotFound {
                delivery,
                external_store_id,
            } => AppError::store_not_found(format!("{delivery}/{external_store_id}")),
            PipelineError::AggregatorNotConfigured { .. } => {
                AppError::with_message(ErrorCode::AggregatorNotConfigured, err.to_string())
            }
            PipelineError::InvalidSecret => AppError::invalid_secret(),
            PipelineError::Aggregator(e) => e.into(),
            PipelineError::Pos(e) => e.into(),
            PipelineError::Repo(e) => e.into(),
            PipelineError::Retryable { ref order, .. } => {
                let order_id = order.order_id.clone();
                AppError::with_message(ErrorCode::OrderRetryable, err.to_string())
                    .with_detail("order_id", order_id)
            }
            PipelineError::PosRejected { ref order, .. } => {
                let order_id = order.order_id.clone();
                AppError::with_message(ErrorCode::OrderRejectedByPos, err.to_string())
                    .with_detail("order_id", order_id)
            }
            PipelineError::VirtualSplit { .. } => {
                AppError::with_message(ErrorCode::OrderPayloadInvalid, err.to_string())
            }
            PipelineError::InvalidTransition { .. } => {
                AppError::with_message(ErrorCode::OrderStatusInvalid, err.to_string())
            }
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Order creation entry point; decorators wrap it
#[async_trait]
pub trait OrderCreator: Send + Sync + 'static {
    async fn create_order(&self, request: CreateOrderRequest) -> PipelineResult<Order>;
}

// ============================================================================
// Pipeline
// ============================================================================

/// Collaborators of [`OrderPipeline`]
pub struct PipelineDeps {
    pub stores: Arc<dyn StoreRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub aggregators: AggregatorRegistry,
    pub pos: PosRegistry,
    pub rules: Arc<dyn RuleEngine>,
    pub stoplist: Arc<StoplistEngine>,
    pub notifier: Arc<dyn Notifier>,
    pub reference: Arc<ReferenceData>,
    /// `{order_id}` is substituted
    pub log_link_template: Option<String>,
    /// Queue for product-stopped alerts when the store has no chat
    pub default_queue: String,
}

pub struct OrderPipeline {
    stores: Arc<dyn StoreRepository>,
    orders: Arc<dyn OrderRepository>,
    aggregators: AggregatorRegistry,
    pos: PosRegistry,
    rules: Arc<dyn RuleEngine>,
    stoplist: Arc<StoplistEngine>,
    notifier: Arc<dyn Notifier>,
    reference: Arc<ReferenceData>,
    log_link_template: Option<String>,
    default_queue: String,
}

#[async_trait]
impl OrderCreator for OrderPipeline {
    async fn create_order(&self, request: CreateOrderRequest) -> PipelineResult<Order> {
        let delivery = request.delivery;
        let store = self
            .stores
            .find_by_external_id(delivery, &request.external_store_id)
            .await?
            .ok_or_else(|| PipelineError::StoreNotFound {
                delivery,
                external_store_id: request.external_store_id.clone(),
            })?;
        let settings = store
            .aggregator(delivery)
            .cloned()
            .ok_or_else(|| PipelineError::AggregatorNotConfigured {
                store_id: store.id.clone(),
                delivery,
            })?;

        if !secrets_match(settings.secret.as_deref(), &request.secret) {
            tracing::warn!(
                store_id = %store.id,
                delivery = %delivery,
                "Webhook rejected: invalid store secret"
            );
            return Err(PipelineError::InvalidSecret);
        }

        let client = self.aggregators.get(delivery)?;
        let mut order = client.order_from_request(&request.payload)?;
        order.delivery_service = Some(delivery);
        if order.external_store_id.is_empty() {
            order.external_store_id = request.external_store_id;
        }

        if store.is_virtual() {
            self.create_virtual(&store, &settings, client.as_ref(), order)
                .await
        } else {
            self.process(&store, &settings, client.as_ref(), order).await
        }
    }
}

impl OrderPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            stores: deps.stores,
            orders: deps.orders,
            aggregators: deps.aggregators,
            pos: deps.pos,
            rules: deps.rules,
            stoplist: deps.stoplist,
            notifier: deps.notifier,
            reference: deps.reference,
            log_link_template: deps.log_link_template,
            default_queue: deps.default_queue,
        }
    }

    /// Continue a held order (preorder or deferred) from the submission step
    pub async fn resume(&self, order: Order) -> PipelineResult<Order> {
        let store = self.stores.get(&order.store_id).await?;
        let delivery = order
            .delivery_service
            .ok_or_else(|| AggregatorError::InvalidPayload("order has no delivery service".into()))?;
        let settings = store
            .aggregator(delivery)
            .cloned()
            .unwrap_or_else(|| AggregatorSettings::new(delivery));
        let client = self.aggregators.get(delivery)?;
        tracing::info!(order_id = %order.order_id, store_id = %store.id, "Resuming held order");
        self.submit(&store, &settings, client.as_ref(), order).await
    }

    // ========== Virtual stores ==========

    async fn create_virtual(
        &self,
        store: &Store,
        settings: &AggregatorSettings,
        client: &dyn AggregatorClient,
        mut parent: Order,
    ) -> PipelineResult<Order> {
        parent.is_parent_order = true;
        self.decorate(&mut parent, store, settings, client);
        let (mut parent, redelivered) = match self.insert(parent).await? {
            Inserted::New(order) => (order, false),
            // children that never reached the POS are resumed by their own dedup
            Inserted::Duplicate(existing) if existing.status == OrderStatus::New => {
                (existing, true)
            }
            Inserted::Duplicate(existing) => return Ok(already_exists(existing)),
        };

        let Some(virtual_store) = store.virtual_store.as_ref() else {
            return Ok(parent);
        };
        let children = match client.split_virtual_store_order(&parent, virtual_store) {
            Ok(children) => children,
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(order_id = %parent.order_id, error = %reason, "Virtual order split failed");
                parent.fail(
                    FailReason::new(fail_codes::VIRTUAL_SPLIT, reason.clone()),
                    now_millis(),
                );
                self.orders.update(&parent).await?;
                return Err(PipelineError::VirtualSplit {
                    order: Box::new(parent),
                    reason,
                });
            }
        };

        tracing::info!(
            order_id = %parent.order_id,
            children = children.len(),
            "Virtual order split"
        );
        let mut resubmitted = 0;
        for child in children {
            let child_id = child.order_id.clone();
            match self.create_child(settings, client, child).await {
                Ok(child) if is_already_exists(&child) => {}
                Ok(_) => resubmitted += 1,
                Err(e) => {
                    resubmitted += 1;
                    tracing::warn!(
                        parent_order_id = %parent.order_id,
                        order_id = %child_id,
                        error = %e,
                        "Child order did not reach the POS"
                    );
                }
            }
        }
        if redelivered && resubmitted == 0 {
            return Ok(already_exists(parent));
        }
        Ok(parent)
    }

    async fn create_child(
        &self,
        parent_settings: &AggregatorSettings,
        client: &dyn AggregatorClient,
        child: Order,
    ) -> PipelineResult<Order> {
        let store = self.stores.get(&child.store_id).await?;
        let settings = store
            .aggregator(client.delivery())
            .cloned()
            .unwrap_or_else(|| parent_settings.clone());
        self.process(&store, &settings, client, child).await
    }

    // ========== Physical stores ==========

    async fn process(
        &self,
        store: &Store,
        settings: &AggregatorSettings,
        client: &dyn AggregatorClient,
        mut order: Order,
    ) -> PipelineResult<Order> {
        self.decorate(&mut order, store, settings, client);
        let mut order = match self.insert(order).await? {
            Inserted::New(order) => order,
            Inserted::Duplicate(existing) if awaiting_pos(&existing) => {
                tracing::info!(order_id = %existing.order_id, "Redelivered order resubmitted");
                return self.submit(store, settings, client, existing).await;
            }
            Inserted::Duplicate(existing) => return Ok(already_exists(existing)),
        };

        if order.is_preorder {
            let now = now_millis();
            let lead = minutes_to_millis(store.settings.preorder_lead_minutes);
            // pickup time comes from the aggregator payload as-is
            order.send_at = Some(
                order
                    .pickup_time
                    .map_or(now, |pickup| pickup.saturating_sub(lead)),
            );
            order.set_status(OrderStatus::WaitSending, now);
            self.orders.update(&order).await?;
            tracing::info!(
                order_id = %order.order_id,
                send_at = ?order.send_at,
                "Preorder held until send time"
            );
            return Ok(order);
        }

        self.submit(store, settings, client, order).await
    }

    /// Stamp identity fields and start the status history
    fn decorate(
        &self,
        order: &mut Order,
        store: &Store,
        settings: &AggregatorSettings,
        client: &dyn AggregatorClient,
    ) {
        let now = now_millis();
        order.store_id = store.id.clone();
        order.pos_type = store.pos_type;
        order.is_marketplace = client.is_marketplace(order, settings);
        if order.total <= 0.0 {
            order.total = money::items_total(&order.items);
        }
        order.log_links = self
            .log_link_template
            .iter()
            .map(|t| t.replace("{order_id}", &order.order_id))
            .collect();
        order.created_at = now;
        order.statuses_history.clear();
        order.set_status(OrderStatus::New, now);
    }

    async fn insert(&self, order: Order) -> PipelineResult<Inserted> {
        match self.orders.insert(&order).await {
            Ok(stored) => {
                tracing::info!(
                    order_id = %stored.order_id,
                    store_id = %stored.store_id,
                    "Order accepted from aggregator"
                );
                Ok(Inserted::New(stored))
            }
            Err(RepoError::AlreadyExists(_)) => {
                let delivery = order
                    .delivery_service
                    .ok_or_else(|| RepoError::NotFound(format!("Order {}", order.order_id)))?;
                let existing = self
                    .orders
                    .find_by_order_id(delivery, &order.order_id)
                    .await?
                    .ok_or_else(|| RepoError::NotFound(format!("Order {}", order.order_id)))?;
                tracing::info!(order_id = %order.order_id, status = %existing.status, "Duplicate order webhook");
                Ok(Inserted::Duplicate(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========== Submission ==========

    async fn submit(
        &self,
        store: &Store,
        settings: &AggregatorSettings,
        client: &dyn AggregatorClient,
        mut order: Order,
    ) -> PipelineResult<Order> {
        self.prepare(&mut order, store, settings);

        if !settings.send_to_pos {
            order.fail_reason = Some(FailReason::new(
                fail_codes::SEND_TO_POS_DISABLED,
                "Sending to the POS is disabled for this integration",
            ));
            order.set_status(OrderStatus::Skipped, now_millis());
            self.orders.update(&order).await?;
            tracing::info!(order_id = %order.order_id, "Order skipped, POS submission disabled");
            return Ok(order);
        }

        let defer = store.settings.defer_submission_minutes;
        if defer > 0 && !order.is_marketplace && order.send_at.is_none() {
            let now = now_millis();
            order.send_at = Some(now.saturating_add(minutes_to_millis(defer)));
            order.set_status(OrderStatus::WaitSending, now);
            self.orders.update(&order).await?;
            tracing::info!(order_id = %order.order_id, minutes = defer, "Order submission deferred");
            return Ok(order);
        }

        let auto_accept = settings.auto_accept || self.reference.forces_auto_accept(&store.id);
        if auto_accept && order.status != OrderStatus::Accepted {
            order.set_status(OrderStatus::Accepted, now_millis());
            self.orders.update(&order).await?;
            push_status(client, &order, OrderStatus::Accepted).await;
        }

        if let Some(verdict) = self.rules.evaluate(&order, store).await
            && verdict.is_terminal()
            && order.status.can_transition_to(verdict)
        {
            order.fail_reason = Some(FailReason::new(
                fail_codes::RULE_ENGINE,
                format!("Rule engine decided {verdict}"),
            ));
            order.set_status(verdict, now_millis());
            self.orders.update(&order).await?;
            tracing::info!(order_id = %order.order_id, status = %verdict, "Order stopped by rules");
            return Ok(order);
        }

        let sent = match self.pos.for_store(store) {
            Ok(pos) => pos.create_order(store, &order).await,
            Err(e) => Err(e),
        };
        let pos_order_id = match sent {
            Ok(id) => id,
            Err(e) if e.is_retry() => {
                tracing::warn!(order_id = %order.order_id, error = %e, "POS unavailable, order left for retry");
                return Err(PipelineError::Retryable {
                    reason: e.to_string(),
                    order: Box::new(order),
                });
            }
            Err(e) => return Err(self.reject(store, order, e).await),
        };

        order.pos_order_id = Some(pos_order_id);
        let post_accept = settings.post_auto_accept && order.status != OrderStatus::Accepted;
        let now = now_millis();
        if post_accept {
            order.set_status(OrderStatus::Accepted, now);
        } else if order.status != OrderStatus::Accepted {
            order.set_status(OrderStatus::Pending, now);
        }
        self.orders.update(&order).await?;
        if post_accept {
            push_status(client, &order, OrderStatus::Accepted).await;
        }
        tracing::info!(
            order_id = %order.order_id,
            pos_order_id = ?order.pos_order_id,
            status = %order.status,
            "Order sent to POS"
        );
        Ok(order)
    }

    /// Payment mapping and restaurant charge
    fn prepare(&self, order: &mut Order, store: &Store, settings: &AggregatorSettings) {
        let method = order.payment.method.clone();
        if let Some(type_id) = settings.payment_types.get(&method) {
            order.payment.payment_type_id = Some(type_id.clone());
        }
        if let Some(name) = self.reference.payment_system_name(&method) {
            order.payment.payment_system_name = Some(name.to_string());
        }
        order.restaurant_charge =
            money::restaurant_charge(order.total, store.settings.restaurant_charge_percent);
    }

    /// Persist a POS rejection and stop the offending item when it is known
    async fn reject(&self, store: &Store, mut order: Order, err: PosError) -> PipelineError {
        let message = err.to_string();
        let classification = classify(&self.reference, &message);
        tracing::error!(
            order_id = %order.order_id,
            code = %classification.reason.code,
            error = %message,
            "POS rejected the order"
        );

        if classification.stop_item
            && let Some(item_id) = classification.item_id.as_deref()
        {
            match self
                .stoplist
                .stop_pos_items(store, &[item_id.to_string()])
                .await
            {
                Ok(_) => {
                    tracing::info!(store_id = %store.id, item_id = %item_id, "Rejected item put on stop");
                    if classification.notify {
                        self.notify_product_stopped(store, &order, item_id).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(store_id = %store.id, item_id = %item_id, error = %e, "Failed to stop rejected item");
                }
            }
        }

        order.fail(classification.reason, now_millis());
        if let Err(e) = self.orders.update(&order).await {
            return e.into();
        }
        PipelineError::PosRejected {
            order: Box::new(order),
            reason: message,
        }
    }

    async fn notify_product_stopped(&self, store: &Store, order: &Order, item_id: &str) {
        let name = order
            .items
            .iter()
            .find(|i| i.pos_id.as_deref() == Some(item_id) || i.id == item_id)
            .map_or(item_id, |i| i.name.as_str());
        let queue = store
            .notifications
            .telegram_chat_id
            .as_deref()
            .or(store.notifications.stoplist_queue.as_deref())
            .unwrap_or(&self.default_queue);
        let notification = Notification::new(NotificationType::ProductStopped, queue)
            .with_store(store)
            .with_order(order)
            .with_product(name);
        if let Err(e) = self.notifier.send_message_to_queue(notification).await {
            tracing::warn!(order_id = %order.order_id, error = %e, "Product-stopped notification failed");
        }
    }
}

enum Inserted {
    New(Order),
    /// Stored copy, untouched
    Duplicate(Order),
}

/// Stored but never handed to the POS: a retryable failure left it behind.
/// Auto-accept may already have moved it to `ACCEPTED`.
fn awaiting_pos(order: &Order) -> bool {
    !order.is_parent_order
        && order.pos_order_id.is_none()
        && matches!(order.status, OrderStatus::New | OrderStatus::Accepted)
}

/// Tag a stored order returned for a repeated webhook; nothing is persisted
fn already_exists(mut order: Order) -> Order {
    order.fail_reason = Some(FailReason::new(
        fail_codes::ALREADY_EXISTS,
        "Order already exists",
    ));
    order
}

fn is_already_exists(order: &Order) -> bool {
    order
        .fail_reason
        .as_ref()
        .is_some_and(|r| r.code == fail_codes::ALREADY_EXISTS)
}

async fn push_status(client: &dyn AggregatorClient, order: &Order, status: OrderStatus) {
    if let Err(e) = client.update_order_in_aggregator(order, status).await {
        tracing::warn!(
            order_id = %order.order_id,
            status = %status,
            error = %e,
            "Status push to aggregator failed"
        );
    }
}

/// Digest both sides so the comparison does not depend on where they differ.
/// A store without a configured secret accepts nothing.
fn secrets_match(expected: Option<&str>, given: &str) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return false;
    };
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(given.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
