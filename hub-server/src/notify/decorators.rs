//! 下单通知装饰器
//!
//! 每个装饰器包装一个 [`OrderCreator`]：先调用内层，再按结果向各自通道发通知。
//! 通知失败只记日志，不影响下单结果；同一订单同一结果在 [`SENT_TTL`] 内只通知一次。
//!
//! ```text
//! Firebase(WhatsApp(Telegram(OrderPipeline)))
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use shared::models::Store;
use shared::order::{Order, OrderStatus, fail_codes};
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;

use super::{Notification, NotificationType, Notifier};
use crate::db::StoreRepository;
use crate::orders::{CreateOrderRequest, OrderCreator, PipelineError, PipelineResult};

/// What the wrapped creator produced for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Handed to the POS
    Created,
    /// Held for later submission
    Held,
    Rejected,
    Retry,
}

impl Outcome {
    /// None for results nobody is told about (duplicates, skipped orders,
    /// requests rejected before an order existed)
    fn of(result: &PipelineResult<Order>) -> Option<(Outcome, &Order)> {
        match result {
            Ok(order) => {
                let duplicate = order
                    .fail_reason
                    .as_ref()
                    .is_some_and(|r| r.code == fail_codes::ALREADY_EXISTS);
                if duplicate {
                    return None;
                }
                match order.status {
                    OrderStatus::Pending | OrderStatus::Accepted => Some((Outcome::Created, order)),
                    OrderStatus::WaitSending => Some((Outcome::Held, order)),
                    OrderStatus::Failed | OrderStatus::CancelledByPosSystem => {
                        Some((Outcome::Rejected, order))
                    }
                    _ => None,
                }
            }
            Err(PipelineError::Retryable { order, .. }) => Some((Outcome::Retry, &**order)),
            Err(PipelineError::PosRejected { order, .. })
            | Err(PipelineError::VirtualSplit { order, .. }) => Some((Outcome::Rejected, &**order)),
            Err(_) => None,
        }
    }
}

/// A notification target reacting to order outcomes
pub trait NotificationChannel: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn notification(
        &self,
        outcome: Outcome,
        order: &Order,
        store: &Store,
        error: Option<&PipelineError>,
    ) -> Option<Notification>;
}

/// How long a sent notification suppresses repeats of the same outcome
pub const SENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct NotifyDecorator<C> {
    inner: Arc<dyn OrderCreator>,
    channel: C,
    stores: Arc<dyn StoreRepository>,
    notifier: Arc<dyn Notifier>,
    /// (dedup key, outcome) -> sent at (Unix millis)
    sent: DashMap<(String, Outcome), i64>,
    ttl_ms: i64,
}

impl<C: NotificationChannel> NotifyDecorator<C> {
    pub fn new(
        inner: Arc<dyn OrderCreator>,
        channel: C,
        stores: Arc<dyn StoreRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner,
            channel,
            stores,
            notifier,
            sent: DashMap::new(),
            ttl_ms: i64::try_from(SENT_TTL.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Drop dedup entries older than the TTL
    fn prune(&self, now: i64) {
        self.sent
            .retain(|_, sent_at| now.saturating_sub(*sent_at) < self.ttl_ms);
    }

    async fn observe(&self, result: &PipelineResult<Order>) {
        let Some((outcome, order)) = Outcome::of(result) else {
            return;
        };
        let channel = self.channel.name();

        let store = match self.stores.get(&order.store_id).await {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(channel, order_id = %order.order_id, error = %e, "Notification skipped, store unavailable");
                return;
            }
        };
        let Some(notification) = self
            .channel
            .notification(outcome, order, &store, result.as_ref().err())
        else {
            return;
        };

        let now = now_millis();
        self.prune(now);
        let key = (order.dedup_key(), outcome);
        if self.sent.insert(key.clone(), now).is_some() {
            tracing::debug!(channel, order_id = %order.order_id, ?outcome, "Already notified");
            return;
        }
        if let Err(e) = self.notifier.send_message_to_queue(notification).await {
            // allow a later attempt for the same outcome
            self.sent.remove(&key);
            tracing::warn!(channel, order_id = %order.order_id, error = %e, "Notification failed");
        }
    }
}

#[async_trait]
impl<C: NotificationChannel> OrderCreator for NotifyDecorator<C> {
    async fn create_order(&self, request: CreateOrderRequest) -> PipelineResult<Order> {
        let result = self.inner.create_order(request).await;
        self.observe(&result).await;
        result
    }
}

// ========== Channels ==========

/// Failures and retries to the store's Telegram chat
#[derive(Debug, Clone, Copy, Default)]
pub struct Telegram;

impl NotificationChannel for Telegram {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn notification(
        &self,
        outcome: Outcome,
        order: &Order,
        store: &Store,
        error: Option<&PipelineError>,
    ) -> Option<Notification> {
        let kind = match outcome {
            Outcome::Rejected => NotificationType::OrderFailed,
            Outcome::Retry => NotificationType::OrderRetry,
            Outcome::Created | Outcome::Held => return None,
        };
        let chat = store.notifications.telegram_chat_id.as_deref()?;
        let mut notification = Notification::new(kind, chat)
            .with_order(order)
            .with_store(store);
        if let Some(error) = error {
            notification = notification.with_error(error.to_string());
        }
        Some(notification)
    }
}

/// Order confirmation to the customer
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatsApp;

impl NotificationChannel for WhatsApp {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    fn notification(
        &self,
        outcome: Outcome,
        order: &Order,
        store: &Store,
        _error: Option<&PipelineError>,
    ) -> Option<Notification> {
        if outcome != Outcome::Created
            || !store.notifications.whatsapp_enabled
            || order.customer.phone.is_empty()
        {
            return None;
        }
        let code = if order.order_code.is_empty() {
            &order.order_id
        } else {
            &order.order_code
        };
        Some(
            Notification::new(NotificationType::CustomerMessage, "whatsapp")
                .with_order(order)
                .with_store(store)
                .with_message(format!("Your order {code} was received by {}", store.name))
                .with_extra_message(order.customer.phone.clone()),
        )
    }
}

/// New-order push to the restaurant app topic
#[derive(Debug, Clone, Copy, Default)]
pub struct Firebase;

impl NotificationChannel for Firebase {
    fn name(&self) -> &'static str {
        "firebase"
    }

    fn notification(
        &self,
        outcome: Outcome,
        order: &Order,
        store: &Store,
        _error: Option<&PipelineError>,
    ) -> Option<Notification> {
        if !matches!(outcome, Outcome::Created | Outcome::Held) {
            return None;
        }
        let topic = store.notifications.firebase_topic.as_deref()?;
        Some(
            Notification::new(NotificationType::RestaurantPush, topic)
                .with_order(order)
                .with_store(store),
        )
    }
}

pub type TelegramDecorator = NotifyDecorator<Telegram>;
pub type WhatsAppDecorator = NotifyDecorator<WhatsApp>;
pub type FirebaseDecorator = NotifyDecorator<Firebase>;

/// Pipeline wrapped in every notification channel
pub fn decorate(
    pipeline: Arc<dyn OrderCreator>,
    stores: Arc<dyn StoreRepository>,
    notifier: Arc<dyn Notifier>,
) -> Arc<dyn OrderCreator> {
    let telegram: Arc<dyn OrderCreator> = Arc::new(TelegramDecorator::new(
        pipeline,
        Telegram,
        stores.clone(),
        notifier.clone(),
    ));
    let whatsapp: Arc<dyn OrderCreator> = Arc::new(WhatsAppDecorator::new(
        telegram,
        WhatsApp,
        stores.clone(),
        notifier.clone(),
    ));
    Arc::new(FirebaseDecorator::new(whatsapp, Firebase, stores, notifier))
}
