//! 通知
//!
//! - [`Notifier`] - 把渲染好的文本投递到消息队列
//! - [`QueueNotifier`] - HTTP 队列实现 (未配置地址时只写日志)
//! - [`decorators`] - 包装下单流程的 Telegram / WhatsApp / Firebase 装饰器
//! - [`format`] - 通知文本渲染

pub mod decorators;
pub mod format;

use async_trait::async_trait;
use serde::Serialize;
use shared::error::{AppError, ErrorCode};
use shared::models::Store;
use shared::order::Order;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Queue {queue} returned {status}")]
    Rejected { queue: String, status: u16 },
}

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        AppError::with_message(ErrorCode::NotificationFailed, err.to_string())
    }
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Order reached the POS
    OrderCreated,
    /// POS rejected the order
    OrderFailed,
    /// POS asked for a retry
    OrderRetry,
    /// Item put on stop after a POS rejection
    ProductStopped,
    /// Some aggregator pushes of a stoplist run failed
    StoplistFailure,
    /// Message to the customer
    CustomerMessage,
    /// Push to the restaurant app
    RestaurantPush,
}

/// One message for one queue
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationType,
    /// Target queue (chat, topic, stoplist queue)
    pub queue: String,
    pub order: Option<Order>,
    pub store: Option<Store>,
    pub error: Option<String>,
    pub message: String,
    pub extra_message: Option<String>,
    pub product: Option<String>,
}

impl Notification {
    pub fn new(kind: NotificationType, queue: impl Into<String>) -> Self {
        Self {
            kind,
            queue: queue.into(),
            order: None,
            store: None,
            error: None,
            message: String::new(),
            extra_message: None,
            product: None,
        }
    }

    pub fn with_order(mut self, order: &Order) -> Self {
        self.order = Some(order.clone());
        self
    }

    pub fn with_store(mut self, store: &Store) -> Self {
        self.store = Some(store.clone());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_extra_message(mut self, extra: impl Into<String>) -> Self {
        self.extra_message = Some(extra.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Presentational text body
    pub fn render(&self) -> String {
        format::render(self)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send_message_to_queue(&self, notification: Notification) -> NotifyResult<()>;
}

#[derive(Serialize)]
struct QueueMessage<'a> {
    queue: &'a str,
    kind: NotificationType,
    text: String,
}

/// Posts rendered notifications to `{base_url}/{queue}`
pub struct QueueNotifier {
    base_url: Option<String>,
    client: reqwest::Client,
}

impl QueueNotifier {
    pub fn new(base_url: Option<String>, timeout: Duration) -> NotifyResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl Notifier for QueueNotifier {
    async fn send_message_to_queue(&self, notification: Notification) -> NotifyResult<()> {
        let text = notification.render();
        let Some(base_url) = &self.base_url else {
            tracing::info!(
                queue = %notification.queue,
                kind = ?notification.kind,
                "Notification (no queue configured):\n{}",
                text
            );
            return Ok(());
        };

        let url = format!("{}/{}", base_url.trim_end_matches('/'), notification.queue);
        let response = self
            .client
            .post(&url)
            .json(&QueueMessage {
                queue: &notification.queue,
                kind: notification.kind,
                text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                queue: notification.queue,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
