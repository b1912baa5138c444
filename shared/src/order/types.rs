//! Canonical order types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{DeliveryService, PosType};

// ============================================================================
// Order Status
// ============================================================================

/// 订单状态
///
/// Forward path: `NEW → (WAIT_SENDING | PENDING) → ACCEPTED → COOKING_STARTED
/// → COOKING_COMPLETE → READY_FOR_PICKUP → OUT_FOR_DELIVERY → CLOSED`.
/// Cancellations, `FAILED` and `SKIPPED` are terminal off-ramps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    New,
    /// Held until the deferred-submission sweep sends it
    WaitSending,
    /// Sent to the POS
    Pending,
    Accepted,
    CookingStarted,
    CookingComplete,
    ReadyForPickup,
    OutForDelivery,
    Closed,
    CancelledByDeliveryService,
    CancelledByPosSystem,
    Failed,
    /// Integration configured not to send to the POS
    Skipped,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::WaitSending => "WAIT_SENDING",
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::CookingStarted => "COOKING_STARTED",
            Self::CookingComplete => "COOKING_COMPLETE",
            Self::ReadyForPickup => "READY_FOR_PICKUP",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Closed => "CLOSED",
            Self::CancelledByDeliveryService => "CANCELLED_BY_DELIVERY_SERVICE",
            Self::CancelledByPosSystem => "CANCELLED_BY_POS_SYSTEM",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Position on the forward path (None for off-ramps)
    fn rank(&self) -> Option<u8> {
        match self {
            Self::New => Some(0),
            Self::WaitSending => Some(1),
            Self::Pending => Some(2),
            Self::Accepted => Some(3),
            Self::CookingStarted => Some(4),
            Self::CookingComplete => Some(5),
            Self::ReadyForPickup => Some(6),
            Self::OutForDelivery => Some(7),
            Self::Closed => Some(8),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed
                | Self::CancelledByDeliveryService
                | Self::CancelledByPosSystem
                | Self::Failed
                | Self::Skipped
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::CancelledByDeliveryService | Self::CancelledByPosSystem
        )
    }

    /// Order has been handed to the POS and is not finished yet
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::Accepted
                | Self::CookingStarted
                | Self::CookingComplete
                | Self::ReadyForPickup
                | Self::OutForDelivery
        )
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Terminal states accept nothing. Off-ramps are reachable from every
    /// non-terminal state. `WAIT_SENDING` is only entered from `NEW`;
    /// otherwise the forward path only moves forward.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        if next == Self::WaitSending {
            return *self == Self::New;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only status history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistory {
    pub name: OrderStatus,
    /// Unix millis
    pub time: i64,
}

// ============================================================================
// Fail Reason
// ============================================================================

/// Fixed fail-reason codes set by the pipeline itself
pub mod fail_codes {
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const SEND_TO_POS_DISABLED: &str = "SEND_TO_POS_DISABLED";
    pub const POS_ERROR: &str = "POS_ERROR";
    pub const RULE_ENGINE: &str = "RULE_ENGINE";
    pub const VIRTUAL_SPLIT: &str = "VIRTUAL_SPLIT";
}

/// Business-readable classification of a failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FailReason {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub solution: String,
}

impl FailReason {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Order Lines
// ============================================================================

/// Modifier attached to an order line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderItemAttribute {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_id: Option<String>,
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub price: f64,
}

/// Order line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderItem {
    /// Aggregator product id (composite for virtual stores)
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_id: Option<String>,
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    /// Unit price
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub attributes: Vec<OrderItemAttribute>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        let attributes: f64 = self
            .attributes
            .iter()
            .map(|a| a.price * f64::from(a.quantity))
            .sum();
        (self.price + attributes) * f64::from(self.quantity)
    }
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Customer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PaymentInfo {
    /// Aggregator payment method code
    #[serde(default)]
    pub method: String,
    /// Mapped POS payment type id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_type_id: Option<String>,
    /// Display name of the payment system
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_system_name: Option<String>,
}

// ============================================================================
// Order
// ============================================================================

/// Canonical order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Order {
    /// Storage identity (assigned on insert)
    #[serde(default)]
    pub id: String,
    /// Aggregator order id
    pub order_id: String,
    /// Aggregator short code shown to couriers
    #[serde(default)]
    pub order_code: String,
    pub delivery_service: Option<DeliveryService>,
    #[serde(default)]
    pub store_id: String,
    #[serde(default)]
    pub external_store_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_type: Option<PosType>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub statuses_history: Vec<StatusHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<FailReason>,

    // === Virtual store split ===
    #[serde(default)]
    pub is_parent_order: bool,
    #[serde(default)]
    pub is_child_order: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_order_id: Option<String>,
    /// Restaurant id of a child order inside its virtual store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,

    // === Content ===
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub customer: Customer,
    #[serde(default)]
    pub payment: PaymentInfo,
    #[serde(default)]
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_charge: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    // === Scheduling ===
    #[serde(default)]
    pub is_preorder: bool,
    /// Requested pickup time (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_time: Option<i64>,
    /// Earliest POS submission time for held orders (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_at: Option<i64>,
    #[serde(default)]
    pub is_marketplace: bool,

    // === POS ===
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_order_id: Option<String>,
    /// Diagnostic log-stream links
    #[serde(default)]
    pub log_links: Vec<String>,

    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Order {
    pub fn new(delivery: DeliveryService, order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            delivery_service: Some(delivery),
            ..Default::default()
        }
    }

    /// Key used for idempotent insert
    pub fn dedup_key(&self) -> String {
        dedup_key(self.delivery_service, &self.order_id)
    }

    /// Set status and append to history
    pub fn set_status(&mut self, status: OrderStatus, at: i64) {
        self.status = status;
        self.statuses_history.push(StatusHistory { name: status, time: at });
        self.updated_at = at;
    }

    /// Move to FAILED with a reason
    pub fn fail(&mut self, reason: FailReason, at: i64) {
        self.fail_reason = Some(reason);
        self.set_status(OrderStatus::Failed, at);
    }

    pub fn items_total(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }
}

/// `"<delivery>:<order_id>"`
pub fn dedup_key(delivery: Option<DeliveryService>, order_id: &str) -> String {
    match delivery {
        Some(delivery) => format!("{}:{}", delivery.as_str(), order_id),
        None => format!("unknown:{order_id}"),
    }
}
