//! Store Model
//!
//! One store per restaurant. Owns the POS menu id, the aggregator menus
//! attached to it, and per-aggregator integration settings.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::stoplist::StoplistSchedule;
use crate::order::OrderStatus;

/// Delivery aggregator (order channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryService {
    Wolt,
    Glovo,
    Yandex,
    Talabat,
    Deliveroo,
    Chocofood,
    QrMenu,
    KwaakaAdmin,
    StarterApp,
}

impl DeliveryService {
    pub const ALL: [DeliveryService; 9] = [
        Self::Wolt,
        Self::Glovo,
        Self::Yandex,
        Self::Talabat,
        Self::Deliveroo,
        Self::Chocofood,
        Self::QrMenu,
        Self::KwaakaAdmin,
        Self::StarterApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wolt => "wolt",
            Self::Glovo => "glovo",
            Self::Yandex => "yandex",
            Self::Talabat => "talabat",
            Self::Deliveroo => "deliveroo",
            Self::Chocofood => "chocofood",
            Self::QrMenu => "qr_menu",
            Self::KwaakaAdmin => "kwaaka_admin",
            Self::StarterApp => "starter_app",
        }
    }
}

impl fmt::Display for DeliveryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an unknown delivery service name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown delivery service: {0}")]
pub struct UnknownDeliveryService(pub String);

impl FromStr for DeliveryService {
    type Err = UnknownDeliveryService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| UnknownDeliveryService(s.to_string()))
    }
}

/// POS back-end type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosType {
    Iiko,
    Syrve,
    Rkeeper,
    Posist,
}

impl PosType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iiko => "iiko",
            Self::Syrve => "syrve",
            Self::Rkeeper => "rkeeper",
            Self::Posist => "posist",
        }
    }
}

impl fmt::Display for PosType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_type: Option<PosType>,
    /// POS menu document id
    pub pos_menu_id: String,
    #[serde(default)]
    pub pos: PosSettings,
    /// Aggregator menus attached to the store (ordered)
    #[serde(default)]
    pub menus: Vec<StoreDsMenu>,
    /// Per-aggregator integration settings
    #[serde(default)]
    pub aggregators: Vec<AggregatorSettings>,
    /// Present when the store aggregates several physical restaurants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_store: Option<VirtualStoreSettings>,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub settings: StoreSettings,
    #[serde(default)]
    pub stoplist_schedules: Vec<StoplistSchedule>,
}

impl Store {
    pub fn aggregator(&self, delivery: DeliveryService) -> Option<&AggregatorSettings> {
        self.aggregators.iter().find(|a| a.delivery == delivery)
    }

    /// External store ids registered for the aggregator (may be several)
    pub fn external_store_ids(&self, delivery: DeliveryService) -> &[String] {
        self.aggregator(delivery)
            .map(|a| a.external_store_ids.as_slice())
            .unwrap_or_default()
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_store.is_some()
    }

    /// Active, non-deleted aggregator menus
    pub fn active_menus(&self) -> impl Iterator<Item = &StoreDsMenu> {
        self.menus.iter().filter(|m| m.is_active && !m.is_deleted)
    }
}

/// Aggregator menu attached to a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDsMenu {
    pub menu_id: String,
    pub delivery: DeliveryService,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

/// POS connection settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PosSettings {
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub terminal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Per-aggregator integration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorSettings {
    pub delivery: DeliveryService,
    #[serde(default)]
    pub external_store_ids: Vec<String>,
    /// Shared secret the aggregator webhook must present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// When false, orders are recorded as SKIPPED instead of sent to the POS
    #[serde(default = "default_true")]
    pub send_to_pos: bool,
    /// Accept in the aggregator before POS submission
    #[serde(default)]
    pub auto_accept: bool,
    /// Accept in the aggregator after a successful POS submission
    #[serde(default)]
    pub post_auto_accept: bool,
    /// Aggregator couriers deliver the order
    #[serde(default)]
    pub is_marketplace: bool,
    /// Aggregator payment method -> POS payment type id
    #[serde(default)]
    pub payment_types: HashMap<String, String>,
    /// Statuses that are not echoed back to the aggregator
    #[serde(default)]
    pub suppressed_status_echo: Vec<OrderStatus>,
}

impl AggregatorSettings {
    pub fn new(delivery: DeliveryService) -> Self {
        Self {
            delivery,
            external_store_ids: Vec::new(),
            secret: None,
            send_to_pos: true,
            auto_accept: false,
            post_auto_accept: false,
            is_marketplace: false,
            payment_types: HashMap::new(),
            suppressed_status_echo: Vec::new(),
        }
    }

    pub fn with_external_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external_store_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn suppresses_echo(&self, status: OrderStatus) -> bool {
        self.suppressed_status_echo.contains(&status)
    }
}

/// Virtual store: one aggregator storefront over several physical restaurants
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualStoreSettings {
    #[serde(default)]
    pub restaurants: Vec<VirtualRestaurant>,
}

impl VirtualStoreSettings {
    /// Physical store id for a restaurant id used in composite item ids
    pub fn store_for(&self, restaurant_id: &str) -> Option<&str> {
        self.restaurants
            .iter()
            .find(|r| r.restaurant_id == restaurant_id)
            .map(|r| r.store_id.as_str())
    }

    /// Restaurant id (composite prefix) of a physical store
    pub fn restaurant_for(&self, store_id: &str) -> Option<&str> {
        self.restaurants
            .iter()
            .find(|r| r.store_id == store_id)
            .map(|r| r.restaurant_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualRestaurant {
    pub restaurant_id: String,
    pub store_id: String,
}

/// Notification channel settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
    #[serde(default)]
    pub whatsapp_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase_topic: Option<String>,
    /// Overrides the default stoplist report queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stoplist_queue: Option<String>,
}

/// Operational settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// IANA timezone name
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Share of the order total charged to the restaurant (marketplace orders)
    #[serde(default)]
    pub restaurant_charge_percent: f64,
    /// How long before pickup a pre-order is sent to the POS
    #[serde(default = "default_preorder_lead")]
    pub preorder_lead_minutes: i64,
    /// Delay before POS submission for eligible orders (0 = send immediately)
    #[serde(default)]
    pub defer_submission_minutes: i64,
    /// Lunch/dinner windows that throttle deferred submission
    #[serde(default)]
    pub busy_windows: Vec<BusyWindow>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            restaurant_charge_percent: 0.0,
            preorder_lead_minutes: default_preorder_lead(),
            defer_submission_minutes: 0,
            busy_windows: Vec::new(),
        }
    }
}

/// Busy window (local time of day)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusyWindow {
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Active orders at which further deferred orders are held back
    pub max_active_orders: usize,
    /// How far to push `send_at` when the window is saturated
    #[serde(default = "default_busy_delay")]
    pub delay_minutes: i64,
}

impl BusyWindow {
    /// Windows may wrap midnight (start > end)
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_preorder_lead() -> i64 {
    30
}

fn default_busy_delay() -> i64 {
    5
}
