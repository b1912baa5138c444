//! 静态参考数据
//!
//! 支付系统显示名、POS 错误特征表、自动接单白名单。启动时加载一次，
//! 以 `Arc<ReferenceData>` 显式传入需要的组件。

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceDataError {
    #[error("Failed to read reference data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reference data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Known POS error message signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSignature {
    /// Case-insensitive substrings; all must appear in the POS message
    pub patterns: Vec<String>,
    pub code: String,
    pub business_name: String,
    pub reason: String,
    pub solution: String,
    /// Marker preceding the offending item's POS id (e.g. `product `)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_marker: Option<String>,
    /// Put the captured item on stop
    #[serde(default)]
    pub stop_item: bool,
    /// Send a notification when this signature matches
    #[serde(default)]
    pub notify: bool,
}

impl ErrorSignature {
    pub fn matches(&self, message_lower: &str) -> bool {
        !self.patterns.is_empty()
            && self
                .patterns
                .iter()
                .all(|p| message_lower.contains(&p.to_lowercase()))
    }
}

/// Immutable lookup tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Aggregator payment method -> display name
    #[serde(default)]
    pub payment_system_names: HashMap<String, String>,
    /// Checked in order; first match wins
    #[serde(default)]
    pub error_signatures: Vec<ErrorSignature>,
    /// Stores that always auto-accept regardless of aggregator settings
    #[serde(default)]
    pub auto_accept_store_ids: HashSet<String>,
}

impl ReferenceData {
    /// 加载参考数据: 指定路径读取 JSON，否则使用内置表
    pub fn load(path: Option<&str>) -> Result<Self, ReferenceDataError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReferenceDataError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn payment_system_name(&self, method: &str) -> Option<&str> {
        self.payment_system_names.get(method).map(String::as_str)
    }

    pub fn forces_auto_accept(&self, store_id: &str) -> bool {
        self.auto_accept_store_ids.contains(store_id)
    }

    /// 内置参考表
    pub fn builtin() -> Self {
        let payment_system_names = [
            ("cash", "Cash"),
            ("card", "Card on delivery"),
            ("online", "Online payment"),
            ("kaspi", "Kaspi"),
            ("apple_pay", "Apple Pay"),
            ("google_pay", "Google Pay"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let error_signatures = vec![
            signature(
                &["stop list"],
                "PRODUCT_ON_STOP",
                "Product is on stop in the POS",
                "The POS rejected an item that is currently on its stop list",
                "Remove the item from the POS stop list or from the aggregator menu",
                Some("product "),
                true,
                true,
            ),
            signature(
                &["product", "not found"],
                "PRODUCT_NOT_FOUND",
                "Product is missing in the POS",
                "An ordered product has no counterpart in the POS nomenclature",
                "Re-link the aggregator product to an existing POS product",
                Some("product "),
                true,
                true,
            ),
            signature(
                &["modifier", "amount"],
                "MODIFIER_AMOUNT",
                "Wrong modifier amount",
                "The order breaks a modifier group's min/max constraint",
                "Align modifier group limits between the POS and the aggregator",
                None,
                false,
                true,
            ),
            signature(
                &["payment type"],
                "PAYMENT_TYPE_NOT_FOUND",
                "Unknown payment type",
                "The mapped payment type does not exist in the POS",
                "Check the payment type mapping of the aggregator integration",
                None,
                false,
                true,
            ),
            signature(
                &["terminal"],
                "TERMINAL_UNAVAILABLE",
                "POS terminal is offline",
                "The POS terminal group did not answer",
                "Make sure the POS terminal is online",
                None,
                false,
                true,
            ),
        ];

        Self {
            payment_system_names,
            error_signatures,
            auto_accept_store_ids: HashSet::new(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn signature(
    patterns: &[&str],
    code: &str,
    business_name: &str,
    reason: &str,
    solution: &str,
    item_marker: Option<&str>,
    stop_item: bool,
    notify: bool,
) -> ErrorSignature {
    ErrorSignature {
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        code: code.to_string(),
        business_name: business_name.to_string(),
        reason: reason.to_string(),
        solution: solution.to_string(),
        item_marker: item_marker.map(str::to_string),
        stop_item,
        notify,
    }
}
