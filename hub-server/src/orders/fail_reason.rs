//! POS 拒单原因分类
//!
//! 按 [`ReferenceData::error_signatures`] 顺序匹配 POS 错误文本，
//! 第一个命中的特征决定业务原因、是否停售对应商品以及是否通知。

use shared::order::{FailReason, fail_codes};

use crate::core::reference::ReferenceData;

/// Classified POS rejection
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub reason: FailReason,
    /// POS id of the offending item, when the message names one
    pub item_id: Option<String>,
    pub stop_item: bool,
    pub notify: bool,
}

pub fn classify(reference: &ReferenceData, message: &str) -> Classification {
    let lower = message.to_lowercase();
    if let Some(signature) = reference
        .error_signatures
        .iter()
        .find(|s| s.matches(&lower))
    {
        let item_id = signature
            .item_marker
            .as_deref()
            .and_then(|marker| extract_item(message, marker));
        return Classification {
            reason: FailReason {
                code: signature.code.clone(),
                message: message.to_string(),
                business_name: signature.business_name.clone(),
                reason: signature.reason.clone(),
                solution: signature.solution.clone(),
            },
            stop_item: signature.stop_item && item_id.is_some(),
            item_id,
            notify: signature.notify,
        };
    }

    Classification {
        reason: FailReason {
            code: fail_codes::POS_ERROR.to_string(),
            message: message.to_string(),
            business_name: "POS rejected the order".to_string(),
            reason: message.to_string(),
            solution: "Check the order in the POS and resend it manually".to_string(),
        },
        item_id: None,
        stop_item: false,
        notify: true,
    }
}

/// Token following `marker` (case-insensitive), quotes and brackets stripped
pub fn extract_item(message: &str, marker: &str) -> Option<String> {
    // ASCII lowering keeps byte offsets aligned with `message`
    let haystack = message.to_ascii_lowercase();
    let start = haystack.find(&marker.to_ascii_lowercase())? + marker.len();
    let rest = message[start..].trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '\'' | '"' | '(' | '[' | '{' | ':' | '=')
    });
    let token: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_list_rejection_names_item() {
        let reference = ReferenceData::builtin();
        let c = classify(
            &reference,
            "Product 'a1b2-c3' is in stop list of terminal group",
        );
        assert_eq!(c.reason.code, "PRODUCT_ON_STOP");
        assert_eq!(c.item_id.as_deref(), Some("a1b2-c3"));
        assert!(c.stop_item);
        assert!(c.notify);
        assert!(!c.reason.solution.is_empty());
    }

    #[test]
    fn test_unknown_message_falls_back() {
        let reference = ReferenceData::builtin();
        let c = classify(&reference, "Kitchen printer on fire");
        assert_eq!(c.reason.code, fail_codes::POS_ERROR);
        assert_eq!(c.reason.message, "Kitchen printer on fire");
        assert!(c.item_id.is_none());
        assert!(!c.stop_item);
    }

    #[test]
    fn test_signature_without_item_does_not_stop() {
        let reference = ReferenceData::builtin();
        let c = classify(&reference, "Stop list check failed");
        assert_eq!(c.reason.code, "PRODUCT_ON_STOP");
        assert!(c.item_id.is_none());
        assert!(!c.stop_item);
    }

    #[test]
    fn test_extract_item() {
        assert_eq!(
            extract_item("PRODUCT \"x-1\" not found", "product ").as_deref(),
            Some("x-1")
        );
        assert_eq!(extract_item("product: p_7, qty 2", "product"), Some("p_7".into()));
        assert_eq!(extract_item("no marker here", "product "), None);
        assert_eq!(extract_item("ends with product ", "product "), None);
    }
}
