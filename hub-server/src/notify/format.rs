//! Notification text rendering (Telegram-flavoured Markdown)

use std::fmt::Write;

use super::{Notification, NotificationType};

fn title(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::OrderCreated => "✅ New order",
        NotificationType::OrderFailed => "❌ Order failed",
        NotificationType::OrderRetry => "⏳ Order will be retried",
        NotificationType::ProductStopped => "⛔ Item put on stop",
        NotificationType::StoplistFailure => "⚠️ Stoplist sync failed",
        NotificationType::CustomerMessage => "📦 Your order",
        NotificationType::RestaurantPush => "🔔 New order",
    }
}

/// Render a notification as a text block.
///
/// Lines are emitted only for the fields that are present.
pub fn render(n: &Notification) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "*{}*", title(n.kind));

    if let Some(store) = &n.store {
        let _ = writeln!(out, "Store: {} ({})", store.name, store.id);
    }
    if let Some(order) = &n.order {
        let delivery = order
            .delivery_service
            .map(|d| d.as_str())
            .unwrap_or("unknown");
        let _ = writeln!(out, "Order: {} / {}", delivery, order.order_id);
        if !order.order_code.is_empty() {
            let _ = writeln!(out, "Code: {}", order.order_code);
        }
        let _ = writeln!(out, "Status: {}", order.status);
        if let Some(reason) = &order.fail_reason
            && !reason.business_name.is_empty()
        {
            let _ = writeln!(out, "Reason: {}", reason.business_name);
            if !reason.solution.is_empty() {
                let _ = writeln!(out, "Solution: {}", reason.solution);
            }
        }
    }
    if let Some(product) = &n.product {
        let _ = writeln!(out, "Item: {product}");
    }
    if !n.message.is_empty() {
        let _ = writeln!(out, "{}", n.message);
    }
    if let Some(error) = &n.error {
        let _ = writeln!(out, "Error: `{error}`");
    }
    if let Some(extra) = &n.extra_message {
        let _ = writeln!(out, "{extra}");
    }
    out.trim_end().to_string()
}
