//! Failure report for a stoplist run

use shared::models::{ChangedItem, Menu, StopListTransaction, Store};
use std::fmt::Write;

use super::resolve::stop_list_names;
use crate::notify::{Notification, NotificationType};

fn indicator(item: &ChangedItem) -> &'static str {
    if item.is_available { "🟢" } else { "🔴" }
}

/// Report body: failing targets, their diff, and the full current POS stop
/// list (independent of this run's delta).
pub fn build_report(store: &Store, transaction: &StopListTransaction, pos_menu: &Menu) -> String {
    let mut out = String::new();

    for failure in transaction.failures() {
        let _ = writeln!(
            out,
            "❗ {} / {}: {}",
            failure.delivery, failure.external_store_id, failure.message
        );
        for item in failure.products.iter().chain(&failure.attributes) {
            let _ = writeln!(out, "   {} {}", indicator(item), item.name);
        }
    }

    let stopped = stop_list_names(pos_menu);
    let _ = writeln!(out, "\nCurrent POS stop list ({}):", stopped.len());
    if stopped.is_empty() {
        let _ = writeln!(out, "   (empty)");
    }
    for name in stopped {
        let _ = writeln!(out, "   • {name}");
    }

    let _ = write!(out, "Store: {}", store.name);
    out
}

/// Wrap the report for the store's queue override or the default queue
pub fn report_notification(
    store: &Store,
    transaction: &StopListTransaction,
    pos_menu: &Menu,
    default_queue: &str,
) -> Notification {
    let queue = store
        .notifications
        .stoplist_queue
        .as_deref()
        .unwrap_or(default_queue);
    Notification::new(NotificationType::StoplistFailure, queue)
        .with_store(store)
        .with_message(build_report(store, transaction, pos_menu))
}
