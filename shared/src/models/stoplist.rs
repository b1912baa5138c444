//! Stoplist ledger and schedules
//!
//! A [`StopListTransaction`] is written once per propagation run and never
//! mutated afterwards.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::store::DeliveryService;

/// Outcome of one push call against one aggregator/external store id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Error,
}

/// Item whose availability changed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedItem {
    pub ext_id: String,
    pub name: String,
    pub is_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// One attempt's outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    pub delivery: DeliveryService,
    pub external_store_id: String,
    pub menu_id: String,
    pub status: TransactionStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub products: Vec<ChangedItem>,
    #[serde(default)]
    pub attributes: Vec<ChangedItem>,
    pub created_at: i64,
}

impl TransactionData {
    pub fn is_error(&self) -> bool {
        self.status == TransactionStatus::Error
    }
}

/// Append-only ledger entry for one propagation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopListTransaction {
    pub id: String,
    pub store_id: String,
    #[serde(default)]
    pub transactions: Vec<TransactionData>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl StopListTransaction {
    pub fn has_errors(&self) -> bool {
        self.transactions.iter().any(TransactionData::is_error)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransactionData> {
        self.transactions.iter().filter(|t| t.is_error())
    }
}

/// Time-boxed stop: listed items are unavailable while the schedule is
/// active and inside its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoplistSchedule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub attribute_ids: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
    /// Empty means every day
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl StoplistSchedule {
    /// Whether the listed items should be stopped at the given local time.
    /// Inactive schedules never stop anything.
    pub fn is_stopped_at(&self, local: NaiveDateTime) -> bool {
        if !self.is_active {
            return false;
        }
        let time = local.time();
        let (in_window, day) = if self.start <= self.end {
            (time >= self.start && time < self.end, local.weekday())
        } else if time >= self.start {
            (true, local.weekday())
        } else {
            // after midnight: the window belongs to the previous day
            (time < self.end, local.weekday().pred())
        };
        in_window && (self.weekdays.is_empty() || self.weekdays.contains(&day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        // 2026-10-19 is a Monday
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn breakfast() -> StoplistSchedule {
        StoplistSchedule {
            id: "sch-1".into(),
            name: "breakfast only".into(),
            product_ids: vec!["pancakes".into()],
            attribute_ids: vec![],
            is_active: true,
            weekdays: vec![],
            start: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_schedule_window() {
        let schedule = breakfast();
        assert!(!schedule.is_stopped_at(at(19, 9, 0)));
        assert!(schedule.is_stopped_at(at(19, 11, 0)));
        assert!(!schedule.is_stopped_at(at(19, 23, 0)));
    }

    #[test]
    fn test_inactive_schedule_never_stops() {
        let schedule = StoplistSchedule {
            is_active: false,
            ..breakfast()
        };
        assert!(!schedule.is_stopped_at(at(19, 12, 0)));
    }

    #[test]
    fn test_schedule_weekdays_and_midnight_wrap() {
        let schedule = StoplistSchedule {
            weekdays: vec![Weekday::Mon],
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            ..breakfast()
        };
        assert!(schedule.is_stopped_at(at(19, 23, 0)));
        // Tuesday 01:00 still belongs to Monday's window
        assert!(schedule.is_stopped_at(at(20, 1, 0)));
        assert!(!schedule.is_stopped_at(at(20, 23, 0)));
    }

    #[test]
    fn test_transaction_has_errors() {
        let ok = TransactionData {
            delivery: DeliveryService::Wolt,
            external_store_id: "w1".into(),
            menu_id: "m1".into(),
            status: TransactionStatus::Success,
            message: String::new(),
            products: vec![],
            attributes: vec![],
            created_at: 0,
        };
        let failed = TransactionData {
            status: TransactionStatus::Error,
            message: "502".into(),
            ..ok.clone()
        };
        let mut tx = StopListTransaction {
            id: "t1".into(),
            store_id: "s1".into(),
            transactions: vec![ok],
            created_at: 0,
            updated_at: 0,
        };
        assert!(!tx.has_errors());
        tx.transactions.push(failed);
        assert!(tx.has_errors());
        assert_eq!(tx.failures().count(), 1);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Error).unwrap(),
            "\"ERROR\""
        );
    }
}
