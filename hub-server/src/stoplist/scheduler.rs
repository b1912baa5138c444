//! 定时停售调度器
//!
//! 注册为 `TaskKind::Periodic`。每个周期列出带停售计划的门店，
//! 每个门店一个任务并发评估，全部完成后进入下一周期。

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::engine::StoplistEngine;
use crate::db::StoreRepository;

pub struct StoplistScheduler {
    engine: Arc<StoplistEngine>,
    stores: Arc<dyn StoreRepository>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl StoplistScheduler {
    pub fn new(
        engine: Arc<StoplistEngine>,
        stores: Arc<dyn StoreRepository>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            stores,
            interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Stoplist scheduler started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
            }
        }
        tracing::info!("Stoplist scheduler stopped");
    }

    /// One evaluation pass; returns how many stores changed
    pub async fn tick(&self) -> usize {
        let stores = match self.stores.list().await {
            Ok(stores) => stores,
            Err(e) => {
                tracing::error!(error = %e, "Stoplist scheduler failed to list stores");
                return 0;
            }
        };

        let now = Utc::now();
        let mut set = JoinSet::new();
        for store in stores
            .into_iter()
            .filter(|s| s.stoplist_schedules.iter().any(|sc| sc.is_active))
        {
            let engine = self.engine.clone();
            set.spawn(async move {
                let result = engine.apply_schedules(&store, now).await;
                (store.id, result)
            });
        }

        let mut changed = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(Some(_)))) => changed += 1,
                Ok((_, Ok(None))) => {}
                Ok((store_id, Err(e))) => {
                    tracing::error!(store_id = %store_id, error = %e, "Scheduled stoplist failed");
                }
                Err(e) => tracing::error!(error = %e, "Scheduled stoplist task panicked"),
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorRegistry;
    use crate::db::{HubStorage, MenuRepository};
    use crate::pos::PosRegistry;
    use crate::testing::RecordingNotifier;
    use chrono::NaiveTime;
    use shared::models::{Menu, Product, StoplistSchedule, Store};

    #[tokio::test]
    async fn test_tick_only_touches_scheduled_stores() {
        let storage = Arc::new(HubStorage::open_in_memory().unwrap());
        let engine = Arc::new(StoplistEngine::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            AggregatorRegistry::new(),
            PosRegistry::new(),
            Arc::new(RecordingNotifier::default()),
            "q",
        ));

        let always = StoplistSchedule {
            id: "all-day".into(),
            name: String::new(),
            product_ids: vec!["p1".into()],
            attribute_ids: vec![],
            is_active: true,
            weekdays: vec![],
            start: NaiveTime::MIN,
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        };
        let scheduled = Store {
            id: "s1".into(),
            pos_menu_id: "pos-1".into(),
            stoplist_schedules: vec![always],
            ..Default::default()
        };
        let plain = Store {
            id: "s2".into(),
            pos_menu_id: "pos-2".into(),
            ..Default::default()
        };
        for store in [&scheduled, &plain] {
            StoreRepository::update(storage.as_ref(), store).await.unwrap();
        }
        for id in ["pos-1", "pos-2"] {
            let menu = Menu {
                id: id.into(),
                products: vec![Product::new("p1", "Burger")],
                ..Default::default()
            };
            MenuRepository::update(storage.as_ref(), &menu).await.unwrap();
        }

        let scheduler = StoplistScheduler::new(
            engine,
            storage.clone(),
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        assert_eq!(scheduler.tick().await, 1);

        let pos1 = MenuRepository::get(storage.as_ref(), "pos-1").await.unwrap();
        let pos2 = MenuRepository::get(storage.as_ref(), "pos-2").await.unwrap();
        assert!(pos1.stop_lists.contains("p1"));
        assert!(pos2.stop_lists.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let storage = Arc::new(HubStorage::open_in_memory().unwrap());
        let engine = Arc::new(StoplistEngine::new(
            storage.clone(),
            storage.clone(),
            storage.clone(),
            AggregatorRegistry::new(),
            PosRegistry::new(),
            Arc::new(RecordingNotifier::default()),
            "q",
        ));
        let shutdown = CancellationToken::new();
        let scheduler =
            StoplistScheduler::new(engine, storage, Duration::from_secs(3600), shutdown.clone());
        let handle = tokio::spawn(scheduler.run());
        shutdown.cancel();
        assert!(handle.await.is_ok());
    }
}
