//! 延迟提交扫描
//!
//! 周期性扫描 `WAIT_SENDING` 且 `send_at` 已到期的订单（预订单与延迟提交），
//! 按门店忙碌窗口决定立即提交还是顺延。

use shared::models::Store;
use shared::order::{Order, OrderStatus};
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::pipeline::OrderPipeline;
use crate::db::{OrderRepository, RepoResult, StoreRepository};
use crate::utils::time::{local_datetime, minutes_to_millis, parse_tz};

/// Outcome counts of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub submitted: usize,
    pub postponed: usize,
    pub failed: usize,
}

enum Handled {
    Submitted,
    Postponed,
    Failed,
}

pub struct PreorderSweep {
    pipeline: Arc<OrderPipeline>,
    orders: Arc<dyn OrderRepository>,
    stores: Arc<dyn StoreRepository>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl PreorderSweep {
    pub fn new(
        pipeline: Arc<OrderPipeline>,
        orders: Arc<dyn OrderRepository>,
        stores: Arc<dyn StoreRepository>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            orders,
            stores,
            interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Preorder sweep started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    let stats = self.tick(now_millis()).await;
                    if stats != SweepStats::default() {
                        tracing::info!(?stats, "Preorder sweep finished");
                    }
                }
            }
        }
        tracing::info!("Preorder sweep stopped");
    }

    /// Orders are handled one by one so busy-window counts see earlier submissions
    pub async fn tick(&self, now: i64) -> SweepStats {
        let mut stats = SweepStats::default();
        let held = match self.orders.list_by_status(OrderStatus::WaitSending).await {
            Ok(held) => held,
            Err(e) => {
                tracing::error!(error = %e, "Preorder sweep failed to list held orders");
                return stats;
            }
        };

        for order in held
            .into_iter()
            .filter(|o| o.send_at.is_none_or(|at| at <= now))
        {
            match self.handle(order, now).await {
                Handled::Submitted => stats.submitted += 1,
                Handled::Postponed => stats.postponed += 1,
                Handled::Failed => stats.failed += 1,
            }
        }
        stats
    }

    async fn handle(&self, mut order: Order, now: i64) -> Handled {
        let store = match self.stores.get(&order.store_id).await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!(order_id = %order.order_id, error = %e, "Held order has no store");
                return Handled::Failed;
            }
        };

        match self.busy_delay(&store, now).await {
            Ok(Some(delay)) => {
                order.send_at = Some(now.saturating_add(minutes_to_millis(delay)));
                if let Err(e) = self.orders.update(&order).await {
                    tracing::error!(order_id = %order.order_id, error = %e, "Failed to postpone order");
                    return Handled::Failed;
                }
                tracing::info!(
                    order_id = %order.order_id,
                    store_id = %store.id,
                    minutes = delay,
                    "Store busy, submission postponed"
                );
                return Handled::Postponed;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(store_id = %store.id, error = %e, "Busy check failed, submitting anyway");
            }
        }

        let order_id = order.order_id.clone();
        match self.pipeline.resume(order).await {
            Ok(_) => Handled::Submitted,
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "Held order submission failed");
                Handled::Failed
            }
        }
    }

    /// Delay of the first saturated busy window covering the store's local time
    async fn busy_delay(&self, store: &Store, now: i64) -> RepoResult<Option<i64>> {
        let windows = &store.settings.busy_windows;
        if windows.is_empty() {
            return Ok(None);
        }
        let local = local_datetime(now, parse_tz(&store.settings.timezone)).time();
        let Some(window) = windows.iter().find(|w| w.contains(local)) else {
            return Ok(None);
        };
        let active = self.orders.count_active(&store.id).await?;
        Ok((active >= window.max_active_orders).then_some(window.delay_minutes))
    }
}
