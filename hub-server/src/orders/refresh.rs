//! POS 状态轮询
//!
//! 周期性拉取所有在途订单的 POS 状态，经 [`OrderStatusService`] 落库。
//! 每个订单一个任务，全部完成后进入下一周期。

use shared::order::OrderStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::status::{OrderStatusService, StatusUpdate};
use crate::db::OrderRepository;

const IN_FLIGHT: [OrderStatus; 6] = [
    OrderStatus::Pending,
    OrderStatus::Accepted,
    OrderStatus::CookingStarted,
    OrderStatus::CookingComplete,
    OrderStatus::ReadyForPickup,
    OrderStatus::OutForDelivery,
];

pub struct StatusRefresher {
    status: Arc<OrderStatusService>,
    orders: Arc<dyn OrderRepository>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl StatusRefresher {
    pub fn new(
        status: Arc<OrderStatusService>,
        orders: Arc<dyn OrderRepository>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            status,
            orders,
            interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Status refresher started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
            }
        }
        tracing::info!("Status refresher stopped");
    }

    /// Returns how many orders changed status
    pub async fn tick(&self) -> usize {
        let mut set = JoinSet::new();
        for status in IN_FLIGHT {
            let orders = match self.orders.list_by_status(status).await {
                Ok(orders) => orders,
                Err(e) => {
                    tracing::error!(status = %status, error = %e, "Status refresher failed to list orders");
                    continue;
                }
            };
            for order in orders.into_iter().filter(|o| o.pos_order_id.is_some()) {
                let service = self.status.clone();
                set.spawn(async move {
                    let order_id = order.order_id.clone();
                    (order_id, service.refresh(order).await)
                });
            }
        }

        let mut changed = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(StatusUpdate::Updated(_)))) => changed += 1,
                Ok((_, Ok(_))) => {}
                Ok((order_id, Err(e))) => {
                    tracing::warn!(order_id = %order_id, error = %e, "Status refresh failed");
                }
                Err(e) => tracing::error!(error = %e, "Status refresh task panicked"),
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorRegistry;
    use crate::db::{HubStorage, StoreRepository};
    use crate::pos::PosRegistry;
    use crate::testing::{FakeAggregator, FakePos};
    use shared::models::{DeliveryService, PosType, Store};
    use shared::order::Order;

    #[tokio::test]
    async fn test_tick_applies_pos_status() {
        let storage = Arc::new(HubStorage::open_in_memory().unwrap());
        let store = Store {
            id: "s1".into(),
            pos_type: Some(PosType::Iiko),
            ..Default::default()
        };
        StoreRepository::update(storage.as_ref(), &store).await.unwrap();

        let mut aggregators = AggregatorRegistry::new();
        aggregators.register(Arc::new(FakeAggregator::new(DeliveryService::Glovo)));
        let pos = Arc::new(FakePos::accepting(PosType::Iiko, "pos-1"));
        pos.set_status("pos-1", "CookingStarted");
        pos.set_status("pos-2", "Unconfirmed");
        let mut registry = PosRegistry::new();
        registry.register(pos.clone());

        for (order_id, pos_id, status) in [
            ("o1", Some("pos-1"), OrderStatus::Pending),
            ("o2", Some("pos-2"), OrderStatus::Accepted),
            ("o3", None, OrderStatus::Pending),
            ("o4", Some("pos-4"), OrderStatus::Closed),
        ] {
            let mut order = Order::new(DeliveryService::Glovo, order_id);
            order.store_id = "s1".into();
            order.pos_order_id = pos_id.map(String::from);
            order.set_status(status, 0);
            OrderRepository::insert(storage.as_ref(), &order).await.unwrap();
        }

        let service = Arc::new(OrderStatusService::new(
            storage.clone(),
            storage.clone(),
            aggregators,
            registry,
        ));
        let refresher = StatusRefresher::new(
            service,
            storage.clone(),
            Duration::from_secs(30),
            CancellationToken::new(),
        );
        assert_eq!(refresher.tick().await, 1);

        let o1 = OrderRepository::find_by_order_id(storage.as_ref(), DeliveryService::Glovo, "o1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(o1.status, OrderStatus::CookingStarted);
    }
}
