//! 订单状态更新
//!
//! POS 状态 → 系统状态映射后落库，然后通知订阅者并回传聚合平台。
//! 重复状态和逆向迁移直接忽略；子订单不回传（聚合平台只认识父订单号）。

use async_trait::async_trait;
use futures::future::join_all;
use shared::models::Store;
use shared::order::{Order, OrderStatus};
use shared::util::now_millis;
use std::sync::Arc;

use super::pipeline::{PipelineError, PipelineResult};
use crate::aggregator::AggregatorRegistry;
use crate::db::{OrderRepository, StoreRepository};
use crate::pos::{PosError, PosRegistry};

/// Observer of persisted status changes
#[async_trait]
pub trait StatusSubscriber: Send + Sync + 'static {
    async fn on_status_changed(&self, order: &Order, status: OrderStatus);
}

/// Result of a status update
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Updated(Order),
    /// Repeat or backwards move; nothing was written
    Ignored(Order),
    /// The POS status has no system counterpart
    Unmapped(String),
}

pub struct OrderStatusService {
    stores: Arc<dyn StoreRepository>,
    orders: Arc<dyn OrderRepository>,
    aggregators: AggregatorRegistry,
    pos: PosRegistry,
    subscribers: Vec<Arc<dyn StatusSubscriber>>,
}

impl OrderStatusService {
    pub fn new(
        stores: Arc<dyn StoreRepository>,
        orders: Arc<dyn OrderRepository>,
        aggregators: AggregatorRegistry,
        pos: PosRegistry,
    ) -> Self {
        Self {
            stores,
            orders,
            aggregators,
            pos,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn StatusSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Apply a raw POS status to the order with storage id `id`
    pub async fn update_order_status(
        &self,
        id: &str,
        pos_status: &str,
    ) -> PipelineResult<StatusUpdate> {
        let order = self.orders.get(id).await?;
        let store = self.stores.get(&order.store_id).await?;
        let pos = self.pos.for_store(&store)?;
        let Some(status) = pos.map_pos_status_to_system_status(pos_status) else {
            tracing::debug!(order_id = %order.order_id, pos_status = %pos_status, "Unmapped POS status");
            return Ok(StatusUpdate::Unmapped(pos_status.to_string()));
        };
        self.apply(&store, order, status).await
    }

    /// Poll the POS for the order's current status and apply it
    pub async fn refresh(&self, order: Order) -> PipelineResult<StatusUpdate> {
        let Some(pos_order_id) = order.pos_order_id.clone() else {
            return Ok(StatusUpdate::Ignored(order));
        };
        let store = self.stores.get(&order.store_id).await?;
        let pos = self.pos.for_store(&store)?;
        let raw = pos.get_order_status(&store, &pos_order_id).await?;
        match pos.map_pos_status_to_system_status(&raw) {
            Some(status) => self.apply(&store, order, status).await,
            None => Ok(StatusUpdate::Unmapped(raw)),
        }
    }

    async fn apply(
        &self,
        store: &Store,
        mut order: Order,
        status: OrderStatus,
    ) -> PipelineResult<StatusUpdate> {
        if !order.status.can_transition_to(status) {
            tracing::debug!(
                order_id = %order.order_id,
                from = %order.status,
                to = %status,
                "Status update ignored"
            );
            return Ok(StatusUpdate::Ignored(order));
        }

        order.set_status(status, now_millis());
        self.orders.update(&order).await?;
        tracing::info!(order_id = %order.order_id, status = %status, "Order status updated");

        self.publish(&order, status).await;
        self.echo(store, &order, status).await;
        Ok(StatusUpdate::Updated(order))
    }

    /// Cancellation requested by the aggregator
    pub async fn cancel_order(&self, id: &str, reason: &str) -> PipelineResult<Order> {
        let mut order = self.orders.get(id).await?;
        if !order
            .status
            .can_transition_to(OrderStatus::CancelledByDeliveryService)
        {
            return Err(PipelineError::InvalidTransition {
                order_id: order.order_id.clone(),
                status: order.status,
            });
        }

        if let Some(pos_order_id) = order.pos_order_id.as_deref() {
            let store = self.stores.get(&order.store_id).await?;
            let pos = self.pos.for_store(&store)?;
            match pos.cancel_order(&store, pos_order_id, reason).await {
                Ok(()) => {}
                Err(e @ PosError::Unsupported { .. }) => {
                    tracing::warn!(order_id = %order.order_id, error = %e, "Cancel it in the POS manually");
                }
                Err(e) => return Err(e.into()),
            }
        }

        order.set_status(OrderStatus::CancelledByDeliveryService, now_millis());
        self.orders.update(&order).await?;
        tracing::info!(order_id = %order.order_id, reason = %reason, "Order cancelled by delivery service");
        self.publish(&order, OrderStatus::CancelledByDeliveryService)
            .await;
        Ok(order)
    }

    async fn publish(&self, order: &Order, status: OrderStatus) {
        join_all(
            self.subscribers
                .iter()
                .map(|s| s.on_status_changed(order, status)),
        )
        .await;
    }

    async fn echo(&self, store: &Store, order: &Order, status: OrderStatus) {
        if order.is_child_order {
            return;
        }
        let Some(delivery) = order.delivery_service else {
            return;
        };
        if store
            .aggregator(delivery)
            .is_some_and(|s| s.suppresses_echo(status))
        {
            tracing::debug!(order_id = %order.order_id, status = %status, "Status echo suppressed");
            return;
        }
        let client = match self.aggregators.get(delivery) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(order_id = %order.order_id, error = %e, "No aggregator for status echo");
                return;
            }
        };
        if let Err(e) = client.update_order_in_aggregator(order, status).await {
            tracing::warn!(
                order_id = %order.order_id,
                status = %status,
                error = %e,
                "Status push to aggregator failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::HubStorage;
    use crate::testing::{FakeAggregator, FakePos, RecordingSubscriber};
    use shared::models::{AggregatorSettings, DeliveryService, PosType};

    struct Harness {
        storage: Arc<HubStorage>,
        aggregator: Arc<FakeAggregator>,
        pos: Arc<FakePos>,
        subscriber: Arc<RecordingSubscriber>,
        service: OrderStatusService,
    }

    async fn harness(settings: AggregatorSettings) -> Harness {
        let storage = Arc::new(HubStorage::open_in_memory().unwrap());
        let store = Store {
            id: "s1".into(),
            pos_type: Some(PosType::Iiko),
            aggregators: vec![settings],
            ..Default::default()
        };
        StoreRepository::update(storage.as_ref(), &store).await.unwrap();

        let aggregator = Arc::new(FakeAggregator::new(DeliveryService::Glovo));
        let mut aggregators = AggregatorRegistry::new();
        aggregators.register(aggregator.clone());
        let pos = Arc::new(FakePos::accepting(PosType::Iiko, "pos-1"));
        let mut registry = PosRegistry::new();
        registry.register(pos.clone());

        let subscriber = Arc::new(RecordingSubscriber::default());
        let mut service =
            OrderStatusService::new(storage.clone(), storage.clone(), aggregators, registry);
        service.subscribe(subscriber.clone());
        Harness {
            storage,
            aggregator,
            pos,
            subscriber,
            service,
        }
    }

    async fn pending_order(storage: &HubStorage) -> Order {
        let mut order = Order::new(DeliveryService::Glovo, "o1");
        order.store_id = "s1".into();
        order.pos_order_id = Some("pos-1".into());
        order.set_status(OrderStatus::Pending, 1);
        OrderRepository::insert(storage, &order).await.unwrap()
    }

    #[tokio::test]
    async fn test_update_persists_notifies_and_echoes() {
        let h = harness(AggregatorSettings::new(DeliveryService::Glovo)).await;
        let order = pending_order(&h.storage).await;

        let update = h.service.update_order_status(&order.id, "CookingStarted").await.unwrap();
        assert!(matches!(update, StatusUpdate::Updated(ref o) if o.status == OrderStatus::CookingStarted));

        let stored = OrderRepository::get(h.storage.as_ref(), &order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::CookingStarted);
        assert_eq!(
            h.subscriber.seen(),
            vec![("o1".to_string(), OrderStatus::CookingStarted)]
        );
        assert_eq!(
            h.aggregator.status_pushes(),
            vec![("o1".to_string(), OrderStatus::CookingStarted)]
        );
    }

    #[tokio::test]
    async fn test_repeat_and_backwards_are_ignored() {
        let h = harness(AggregatorSettings::new(DeliveryService::Glovo)).await;
        let order = pending_order(&h.storage).await;

        h.service.update_order_status(&order.id, "CookingStarted").await.unwrap();
        let repeat = h.service.update_order_status(&order.id, "CookingStarted").await.unwrap();
        assert!(matches!(repeat, StatusUpdate::Ignored(_)));
        let backwards = h.service.update_order_status(&order.id, "Unconfirmed").await.unwrap();
        assert!(matches!(backwards, StatusUpdate::Ignored(_)));

        assert_eq!(h.subscriber.seen().len(), 1);
        assert_eq!(h.aggregator.status_pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_echo_suppression() {
        let mut settings = AggregatorSettings::new(DeliveryService::Glovo);
        settings.suppressed_status_echo = vec![OrderStatus::CookingStarted];
        let h = harness(settings).await;
        let order = pending_order(&h.storage).await;

        h.service.update_order_status(&order.id, "CookingStarted").await.unwrap();
        assert_eq!(h.subscriber.seen().len(), 1);
        assert!(h.aggregator.status_pushes().is_empty());

        h.service.update_order_status(&order.id, "CookingCompleted").await.unwrap();
        assert_eq!(h.aggregator.status_pushes().len(), 1);
    }

    #[tokio::test]
    async fn test_unmapped_status() {
        let h = harness(AggregatorSettings::new(DeliveryService::Glovo)).await;
        let order = pending_order(&h.storage).await;
        let update = h.service.update_order_status(&order.id, "Teleported").await.unwrap();
        assert_eq!(update, StatusUpdate::Unmapped("Teleported".into()));
    }

    #[tokio::test]
    async fn test_refresh_polls_pos() {
        let h = harness(AggregatorSettings::new(DeliveryService::Glovo)).await;
        let order = pending_order(&h.storage).await;
        h.pos.set_status("pos-1", "Delivered");

        let update = h.service.refresh(order).await.unwrap();
        assert!(matches!(update, StatusUpdate::Updated(ref o) if o.status == OrderStatus::Closed));
    }

    #[tokio::test]
    async fn test_cancel() {
        let h = harness(AggregatorSettings::new(DeliveryService::Glovo)).await;
        let order = pending_order(&h.storage).await;

        let cancelled = h.service.cancel_order(&order.id, "customer changed mind").await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::CancelledByDeliveryService);
        assert_eq!(h.pos.cancelled(), vec!["pos-1".to_string()]);

        let again = h.service.cancel_order(&order.id, "twice").await.unwrap_err();
        assert!(matches!(again, PipelineError::InvalidTransition { .. }));
    }
}
