//! 停售传播引擎
//!
//! 以 POS 菜单的 `stop_lists` 为准，计算每个启用中的聚合平台菜单的可售差异，
//! 持久化菜单，按外部门店 id 推送，并把每次推送的结果写入台账。
//!
//! # 触发方式
//!
//! | 入口 | 说明 |
//! |------|------|
//! | [`StoplistEngine::propagate`] | 全量传播 |
//! | [`StoplistEngine::apply_schedules`] | 定时停售 |
//! | [`StoplistEngine::update_product`] | 单个商品, 指定平台, `modify_product` 推送 |
//! | [`StoplistEngine::update_attributes`] | 加料停售 (可带价格) |
//! | [`StoplistEngine::stop_pos_items`] | POS 拒单反馈 |
//! | [`StoplistEngine::refresh_from_pos`] | 从 POS 拉取菜单后传播 |
//!
//! 部分失败是常态：单个平台/外部门店的失败只记录，不中断其余目标。

use chrono::{DateTime, Utc};
use futures::future::join_all;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    ChangedItem, DeliveryService, Menu, StopListTransaction, Store, StoreDsMenu, TransactionData,
    TransactionStatus,
};
use shared::util::{new_id, now_millis};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

use super::report::report_notification;
use super::resolve::{ItemKinds, MenuDelta, PushMode, Scope, StatusMap, apply_to_menu};
use crate::aggregator::{AggregatorClient, AggregatorRegistry, AggregatorResult};
use crate::db::{MenuRepository, RepoError, RepoResult, StopListRepository, StoreRepository};
use crate::notify::Notifier;
use crate::pos::{PosError, PosRegistry};
use crate::utils::time::parse_tz;

#[derive(Debug, Error)]
pub enum StoplistError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Pos(#[from] PosError),

    #[error("Store {0} has no POS menu")]
    NoPosMenu(String),
}

impl From<StoplistError> for AppError {
    fn from(err: StoplistError) -> Self {
        match err {
            StoplistError::Repo(e) => e.into(),
            StoplistError::Pos(e) => e.into(),
            StoplistError::NoPosMenu(store) => AppError::with_message(
                ErrorCode::MenuNotFound,
                format!("Store {store} has no POS menu"),
            ),
        }
    }
}

pub type StoplistResult<T> = Result<T, StoplistError>;

/// Attribute stoplist entry
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct AttributeUpdate {
    pub id: String,
    pub available: bool,
    #[serde(default)]
    pub price: Option<f64>,
}

pub struct StoplistEngine {
    stores: Arc<dyn StoreRepository>,
    menus: Arc<dyn MenuRepository>,
    ledger: Arc<dyn StopListRepository>,
    aggregators: AggregatorRegistry,
    pos: PosRegistry,
    notifier: Arc<dyn Notifier>,
    /// Report queue when the store has no override
    default_queue: String,
}

impl StoplistEngine {
    pub fn new(
        stores: Arc<dyn StoreRepository>,
        menus: Arc<dyn MenuRepository>,
        ledger: Arc<dyn StopListRepository>,
        aggregators: AggregatorRegistry,
        pos: PosRegistry,
        notifier: Arc<dyn Notifier>,
        default_queue: impl Into<String>,
    ) -> Self {
        Self {
            stores,
            menus,
            ledger,
            aggregators,
            pos,
            notifier,
            default_queue: default_queue.into(),
        }
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    pub async fn propagate(&self, store_id: &str, scope: Scope) -> StoplistResult<StopListTransaction> {
        let store = self.stores.get(store_id).await?;
        self.propagate_store(&store, &scope).await
    }

    /// Single product with explicit availability, optionally restricted to
    /// some of the store's integrations.
    pub async fn update_product(
        &self,
        store_id: &str,
        product_id: &str,
        available: bool,
        deliveries: Option<Vec<DeliveryService>>,
    ) -> StoplistResult<StopListTransaction> {
        let store = self.stores.get(store_id).await?;
        let ids = [product_id.to_string()];
        if available {
            self.write_pos_stop(&store, &[], &ids).await?;
        } else {
            self.write_pos_stop(&store, &ids, &[]).await?;
        }

        let scope = Scope {
            deliveries,
            kinds: ItemKinds::Products,
            push: PushMode::PerProduct,
            ..Scope::only(ids)
        };
        self.propagate_store(&store, &scope).await
    }

    /// Attribute-only stoplist; prices are written when given
    pub async fn update_attributes(
        &self,
        store_id: &str,
        items: &[AttributeUpdate],
    ) -> StoplistResult<StopListTransaction> {
        let store = self.stores.get(store_id).await?;
        let (available, stopped): (Vec<_>, Vec<_>) = items.iter().partition(|i| i.available);
        let stop: Vec<String> = stopped.iter().map(|i| i.id.clone()).collect();
        let release: Vec<String> = available.iter().map(|i| i.id.clone()).collect();
        self.write_pos_stop(&store, &stop, &release).await?;

        let scope = Scope {
            kinds: ItemKinds::Attributes,
            prices: items
                .iter()
                .filter_map(|i| i.price.map(|p| (i.id.clone(), p)))
                .collect(),
            ..Scope::only(items.iter().map(|i| i.id.clone()))
        };
        self.propagate_store(&store, &scope).await
    }

    /// Put items named by a POS rejection on stop
    pub async fn stop_pos_items(
        &self,
        store: &Store,
        ids: &[String],
    ) -> StoplistResult<StopListTransaction> {
        self.write_pos_stop(store, ids, &[]).await?;
        self.propagate_store(store, &Scope::only(ids.iter().cloned()))
            .await
    }

    /// Pull the POS menu, store it as ground truth, then propagate
    pub async fn refresh_from_pos(&self, store_id: &str) -> StoplistResult<StopListTransaction> {
        let store = self.stores.get(store_id).await?;
        if store.pos_menu_id.is_empty() {
            return Err(StoplistError::NoPosMenu(store.id.clone()));
        }
        let client = self.pos.for_store(&store)?;
        let mut menu = client.get_menu(&store).await?;
        menu.id = store.pos_menu_id.clone();
        menu.updated_at = now_millis();
        self.menus.update(&menu).await?;
        tracing::info!(
            store_id = %store.id,
            stopped = menu.stop_lists.len(),
            "POS menu refreshed"
        );
        self.propagate_store(&store, &Scope::all()).await
    }

    /// Evaluate the store's schedules at `now` and propagate what they change.
    ///
    /// Returns None when the POS stop set already matches the schedules.
    pub async fn apply_schedules(
        &self,
        store: &Store,
        now: DateTime<Utc>,
    ) -> StoplistResult<Option<StopListTransaction>> {
        let active: Vec<_> = store
            .stoplist_schedules
            .iter()
            .filter(|s| s.is_active)
            .collect();
        if active.is_empty() {
            return Ok(None);
        }

        let local = now
            .with_timezone(&parse_tz(&store.settings.timezone))
            .naive_local();
        let mut stop = BTreeSet::new();
        let mut release = BTreeSet::new();
        for schedule in active {
            let ids = schedule.product_ids.iter().chain(&schedule.attribute_ids);
            if schedule.is_stopped_at(local) {
                stop.extend(ids.cloned());
            } else {
                release.extend(ids.cloned());
            }
        }
        release.retain(|id| !stop.contains(id));

        let pos_menu = self.pos_menu(store).await?;
        let to_stop: Vec<String> = stop
            .into_iter()
            .filter(|id| !pos_menu.stop_lists.contains(id))
            .collect();
        let to_release: Vec<String> = release
            .into_iter()
            .filter(|id| pos_menu.stop_lists.contains(id))
            .collect();
        if to_stop.is_empty() && to_release.is_empty() {
            return Ok(None);
        }

        tracing::info!(
            store_id = %store.id,
            stop = to_stop.len(),
            release = to_release.len(),
            "Applying stoplist schedules"
        );
        self.write_pos_stop(store, &to_stop, &to_release).await?;
        let scope = Scope::only(to_stop.into_iter().chain(to_release));
        self.propagate_store(store, &scope).await.map(Some)
    }

    pub async fn transactions(&self, store_id: &str) -> StoplistResult<Vec<StopListTransaction>> {
        Ok(self.ledger.list_by_store(store_id).await?)
    }

    // ========================================================================
    // Core
    // ========================================================================

    /// Propagate the POS stop set of `store` into every affected aggregator
    /// menu, then persist the ledger and send the failure report.
    pub async fn propagate_store(
        &self,
        store: &Store,
        scope: &Scope,
    ) -> StoplistResult<StopListTransaction> {
        let mut transactions = Vec::new();
        let mut report_menu = Menu::default();

        if let Some(virtual_store) = &store.virtual_store {
            for restaurant in &virtual_store.restaurants {
                let physical = self.stores.get(&restaurant.store_id).await?;
                let pos_menu = self.pos_menu(&physical).await?;
                transactions.extend(
                    self.sync_menus(store, &pos_menu, scope, Some(&restaurant.restaurant_id))
                        .await,
                );
                merge_menu(&mut report_menu, pos_menu);
            }
        } else {
            let pos_menu = self.pos_menu(store).await?;
            transactions.extend(self.sync_menus(store, &pos_menu, scope, None).await);
            for parent in self.virtual_parents(&store.id).await? {
                let restaurant = parent
                    .virtual_store
                    .as_ref()
                    .and_then(|v| v.restaurant_for(&store.id))
                    .unwrap_or_default();
                transactions.extend(
                    self.sync_menus(&parent, &pos_menu, scope, Some(restaurant))
                        .await,
                );
            }
            report_menu = pos_menu;
        }

        Ok(self.finish(store, transactions, &report_menu).await)
    }

    async fn pos_menu(&self, store: &Store) -> StoplistResult<Menu> {
        if store.pos_menu_id.is_empty() {
            return Err(StoplistError::NoPosMenu(store.id.clone()));
        }
        Ok(self.menus.get(&store.pos_menu_id).await?)
    }

    async fn write_pos_stop(
        &self,
        store: &Store,
        stop: &[String],
        release: &[String],
    ) -> StoplistResult<()> {
        if store.pos_menu_id.is_empty() {
            return Err(StoplistError::NoPosMenu(store.id.clone()));
        }
        self.menus
            .set_pos_stop_lists(&store.pos_menu_id, stop, release)
            .await?;
        Ok(())
    }

    /// Virtual stores that contain `store_id` as one of their restaurants
    async fn virtual_parents(&self, store_id: &str) -> StoplistResult<Vec<Store>> {
        Ok(self
            .stores
            .list()
            .await?
            .into_iter()
            .filter(|s| {
                s.virtual_store
                    .as_ref()
                    .is_some_and(|v| v.restaurant_for(store_id).is_some())
            })
            .collect())
    }

    /// Aggregator menus of `owner` are processed one after another; the
    /// external store ids of one menu are pushed concurrently.
    async fn sync_menus(
        &self,
        owner: &Store,
        pos_menu: &Menu,
        scope: &Scope,
        restaurant: Option<&str>,
    ) -> Vec<TransactionData> {
        let status = StatusMap::from_pos_menu(pos_menu);
        let targets: Vec<&StoreDsMenu> = owner
            .active_menus()
            .filter(|m| scope.includes(m.delivery))
            .collect();
        let ids: Vec<String> = targets.iter().map(|m| m.menu_id.clone()).collect();

        let menus = match self.menus.list_by_ids(&ids).await {
            Ok(menus) => menus,
            Err(e) => {
                tracing::error!(store_id = %owner.id, error = %e, "Failed to load aggregator menus");
                return targets
                    .iter()
                    .map(|m| failed(m, "", format!("menu load failed: {e}")))
                    .collect();
            }
        };

        let mut out = Vec::new();
        for target in targets {
            let Some(mut menu) = menus.iter().find(|m| m.id == target.menu_id).cloned() else {
                tracing::warn!(
                    store_id = %owner.id,
                    delivery = %target.delivery,
                    menu_id = %target.menu_id,
                    "Aggregator menu missing, skipped"
                );
                continue;
            };

            let delta = apply_to_menu(&mut menu, &status, &pos_menu.stop_lists, scope, restaurant);
            if delta.is_empty() {
                tracing::debug!(store_id = %owner.id, delivery = %target.delivery, "Menu unchanged");
                continue;
            }

            if let Err(e) = self.persist_delta(&menu.id, &delta).await {
                tracing::error!(
                    store_id = %owner.id,
                    menu_id = %menu.id,
                    error = %e,
                    "Failed to persist aggregator menu"
                );
                out.push(failed(target, "", format!("menu persist failed: {e}")));
                continue;
            }

            let client = match self.aggregators.get(target.delivery) {
                Ok(client) => client,
                Err(e) => {
                    out.push(failed(target, "", e.to_string()));
                    continue;
                }
            };

            let calls = owner
                .external_store_ids(target.delivery)
                .iter()
                .map(|external_id| {
                    push_delta(client.as_ref(), &owner.id, target, external_id, &delta, scope.push)
                });
            for batch in join_all(calls).await {
                out.extend(batch);
            }
        }
        out
    }

    /// Write only the changed availability and price fields, each in its
    /// own storage transaction, so concurrent menu writers are not
    /// overwritten by this run's stale copy.
    async fn persist_delta(&self, menu_id: &str, delta: &MenuDelta) -> RepoResult<()> {
        for item in &delta.products {
            let found = self
                .menus
                .set_product_availability(menu_id, &item.ext_id, item.is_available)
                .await?;
            if !found {
                tracing::warn!(menu_id, ext_id = %item.ext_id, "Product vanished before persist");
            }
        }
        for item in &delta.attributes {
            let found = self
                .menus
                .set_attribute_availability(menu_id, &item.ext_id, item.is_available, item.price)
                .await?;
            if !found {
                tracing::warn!(menu_id, ext_id = %item.ext_id, "Attribute vanished before persist");
            }
        }
        Ok(())
    }

    /// Ledger write and failure report run side by side; both are awaited
    /// and neither failure reaches the caller.
    async fn finish(
        &self,
        store: &Store,
        transactions: Vec<TransactionData>,
        pos_menu: &Menu,
    ) -> StopListTransaction {
        let now = now_millis();
        let transaction = StopListTransaction {
            id: new_id(),
            store_id: store.id.clone(),
            transactions,
            created_at: now,
            updated_at: now,
        };
        if transaction.transactions.is_empty() {
            return transaction;
        }

        let persist = async {
            if let Err(e) = self.ledger.append(&transaction).await {
                tracing::error!(store_id = %store.id, error = %e, "Failed to persist stoplist ledger");
            }
        };
        let report = async {
            if !transaction.has_errors() {
                return;
            }
            let notification =
                report_notification(store, &transaction, pos_menu, &self.default_queue);
            if let Err(e) = self.notifier.send_message_to_queue(notification).await {
                tracing::warn!(store_id = %store.id, error = %e, "Failed to send stoplist report");
            }
        };
        tokio::join!(persist, report);

        tracing::info!(
            store_id = %store.id,
            pushes = transaction.transactions.len(),
            failed = transaction.failures().count(),
            "Stoplist run finished"
        );
        transaction
    }
}

// ============================================================================
// Push helpers
// ============================================================================

async fn push_delta(
    client: &dyn AggregatorClient,
    store_id: &str,
    target: &StoreDsMenu,
    external_id: &str,
    delta: &MenuDelta,
    mode: PushMode,
) -> Vec<TransactionData> {
    let mut out = Vec::new();

    if !delta.products.is_empty() {
        match mode {
            PushMode::Bulk => {
                let result = client.bulk_update(external_id, &delta.products).await;
                out.push(record(store_id, target, external_id, result, &delta.products, &[]));
            }
            PushMode::PerProduct => {
                for product in &delta.products {
                    let result = client.modify_product(external_id, product).await;
                    out.push(record(
                        store_id,
                        target,
                        external_id,
                        result,
                        std::slice::from_ref(product),
                        &[],
                    ));
                }
            }
        }
    }

    if !delta.attributes.is_empty() {
        let result = client.bulk_attribute(external_id, &delta.attributes).await;
        out.push(record(store_id, target, external_id, result, &[], &delta.attributes));
    }
    out
}

fn record(
    store_id: &str,
    target: &StoreDsMenu,
    external_id: &str,
    result: AggregatorResult<()>,
    products: &[ChangedItem],
    attributes: &[ChangedItem],
) -> TransactionData {
    let (status, message) = match result {
        Ok(()) => (TransactionStatus::Success, String::new()),
        Err(e) => {
            tracing::warn!(
                store_id = %store_id,
                delivery = %target.delivery,
                external_store_id = %external_id,
                error = %e,
                "Aggregator availability push failed"
            );
            (TransactionStatus::Error, e.to_string())
        }
    };
    TransactionData {
        delivery: target.delivery,
        external_store_id: external_id.to_string(),
        menu_id: target.menu_id.clone(),
        status,
        message,
        products: products.to_vec(),
        attributes: attributes.to_vec(),
        created_at: now_millis(),
    }
}

fn failed(target: &StoreDsMenu, external_id: &str, message: String) -> TransactionData {
    TransactionData {
        delivery: target.delivery,
        external_store_id: external_id.to_string(),
        menu_id: target.menu_id.clone(),
        status: TransactionStatus::Error,
        message,
        products: Vec::new(),
        attributes: Vec::new(),
        created_at: now_millis(),
    }
}

fn merge_menu(into: &mut Menu, from: Menu) {
    into.products.extend(from.products);
    into.attributes.extend(from.attributes);
    into.stop_lists.extend(from.stop_lists);
}
