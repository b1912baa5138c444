//! redb-based document storage
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `menus` | `menu_id` | `Menu` | POS and aggregator menus |
//! | `stores` | `store_id` | `Store` | Store configuration |
//! | `store_external_ids` | `"<delivery>:<external_id>"` | `store_id` | Webhook routing index |
//! | `orders` | `id` | `Order` | Canonical orders |
//! | `order_keys` | `"<delivery>:<order_id>"` | `id` | Idempotent insert guard |
//! | `stoplist_transactions` | `(store_id, sequence)` | `StopListTransaction` | Ledger (append-only) |
//! | `sequence_counter` | name | `u64` | Counters |
//!
//! Values are JSON. Every mutation is a single write transaction, so
//! field-scoped updates never race with full-document overwrites.

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::{DeliveryService, Menu, StopListTransaction, Store};
use shared::order::{Order, OrderStatus, dedup_key};
use shared::util::{new_id, now_millis};
use std::path::Path;
use std::sync::Arc;

use super::repository::{
    MenuRepository, OrderRepository, RepoError, RepoResult, StopListRepository, StoreRepository,
};

const MENUS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("menus");

const STORES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("stores");

const STORE_EXTERNAL_IDS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("store_external_ids");

const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

const ORDER_KEYS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("order_keys");

const STOPLIST_TABLE: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("stoplist_transactions");

const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const STOPLIST_SEQUENCE_KEY: &str = "stoplist_seq";

/// Document storage backed by redb
#[derive(Clone)]
pub struct HubStorage {
    db: Arc<Database>,
}

impl HubStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> RepoResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> RepoResult<Self> {
        let write_txn = db.begin_write()?;
        {
            // Create all tables if they don't exist
            let _ = write_txn.open_table(MENUS_TABLE)?;
            let _ = write_txn.open_table(STORES_TABLE)?;
            let _ = write_txn.open_table(STORE_EXTERNAL_IDS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_KEYS_TABLE)?;
            let _ = write_txn.open_table(STOPLIST_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(STOPLIST_SEQUENCE_KEY)?.is_none() {
                seq_table.insert(STOPLIST_SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Generic document helpers ==========

    fn read_doc<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> RepoResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn write_doc<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        doc: &T,
    ) -> RepoResult<()> {
        let value = serde_json::to_vec(doc)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.insert(key, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn all_docs<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> RepoResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let mut docs = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            docs.push(serde_json::from_slice(value.value())?);
        }
        Ok(docs)
    }

    /// Read-modify-write of one menu inside a single write transaction
    fn modify_menu<R>(
        &self,
        menu_id: &str,
        f: impl FnOnce(&mut Menu) -> R,
    ) -> RepoResult<R> {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(MENUS_TABLE)?;
            let raw = table
                .get(menu_id)?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| RepoError::NotFound(format!("Menu {menu_id}")))?;
            let mut menu: Menu = serde_json::from_slice(&raw)?;
            let result = f(&mut menu);
            menu.updated_at = now_millis();
            let value = serde_json::to_vec(&menu)?;
            table.insert(menu_id, value.as_slice())?;
            result
        };
        write_txn.commit()?;
        Ok(result)
    }
}

fn external_key(delivery: DeliveryService, external_store_id: &str) -> String {
    format!("{}:{}", delivery.as_str(), external_store_id)
}

// ========== Menus ==========

#[async_trait]
impl MenuRepository for HubStorage {
    async fn get(&self, id: &str) -> RepoResult<Menu> {
        self.read_doc(MENUS_TABLE, id)?
            .ok_or_else(|| RepoError::NotFound(format!("Menu {id}")))
    }

    async fn list_by_ids(&self, ids: &[String]) -> RepoResult<Vec<Menu>> {
        let mut menus = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(menu) = self.read_doc(MENUS_TABLE, id)? {
                menus.push(menu);
            }
        }
        Ok(menus)
    }

    async fn update(&self, menu: &Menu) -> RepoResult<()> {
        self.write_doc(MENUS_TABLE, &menu.id, menu)
    }

    async fn set_product_availability(
        &self,
        menu_id: &str,
        ext_id: &str,
        available: bool,
    ) -> RepoResult<bool> {
        self.modify_menu(menu_id, |menu| {
            let mut found = false;
            for product in menu.products.iter_mut().filter(|p| p.ext_id == ext_id) {
                product.is_available = available;
                found = true;
            }
            if found {
                menu.refresh_stop_lists();
            }
            found
        })
    }

    async fn set_attribute_availability(
        &self,
        menu_id: &str,
        ext_id: &str,
        available: bool,
        price: Option<f64>,
    ) -> RepoResult<bool> {
        self.modify_menu(menu_id, |menu| {
            let mut found = false;
            for attribute in menu.attributes.iter_mut().filter(|a| a.ext_id == ext_id) {
                attribute.is_available = available;
                if let Some(price) = price {
                    attribute.price = price;
                }
                found = true;
            }
            if found {
                menu.refresh_stop_lists();
            }
            found
        })
    }

    async fn set_pos_stop_lists(
        &self,
        menu_id: &str,
        stop: &[String],
        release: &[String],
    ) -> RepoResult<Menu> {
        self.modify_menu(menu_id, |menu| {
            for id in release {
                menu.stop_lists.remove(id);
            }
            menu.stop_lists.extend(stop.iter().cloned());
            menu.clone()
        })
    }
}

// ========== Stores ==========

#[async_trait]
impl StoreRepository for HubStorage {
    async fn get(&self, id: &str) -> RepoResult<Store> {
        self.read_doc(STORES_TABLE, id)?
            .ok_or_else(|| RepoError::NotFound(format!("Store {id}")))
    }

    async fn list(&self) -> RepoResult<Vec<Store>> {
        self.all_docs(STORES_TABLE)
    }

    async fn find_by_external_id(
        &self,
        delivery: DeliveryService,
        external_store_id: &str,
    ) -> RepoResult<Option<Store>> {
        let store_id = {
            let read_txn = self.db.begin_read()?;
            let index = read_txn.open_table(STORE_EXTERNAL_IDS_TABLE)?;
            index
                .get(external_key(delivery, external_store_id).as_str())?
                .map(|guard| guard.value().to_string())
        };
        match store_id {
            Some(id) => self.read_doc(STORES_TABLE, &id),
            None => Ok(None),
        }
    }

    async fn update(&self, store: &Store) -> RepoResult<()> {
        let value = serde_json::to_vec(store)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut stores = write_txn.open_table(STORES_TABLE)?;
            let mut index = write_txn.open_table(STORE_EXTERNAL_IDS_TABLE)?;

            // Drop index entries of the previous version
            let previous = stores
                .get(store.id.as_str())?
                .map(|guard| guard.value().to_vec());
            if let Some(raw) = previous {
                let old: Store = serde_json::from_slice(&raw)?;
                for agg in &old.aggregators {
                    for ext in &agg.external_store_ids {
                        index.remove(external_key(agg.delivery, ext).as_str())?;
                    }
                }
            }

            for agg in &store.aggregators {
                for ext in &agg.external_store_ids {
                    let key = external_key(agg.delivery, ext);
                    let owner = index.get(key.as_str())?.map(|g| g.value().to_string());
                    if let Some(owner) = owner.filter(|o| o != &store.id) {
                        tracing::warn!(
                            store_id = %store.id,
                            previous_owner = %owner,
                            key = %key,
                            "External store id reassigned"
                        );
                    }
                    index.insert(key.as_str(), store.id.as_str())?;
                }
            }

            stores.insert(store.id.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

// ========== Orders ==========

#[async_trait]
impl OrderRepository for HubStorage {
    async fn insert(&self, order: &Order) -> RepoResult<Order> {
        let key = order.dedup_key();
        let mut stored = order.clone();
        if stored.id.is_empty() {
            stored.id = new_id();
        }
        if stored.created_at == 0 {
            stored.created_at = now_millis();
        }
        let value = serde_json::to_vec(&stored)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut keys = write_txn.open_table(ORDER_KEYS_TABLE)?;
            if keys.get(key.as_str())?.is_some() {
                return Err(RepoError::AlreadyExists(format!("Order {key}")));
            }
            keys.insert(key.as_str(), stored.id.as_str())?;

            let mut orders = write_txn.open_table(ORDERS_TABLE)?;
            orders.insert(stored.id.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(stored)
    }

    async fn get(&self, id: &str) -> RepoResult<Order> {
        self.read_doc(ORDERS_TABLE, id)?
            .ok_or_else(|| RepoError::NotFound(format!("Order {id}")))
    }

    async fn find_by_order_id(
        &self,
        delivery: DeliveryService,
        order_id: &str,
    ) -> RepoResult<Option<Order>> {
        let id = {
            let read_txn = self.db.begin_read()?;
            let keys = read_txn.open_table(ORDER_KEYS_TABLE)?;
            keys.get(dedup_key(Some(delivery), order_id).as_str())?
                .map(|guard| guard.value().to_string())
        };
        match id {
            Some(id) => self.read_doc(ORDERS_TABLE, &id),
            None => Ok(None),
        }
    }

    async fn update(&self, order: &Order) -> RepoResult<()> {
        if order.id.is_empty() {
            return Err(RepoError::NotFound("Order without id".to_string()));
        }
        self.write_doc(ORDERS_TABLE, &order.id, order)
    }

    async fn list_by_status(&self, status: OrderStatus) -> RepoResult<Vec<Order>> {
        let orders: Vec<Order> = self.all_docs(ORDERS_TABLE)?;
        Ok(orders.into_iter().filter(|o| o.status == status).collect())
    }

    async fn count_active(&self, store_id: &str) -> RepoResult<usize> {
        let orders: Vec<Order> = self.all_docs(ORDERS_TABLE)?;
        Ok(orders
            .iter()
            .filter(|o| o.store_id == store_id && o.status.is_in_flight())
            .count())
    }
}

// ========== Stoplist ledger ==========

#[async_trait]
impl StopListRepository for HubStorage {
    async fn append(&self, transaction: &StopListTransaction) -> RepoResult<()> {
        let value = serde_json::to_vec(transaction)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            let next = seq_table
                .get(STOPLIST_SEQUENCE_KEY)?
                .map(|guard| guard.value())
                .unwrap_or(0)
                + 1;
            seq_table.insert(STOPLIST_SEQUENCE_KEY, next)?;

            let mut table = write_txn.open_table(STOPLIST_TABLE)?;
            table.insert((transaction.store_id.as_str(), next), value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    async fn list_by_store(&self, store_id: &str) -> RepoResult<Vec<StopListTransaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(STOPLIST_TABLE)?;

        let mut transactions = Vec::new();
        for result in table.range((store_id, 0u64)..=(store_id, u64::MAX))? {
            let (_key, value) = result?;
            transactions.push(serde_json::from_slice(value.value())?);
        }
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{
        AggregatorSettings, Attribute, Product, TransactionData, TransactionStatus,
    };

    fn test_menu() -> Menu {
        Menu {
            id: "menu-1".into(),
            name: "Wolt menu".into(),
            delivery: Some(DeliveryService::Wolt),
            products: vec![Product::new("p1", "Burger"), Product::new("p2", "Fries")],
            attributes: vec![Attribute::new("a1", "Cheese")],
            ..Default::default()
        }
    }

    fn test_store(id: &str, wolt_ids: &[&str]) -> Store {
        Store {
            id: id.into(),
            name: format!("Store {id}"),
            pos_menu_id: "pos-menu".into(),
            aggregators: vec![
                AggregatorSettings::new(DeliveryService::Wolt)
                    .with_external_ids(wolt_ids.iter().copied()),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_menu_roundtrip_and_missing() {
        let storage = HubStorage::open_in_memory().unwrap();
        MenuRepository::update(&storage, &test_menu()).await.unwrap();

        let menu = MenuRepository::get(&storage, "menu-1").await.unwrap();
        assert_eq!(menu.products.len(), 2);

        let err = MenuRepository::get(&storage, "nope").await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));

        let listed = storage
            .list_by_ids(&["menu-1".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_field_scoped_product_update() {
        let storage = HubStorage::open_in_memory().unwrap();
        MenuRepository::update(&storage, &test_menu()).await.unwrap();

        assert!(storage.set_product_availability("menu-1", "p1", false).await.unwrap());
        assert!(!storage.set_product_availability("menu-1", "zz", false).await.unwrap());

        let menu = MenuRepository::get(&storage, "menu-1").await.unwrap();
        assert!(!menu.products[0].is_available);
        assert!(menu.products[1].is_available);
        assert!(menu.stop_lists.contains("p1"));
    }

    #[tokio::test]
    async fn test_field_scoped_update_keeps_other_fields() {
        let storage = HubStorage::open_in_memory().unwrap();
        let mut menu = test_menu();
        menu.products[0].pos_id = Some("pos-p1".into());
        MenuRepository::update(&storage, &menu).await.unwrap();

        // another writer edits the menu after our copy was read
        menu.products[1].name = "Large fries".into();
        MenuRepository::update(&storage, &menu).await.unwrap();

        storage.set_product_availability("menu-1", "p1", false).await.unwrap();
        let stored = MenuRepository::get(&storage, "menu-1").await.unwrap();
        assert_eq!(stored.products[1].name, "Large fries");
        assert_eq!(stored.stop_lists.iter().collect::<Vec<_>>(), ["pos-p1"]);

        storage.set_product_availability("menu-1", "p1", true).await.unwrap();
        let stored = MenuRepository::get(&storage, "menu-1").await.unwrap();
        assert!(stored.stop_lists.is_empty());
    }

    #[tokio::test]
    async fn test_attribute_update_writes_price() {
        let storage = HubStorage::open_in_memory().unwrap();
        MenuRepository::update(&storage, &test_menu()).await.unwrap();

        storage
            .set_attribute_availability("menu-1", "a1", true, Some(2.5))
            .await
            .unwrap();
        let menu = MenuRepository::get(&storage, "menu-1").await.unwrap();
        assert_eq!(menu.attributes[0].price, 2.5);
    }

    #[tokio::test]
    async fn test_pos_stop_lists() {
        let storage = HubStorage::open_in_memory().unwrap();
        MenuRepository::update(&storage, &test_menu()).await.unwrap();

        storage
            .set_pos_stop_lists("menu-1", &["p1".into(), "p2".into()], &[])
            .await
            .unwrap();
        let menu = storage
            .set_pos_stop_lists("menu-1", &[], &["p1".into()])
            .await
            .unwrap();
        assert_eq!(menu.stop_lists.iter().collect::<Vec<_>>(), ["p2"]);
    }

    #[tokio::test]
    async fn test_store_external_id_index() {
        let storage = HubStorage::open_in_memory().unwrap();
        StoreRepository::update(&storage, &test_store("s1", &["w1", "w2"]))
            .await
            .unwrap();

        let found = storage
            .find_by_external_id(DeliveryService::Wolt, "w2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "s1");
        assert!(
            storage
                .find_by_external_id(DeliveryService::Glovo, "w2")
                .await
                .unwrap()
                .is_none()
        );

        // Removing an external id drops it from the index
        StoreRepository::update(&storage, &test_store("s1", &["w1"]))
            .await
            .unwrap();
        assert!(
            storage
                .find_by_external_id(DeliveryService::Wolt, "w2")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(StoreRepository::list(&storage).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_order_insert_is_idempotent() {
        let storage = HubStorage::open_in_memory().unwrap();
        let order = Order::new(DeliveryService::Wolt, "w-1");

        let stored = storage.insert(&order).await.unwrap();
        assert!(!stored.id.is_empty());

        let err = storage.insert(&order).await.unwrap_err();
        assert!(matches!(err, RepoError::AlreadyExists(_)));

        // Same aggregator order id on a different aggregator is a different order
        storage
            .insert(&Order::new(DeliveryService::Glovo, "w-1"))
            .await
            .unwrap();

        let found = storage
            .find_by_order_id(DeliveryService::Wolt, "w-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, stored.id);
    }

    #[tokio::test]
    async fn test_order_status_queries() {
        let storage = HubStorage::open_in_memory().unwrap();
        let mut a = Order::new(DeliveryService::Wolt, "a");
        a.store_id = "s1".into();
        a.status = OrderStatus::Pending;
        let mut b = Order::new(DeliveryService::Wolt, "b");
        b.store_id = "s1".into();
        b.status = OrderStatus::WaitSending;
        storage.insert(&a).await.unwrap();
        let mut b = storage.insert(&b).await.unwrap();

        assert_eq!(storage.count_active("s1").await.unwrap(), 1);
        assert_eq!(
            storage.list_by_status(OrderStatus::WaitSending).await.unwrap().len(),
            1
        );

        b.status = OrderStatus::Accepted;
        OrderRepository::update(&storage, &b).await.unwrap();
        assert_eq!(storage.count_active("s1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stoplist_ledger_is_ordered_per_store() {
        let storage = HubStorage::open_in_memory().unwrap();
        for (i, store) in ["s1", "s2", "s1"].iter().enumerate() {
            let tx = StopListTransaction {
                id: format!("t{i}"),
                store_id: store.to_string(),
                transactions: vec![TransactionData {
                    delivery: DeliveryService::Wolt,
                    external_store_id: "w1".into(),
                    menu_id: "m1".into(),
                    status: TransactionStatus::Success,
                    message: String::new(),
                    products: vec![],
                    attributes: vec![],
                    created_at: 0,
                }],
                created_at: i as i64,
                updated_at: i as i64,
            };
            storage.append(&tx).await.unwrap();
        }

        let ledger = storage.list_by_store("s1").await.unwrap();
        let ids: Vec<_> = ledger.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["t0", "t2"]);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.redb");
        {
            let storage = HubStorage::open(&path).unwrap();
            MenuRepository::update(&storage, &test_menu()).await.unwrap();
        }
        let storage = HubStorage::open(&path).unwrap();
        assert!(MenuRepository::get(&storage, "menu-1").await.is_ok());
    }
}
