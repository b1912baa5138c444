//! Repository contracts
//!
//! The engine and the pipeline only see these traits. [`super::HubStorage`]
//! implements all of them on redb; tests may substitute their own.

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use shared::models::{DeliveryService, Menu, StopListTransaction, Store};
use shared::order::{Order, OrderStatus};
use thiserror::Error;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

macro_rules! impl_storage_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for RepoError {
                fn from(err: $err) -> Self {
                    RepoError::Storage(err.to_string())
                }
            }
        )*
    };
}

impl_storage_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => AppError::not_found(what),
            RepoError::AlreadyExists(what) => AppError::already_exists(what),
            RepoError::Storage(msg) => AppError::database(msg),
            RepoError::Serialization(e) => {
                AppError::with_message(ErrorCode::StorageCorrupted, e.to_string())
            }
        }
    }
}

/// Menu documents (POS and aggregator)
#[async_trait]
pub trait MenuRepository: Send + Sync + 'static {
    async fn get(&self, id: &str) -> RepoResult<Menu>;

    /// Missing ids are skipped
    async fn list_by_ids(&self, ids: &[String]) -> RepoResult<Vec<Menu>>;

    /// Upsert the whole document
    async fn update(&self, menu: &Menu) -> RepoResult<()>;

    /// Field-scoped availability update. Returns false if no product matched.
    async fn set_product_availability(
        &self,
        menu_id: &str,
        ext_id: &str,
        available: bool,
    ) -> RepoResult<bool>;

    /// Field-scoped attribute update; `price` is written when given
    async fn set_attribute_availability(
        &self,
        menu_id: &str,
        ext_id: &str,
        available: bool,
        price: Option<f64>,
    ) -> RepoResult<bool>;

    /// Add and remove ids on a menu's stop set in one step
    async fn set_pos_stop_lists(
        &self,
        menu_id: &str,
        stop: &[String],
        release: &[String],
    ) -> RepoResult<Menu>;
}

/// Store configuration
#[async_trait]
pub trait StoreRepository: Send + Sync + 'static {
    async fn get(&self, id: &str) -> RepoResult<Store>;

    async fn list(&self) -> RepoResult<Vec<Store>>;

    async fn find_by_external_id(
        &self,
        delivery: DeliveryService,
        external_store_id: &str,
    ) -> RepoResult<Option<Store>>;

    async fn update(&self, store: &Store) -> RepoResult<()>;
}

/// Canonical orders
#[async_trait]
pub trait OrderRepository: Send + Sync + 'static {
    /// Assigns `id` when empty. Fails with `AlreadyExists` when an order with
    /// the same delivery and aggregator order id is stored.
    async fn insert(&self, order: &Order) -> RepoResult<Order>;

    async fn get(&self, id: &str) -> RepoResult<Order>;

    async fn find_by_order_id(
        &self,
        delivery: DeliveryService,
        order_id: &str,
    ) -> RepoResult<Option<Order>>;

    async fn update(&self, order: &Order) -> RepoResult<()>;

    async fn list_by_status(&self, status: OrderStatus) -> RepoResult<Vec<Order>>;

    /// Orders of the store already handed to the POS and not finished
    async fn count_active(&self, store_id: &str) -> RepoResult<usize>;
}

/// Append-only stoplist ledger
#[async_trait]
pub trait StopListRepository: Send + Sync + 'static {
    async fn append(&self, transaction: &StopListTransaction) -> RepoResult<()>;

    /// Oldest first
    async fn list_by_store(&self, store_id: &str) -> RepoResult<Vec<StopListTransaction>>;
}
