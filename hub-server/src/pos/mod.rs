//! POS 适配器
//!
//! 每种 POS 一个 [`PosClient`] 实现，按门店上的 [`PosType`] 从
//! [`PosRegistry`] 取用。
//!
//! | POS | 实现 |
//! |-----|------|
//! | iiko / Syrve | [`iiko::IikoClient`] (同一协议, 不同域名) |
//! | r_keeper | [`rkeeper::RkeeperClient`] |
//! | Posist | [`posist::PosistClient`] |

pub mod http;
pub mod iiko;
pub mod posist;
pub mod rkeeper;

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use shared::models::{Menu, PosType, Store};
use shared::order::{Order, OrderStatus};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::core::Config;

/// POS adapter errors
#[derive(Debug, Error)]
pub enum PosError {
    /// Transient failure; the caller may resubmit the same order later
    #[error("POS temporarily unavailable: {0}")]
    Retry(String),

    /// POS refused the request for a domain reason
    #[error("{0}")]
    Rejected(String),

    #[error("{pos} does not support {operation}")]
    Unsupported {
        pos: PosType,
        operation: &'static str,
    },

    #[error("No POS adapter registered for {0}")]
    NotRegistered(PosType),

    #[error("Store {0} has no POS configured")]
    NotConfigured(String),

    #[error("Invalid POS response: {0}")]
    InvalidResponse(String),
}

impl PosError {
    pub fn is_retry(&self) -> bool {
        matches!(self, PosError::Retry(_))
    }
}

impl From<PosError> for AppError {
    fn from(err: PosError) -> Self {
        let code = match &err {
            PosError::Retry(_) => ErrorCode::OrderRetryable,
            PosError::Rejected(_) => ErrorCode::OrderRejectedByPos,
            PosError::Unsupported { .. } | PosError::NotRegistered(_) => ErrorCode::PosUnsupported,
            PosError::NotConfigured(_) => ErrorCode::ConfigError,
            PosError::InvalidResponse(_) => ErrorCode::PosRequestFailed,
        };
        AppError::with_message(code, err.to_string())
    }
}

pub type PosResult<T> = Result<T, PosError>;

/// Uniform capability surface of a POS back-end
#[async_trait]
pub trait PosClient: Send + Sync + 'static {
    fn pos_type(&self) -> PosType;

    /// Current POS menu; its `stop_lists` is the ground truth
    async fn get_menu(&self, store: &Store) -> PosResult<Menu>;

    /// Submit the order; returns the POS-side order id
    async fn create_order(&self, store: &Store, order: &Order) -> PosResult<String>;

    /// Raw POS status name of a submitted order
    async fn get_order_status(&self, store: &Store, pos_order_id: &str) -> PosResult<String>;

    /// None when the POS status has no canonical counterpart
    fn map_pos_status_to_system_status(&self, pos_status: &str) -> Option<OrderStatus>;

    async fn cancel_order(&self, store: &Store, pos_order_id: &str, reason: &str)
    -> PosResult<()>;
}

/// Adapter lookup by POS type
#[derive(Clone, Default)]
pub struct PosRegistry {
    clients: HashMap<PosType, Arc<dyn PosClient>>,
}

impl PosRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> PosResult<Self> {
        let timeout = config.http_timeout();
        let http = |pos: PosType| http::PosHttp::new(pos, config.endpoint(pos.as_str()), timeout);

        let mut registry = Self::new();
        registry.register(Arc::new(iiko::IikoClient::new(http(PosType::Iiko)?)));
        registry.register(Arc::new(iiko::IikoClient::new(http(PosType::Syrve)?)));
        registry.register(Arc::new(rkeeper::RkeeperClient::new(http(PosType::Rkeeper)?)));
        registry.register(Arc::new(posist::PosistClient::new(http(PosType::Posist)?)));
        Ok(registry)
    }

    pub fn register(&mut self, client: Arc<dyn PosClient>) {
        self.clients.insert(client.pos_type(), client);
    }

    pub fn get(&self, pos: PosType) -> PosResult<Arc<dyn PosClient>> {
        self.clients
            .get(&pos)
            .cloned()
            .ok_or(PosError::NotRegistered(pos))
    }

    /// Adapter for the store's configured POS
    pub fn for_store(&self, store: &Store) -> PosResult<Arc<dyn PosClient>> {
        let pos = store
            .pos_type
            .ok_or_else(|| PosError::NotConfigured(store.id.clone()))?;
        self.get(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_is_only_retry() {
        assert!(PosError::Retry("timeout".into()).is_retry());
        assert!(!PosError::Rejected("bad".into()).is_retry());
        assert!(!PosError::InvalidResponse("x".into()).is_retry());
    }

    #[test]
    fn test_for_store_without_pos() {
        let registry = PosRegistry::new();
        let store = Store {
            id: "s1".into(),
            ..Default::default()
        };
        assert!(matches!(
            registry.for_store(&store),
            Err(PosError::NotConfigured(id)) if id == "s1"
        ));
    }

    #[test]
    fn test_error_codes() {
        let err: AppError = PosError::Retry("x".into()).into();
        assert_eq!(err.code, ErrorCode::OrderRetryable);
        let err: AppError = PosError::Rejected("x".into()).into();
        assert_eq!(err.code, ErrorCode::OrderRejectedByPos);
    }
}
