//! 下单规则引擎接口
//!
//! 在提交 POS 之前评估订单；返回终态时订单不再提交。

use async_trait::async_trait;
use shared::models::Store;
use shared::order::{Order, OrderStatus};

#[async_trait]
pub trait RuleEngine: Send + Sync + 'static {
    /// Verdict for the order, None to let it through
    async fn evaluate(&self, order: &Order, store: &Store) -> Option<OrderStatus>;
}

/// Lets every order through
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl RuleEngine for AllowAll {
    async fn evaluate(&self, _order: &Order, _store: &Store) -> Option<OrderStatus> {
        None
    }
}
