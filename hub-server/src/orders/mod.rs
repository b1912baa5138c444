//! 订单模块
//!
//! - **pipeline**: 下单流程 ([`OrderPipeline`], [`OrderCreator`])
//! - **status**: POS 状态回写与取消 ([`OrderStatusService`])
//! - **preorder**: 预订单 / 延迟提交扫描
//! - **refresh**: POS 状态轮询
//! - **fail_reason**: POS 拒单原因分类
//! - **rules**: 规则引擎接口
//! - **money**: 金额计算
//!
//! # Data Flow
//!
//! ```text
//! Webhook → OrderCreator (decorators) → OrderPipeline → redb
//!                                            ↓
//!                                     PosClient.create_order
//!
//! POS status → OrderStatusService → redb → subscribers → aggregator echo
//! ```

pub mod fail_reason;
pub mod money;
pub mod pipeline;
pub mod preorder;
pub mod refresh;
pub mod rules;
pub mod status;

pub use pipeline::{
    CreateOrderRequest, OrderCreator, OrderPipeline, PipelineDeps, PipelineError, PipelineResult,
};
pub use preorder::PreorderSweep;
pub use refresh::StatusRefresher;
pub use rules::{AllowAll, RuleEngine};
pub use status::{OrderStatusService, StatusSubscriber, StatusUpdate};
