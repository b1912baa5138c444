//! 停售 (可售状态) 同步
//!
//! - [`resolve`] - 身份解析与可售差异计算
//! - [`engine`] - 传播引擎 ([`StoplistEngine`])
//! - [`report`] - 失败报告
//! - [`scheduler`] - 定时停售调度器

pub mod engine;
pub mod report;
pub mod resolve;
pub mod scheduler;

pub use engine::{AttributeUpdate, StoplistEngine, StoplistError, StoplistResult};
pub use resolve::{ItemKinds, PushMode, Scope};
pub use scheduler::StoplistScheduler;
