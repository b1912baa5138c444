use thiserror::Error;

use super::reference::ReferenceDataError;
use crate::aggregator::AggregatorError;
use crate::db::RepoError;
use crate::notify::NotifyError;
use crate::pos::PosError;

/// 启动阶段错误
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("存储初始化失败: {0}")]
    Storage(#[from] RepoError),

    #[error("参考数据加载失败: {0}")]
    Reference(#[from] ReferenceDataError),

    #[error("聚合平台客户端初始化失败: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("POS 客户端初始化失败: {0}")]
    Pos(#[from] PosError),

    #[error("通知客户端初始化失败: {0}")]
    Notify(#[from] NotifyError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
