//! 数据库层
//!
//! - [`repository`] - 仓储接口 (菜单、门店、订单、停售台账)
//! - [`storage`] - 基于 redb 的 [`HubStorage`] 实现

pub mod repository;
pub mod storage;

pub use repository::{
    MenuRepository, OrderRepository, RepoError, RepoResult, StopListRepository, StoreRepository,
};
pub use storage::HubStorage;
