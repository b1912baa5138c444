//! Delivery Hub Server - 聚合平台与餐厅 POS 之间的订单/停售中枢
//!
//! # 架构概述
//!
//! - **订单** (`orders`): webhook 下单流程、预订单延迟提交、状态回写
//! - **停售** (`stoplist`): POS 停售状态向各聚合平台菜单的传播
//! - **适配器** (`aggregator`, `pos`): 各平台 / POS 的 HTTP 客户端
//! - **通知** (`notify`): Telegram / WhatsApp / Firebase 队列消息
//! - **存储** (`db`): 嵌入式 redb
//! - **HTTP API** (`api`): webhook 与运维接口
//!
//! # 模块结构
//!
//! ```text
//! hub-server/src/
//! ├── core/          # 配置、状态、后台任务
//! ├── api/           # HTTP 路由和处理器
//! ├── aggregator/    # 聚合平台客户端
//! ├── pos/           # POS 客户端
//! ├── orders/        # 下单与状态
//! ├── stoplist/      # 停售传播
//! ├── notify/        # 通知
//! ├── db/            # 存储层
//! └── utils/         # 日志、时区
//! ```

pub mod aggregator;
pub mod api;
pub mod core;
pub mod db;
pub mod notify;
pub mod orders;
pub mod pos;
pub mod stoplist;
pub mod utils;

#[cfg(test)]
pub mod testing;

// Re-export 公共类型
pub use core::{Config, Server, ServerError, ServerState};
pub use orders::{CreateOrderRequest, OrderCreator, OrderPipeline};
pub use stoplist::StoplistEngine;
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    __  __      __
   / / / /_  __/ /_
  / /_/ / / / / __ \
 / __  / /_/ / /_/ /
/_/ /_/\__,_/_.___/
    "#
    );
}
