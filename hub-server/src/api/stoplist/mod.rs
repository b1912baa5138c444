//! Stoplist API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/stoplist/{store_id}/products | POST | 单品停售 / 恢复 |
//! | /api/stoplist/{store_id}/attributes | POST | 加料停售 / 恢复 |
//! | /api/stoplist/{store_id}/refresh | POST | 以 POS 菜单为准全量同步 |
//! | /api/stoplist/{store_id}/transactions | GET | 停售台账 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/stoplist/{store_id}", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/products", post(handler::update_product))
        .route("/attributes", post(handler::update_attributes))
        .route("/refresh", post(handler::refresh))
        .route("/transactions", get(handler::transactions))
}
