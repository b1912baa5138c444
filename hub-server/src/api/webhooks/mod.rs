//! Aggregator Webhook Module
//!
//! 聚合平台推送新订单的入口，一个平台一个路径段。

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

/// Webhook router
pub fn router() -> Router<ServerState> {
    Router::new().route(
        "/api/webhooks/{delivery}/{external_store_id}",
        post(handler::receive_order),
    )
}
