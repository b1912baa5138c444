//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use shared::order::Order;

use crate::core::ServerState;
use crate::db::OrderRepository;
use crate::orders::StatusUpdate;
use crate::utils::{ApiResponse, AppResult};

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Status as reported by the POS
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Updated,
    Ignored,
    Unmapped,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub result: UpdateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_status: Option<String>,
}

impl From<StatusUpdate> for StatusResponse {
    fn from(update: StatusUpdate) -> Self {
        match update {
            StatusUpdate::Updated(order) => Self {
                result: UpdateKind::Updated,
                order: Some(order),
                pos_status: None,
            },
            StatusUpdate::Ignored(order) => Self {
                result: UpdateKind::Ignored,
                order: Some(order),
                pos_status: None,
            },
            StatusUpdate::Unmapped(raw) => Self {
                result: UpdateKind::Unmapped,
                order: None,
                pos_status: Some(raw),
            },
        }
    }
}

/// Get order by storage id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Order>> {
    let order = OrderRepository::get(state.storage.as_ref(), &id).await?;
    Ok(ApiResponse::success(order))
}

/// Apply a POS status update
pub async fn update_status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> AppResult<ApiResponse<StatusResponse>> {
    let update = state.status.update_order_status(&id, &req.status).await?;
    Ok(ApiResponse::success(update.into()))
}

/// Cancel an order on behalf of the aggregator
pub async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> AppResult<ApiResponse<Order>> {
    let order = state.status.cancel_order(&id, &req.reason).await?;
    Ok(ApiResponse::success(order))
}
