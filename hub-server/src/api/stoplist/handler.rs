//! Stoplist API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::models::{DeliveryService, StopListTransaction};

use crate::core::ServerState;
use crate::stoplist::AttributeUpdate;
use crate::utils::{ApiResponse, AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub product_id: String,
    pub available: bool,
    /// Restrict the push to these integrations (all when absent)
    #[serde(default)]
    pub deliveries: Option<Vec<DeliveryService>>,
}

#[derive(Debug, Deserialize)]
pub struct AttributesRequest {
    pub items: Vec<AttributeUpdate>,
}

/// Stop or release a single product
pub async fn update_product(
    State(state): State<ServerState>,
    Path(store_id): Path<String>,
    Json(req): Json<ProductRequest>,
) -> AppResult<ApiResponse<StopListTransaction>> {
    if req.product_id.trim().is_empty() {
        return Err(AppError::validation("product_id must not be empty"));
    }
    let transaction = state
        .stoplist
        .update_product(&store_id, &req.product_id, req.available, req.deliveries)
        .await?;
    Ok(ApiResponse::success(transaction))
}

pub async fn update_attributes(
    State(state): State<ServerState>,
    Path(store_id): Path<String>,
    Json(req): Json<AttributesRequest>,
) -> AppResult<ApiResponse<StopListTransaction>> {
    if req.items.is_empty() {
        return Err(AppError::validation("items must not be empty"));
    }
    let transaction = state
        .stoplist
        .update_attributes(&store_id, &req.items)
        .await?;
    Ok(ApiResponse::success(transaction))
}

/// Re-read the POS menu and push its stop state everywhere
pub async fn refresh(
    State(state): State<ServerState>,
    Path(store_id): Path<String>,
) -> AppResult<ApiResponse<StopListTransaction>> {
    let transaction = state.stoplist.refresh_from_pos(&store_id).await?;
    Ok(ApiResponse::success(transaction))
}

pub async fn transactions(
    State(state): State<ServerState>,
    Path(store_id): Path<String>,
) -> AppResult<ApiResponse<Vec<StopListTransaction>>> {
    let transactions = state.stoplist.transactions(&store_id).await?;
    Ok(ApiResponse::success(transactions))
}

#[cfg(test)]
mod tests {
    use crate::api::build_app;
    use crate::api::test_support::{iiko, seed_store, test_app};
    use axum::body::{Body, to_bytes};
    use http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn post(path: &str, body: Value) -> Request<Body> {
        Request::post(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_product_stop_is_recorded_in_ledger() {
        let app = test_app(iiko());
        seed_store(&app.state, "s1").await;
        let router = build_app(app.state.clone());

        let response = router
            .clone()
            .oneshot(post(
                "/api/stoplist/s1/products",
                json!({"product_id": "p1", "available": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["store_id"], "s1");

        let response = router
            .oneshot(
                Request::get("/api/stoplist/s1/transactions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["data"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_validation_and_unknown_store() {
        let app = test_app(iiko());
        seed_store(&app.state, "s1").await;
        let router = build_app(app.state.clone());

        let response = router
            .clone()
            .oneshot(post("/api/stoplist/s1/attributes", json!({"items": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(post("/api/stoplist/nope/refresh", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
