//! Webhook Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use http::HeaderMap;
use serde_json::Value;
use shared::models::DeliveryService;
use shared::order::{Order, fail_codes};

use crate::core::ServerState;
use crate::orders::CreateOrderRequest;
use crate::utils::{ApiResponse, AppError, AppResult, ErrorCode};

/// Header carrying the per-store webhook secret
pub const SECRET_HEADER: &str = "x-store-secret";

/// Receive a new order from an aggregator
///
/// A repeated webhook answers with the stored order and a message instead of
/// an error, so aggregators stop redelivering.
pub async fn receive_order(
    State(state): State<ServerState>,
    Path((delivery, external_store_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> AppResult<ApiResponse<Order>> {
    let delivery: DeliveryService = delivery.parse().map_err(|_| {
        AppError::with_message(
            ErrorCode::InvalidRequest,
            format!("Unknown delivery service: {delivery}"),
        )
    })?;
    let secret = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    tracing::info!(%delivery, external_store_id = %external_store_id, "Order webhook received");
    let order = state
        .orders
        .create_order(CreateOrderRequest {
            delivery,
            external_store_id,
            payload,
            secret,
        })
        .await?;

    let duplicate = order
        .fail_reason
        .as_ref()
        .is_some_and(|r| r.code == fail_codes::ALREADY_EXISTS);
    if duplicate {
        return Ok(ApiResponse::success_with_message("Order already exists", order));
    }
    Ok(ApiResponse::success(order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_app;
    use crate::api::test_support::{iiko, seed_store, test_app};
    use axum::body::{Body, to_bytes};
    use http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn webhook(path: &str, secret: &str, order_id: &str) -> Request<Body> {
        let body = json!({
            "order_id": order_id,
            "order_code": "A-1",
            "items": [{"id": "p1", "pos_id": "p1", "name": "Burger", "quantity": 1, "price": 7.5}],
        });
        Request::post(path)
            .header("content-type", "application/json")
            .header(SECRET_HEADER, secret)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_webhook_creates_order() {
        let app = test_app(iiko());
        seed_store(&app.state, "s1").await;
        let router = build_app(app.state.clone());

        let response = router
            .oneshot(webhook("/api/webhooks/glovo/ext-1", "s3cret", "o1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["data"]["status"], "PENDING");
        assert_eq!(json["data"]["pos_order_id"], "pos-1");
        assert_eq!(app.pos.created(), vec!["o1".to_string()]);
        // No notification channels configured on the store
        assert!(app.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_webhook_answers_with_message() {
        let app = test_app(iiko());
        seed_store(&app.state, "s1").await;
        let router = build_app(app.state.clone());

        router
            .clone()
            .oneshot(webhook("/api/webhooks/glovo/ext-1", "s3cret", "o1"))
            .await
            .unwrap();
        let response = router
            .oneshot(webhook("/api/webhooks/glovo/ext-1", "s3cret", "o1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Order already exists");
        assert_eq!(app.pos.created().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_unauthorized() {
        let app = test_app(iiko());
        seed_store(&app.state, "s1").await;
        let response = build_app(app.state.clone())
            .oneshot(webhook("/api/webhooks/glovo/ext-1", "nope", "o1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(app.pos.created().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_delivery_and_store() {
        let app = test_app(iiko());
        seed_store(&app.state, "s1").await;
        let router = build_app(app.state.clone());

        let response = router
            .clone()
            .oneshot(webhook("/api/webhooks/ubereats/ext-1", "s3cret", "o1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router
            .oneshot(webhook("/api/webhooks/glovo/ext-404", "s3cret", "o1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
