//! Shared reqwest plumbing for aggregator adapters

use reqwest::Method;
use serde::Serialize;
use shared::models::DeliveryService;
use std::time::Duration;

use super::{AggregatorError, AggregatorResult};
use crate::core::config::Endpoint;

/// HTTP client bound to one aggregator endpoint
#[derive(Debug, Clone)]
pub struct AggregatorHttp {
    delivery: DeliveryService,
    client: reqwest::Client,
    endpoint: Endpoint,
}

impl AggregatorHttp {
    pub fn new(
        delivery: DeliveryService,
        endpoint: Endpoint,
        timeout: Duration,
    ) -> AggregatorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            delivery,
            client,
            endpoint,
        })
    }

    pub fn delivery(&self) -> DeliveryService {
        self.delivery
    }

    /// Send a JSON body; any non-2xx answer becomes [`AggregatorError::Api`]
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> AggregatorResult<()> {
        let url = format!("{}{}", self.endpoint.base_url.trim_end_matches('/'), path);
        let mut request = self.client.request(method.clone(), &url).json(body);
        if let Some(token) = &self.endpoint.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(delivery = %self.delivery, %method, %url, "Aggregator call succeeded");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AggregatorError::Api {
            delivery: self.delivery,
            status: status.as_u16(),
            body,
        })
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> AggregatorResult<()> {
        self.send(Method::POST, path, body).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> AggregatorResult<()> {
        self.send(Method::PUT, path, body).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> AggregatorResult<()> {
        self.send(Method::PATCH, path, body).await
    }
}
