//! Shared reqwest plumbing for POS adapters
//!
//! 错误分类: 超时、连接失败和 5xx 视为 [`PosError::Retry`]，
//! 其余非 2xx 视为 [`PosError::Rejected`] 并携带 POS 返回的文本。

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::{PosType, Store};
use std::time::Duration;

use super::{PosError, PosResult};
use crate::core::config::Endpoint;

#[derive(Debug, Clone)]
pub struct PosHttp {
    pos: PosType,
    client: reqwest::Client,
    endpoint: Endpoint,
}

impl PosHttp {
    pub fn new(pos: PosType, endpoint: Endpoint, timeout: Duration) -> PosResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PosError::InvalidResponse(e.to_string()))?;
        Ok(Self {
            pos,
            client,
            endpoint,
        })
    }

    pub fn pos(&self) -> PosType {
        self.pos
    }

    /// Store-level base URL and key override the global endpoint
    fn url(&self, store: &Store, path: &str) -> String {
        let base = store
            .pos
            .base_url
            .as_deref()
            .unwrap_or(&self.endpoint.base_url);
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    pub async fn send<B, R>(
        &self,
        store: &Store,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> PosResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(store, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = store.pos.api_key.as_ref().or(self.endpoint.token.as_ref()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                PosError::Retry(format!("{}: {e}", self.pos))
            } else {
                PosError::InvalidResponse(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(PosError::Retry(format!("{} returned {status}: {text}", self.pos)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PosError::Rejected(text));
        }

        tracing::debug!(pos = %self.pos, %method, %url, "POS call succeeded");
        response
            .json::<R>()
            .await
            .map_err(|e| PosError::InvalidResponse(e.to_string()))
    }

    pub async fn get<R: DeserializeOwned>(&self, store: &Store, path: &str) -> PosResult<R> {
        self.send::<(), R>(store, Method::GET, path, None).await
    }

    pub async fn post<B, R>(&self, store: &Store, path: &str, body: &B) -> PosResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(store, Method::POST, path, Some(body)).await
    }
}
