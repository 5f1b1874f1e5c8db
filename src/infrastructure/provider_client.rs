//! 区块浏览器 / 节点 HTTP 客户端：带超时、有限重试与错误分类
//!
//! - 传输失败、5xx、429：指数回退重试，耗尽后返回 `Upstream`
//! - 其他 4xx：返回 `Rejected`（带截断后的响应体）
//! - 响应无法解析：返回 `MalformedResponse`

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    config::ProviderConfig,
    error::{BlocksoftError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<String>,
    pub content_type: &'static str,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
            content_type: "application/json",
        }
    }

    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body.to_string()),
            content_type: "application/json",
        }
    }

    pub fn post_text(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body.into()),
            content_type: "text/plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn is_retryable(&self) -> bool {
        self.status >= 500 || self.status == 429
    }
}

/// 连接失败 / 超时
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// 基于 reqwest 的默认实现
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BlocksoftError::configuration(format!("http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self
                .client
                .post(&request.url)
                .header(reqwest::header::CONTENT_TYPE, request.content_type)
                .body(request.body.unwrap_or_default()),
        };
        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// 日志中不输出 query（可能带 apikey）
fn loggable_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        body.to_string()
    } else {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

#[derive(Clone)]
pub struct ProviderClient {
    name: String,
    transport: Arc<dyn HttpTransport>,
    retries: usize,
    backoff_base_ms: u64,
}

impl ProviderClient {
    pub fn new(name: impl Into<String>, transport: Arc<dyn HttpTransport>, config: &ProviderConfig) -> Self {
        Self {
            name: name.into(),
            transport,
            retries: config.retries,
            backoff_base_ms: config.backoff_base_ms,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let body = self.execute(HttpRequest::get(url)).await?;
        self.decode(&body)
    }

    pub async fn get_typed<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.execute(HttpRequest::get(url)).await?;
        self.decode(&body)
    }

    pub async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let resp = self.execute(HttpRequest::post_json(url, body)).await?;
        self.decode(&resp)
    }

    pub async fn post_text(&self, url: &str, body: &str) -> Result<String> {
        self.execute(HttpRequest::post_text(url, body)).await
    }

    fn decode<T: DeserializeOwned>(&self, body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|e| BlocksoftError::malformed(&self.name, e.to_string()))
    }

    async fn execute(&self, request: HttpRequest) -> Result<String> {
        let mut attempt = 0usize;
        let mut last_failure = String::new();
        loop {
            let start = Instant::now();
            let res = self.transport.send(request.clone()).await;
            let elapsed = start.elapsed().as_millis();
            match res {
                Ok(resp) if resp.is_success() => {
                    crate::metrics::observe_provider_latency_ms(&self.name, elapsed, true);
                    return Ok(resp.body);
                }
                Ok(resp) if !resp.is_retryable() => {
                    crate::metrics::observe_provider_latency_ms(&self.name, elapsed, false);
                    tracing::warn!(
                        provider = %self.name,
                        url = %loggable_url(&request.url),
                        status = resp.status,
                        "Provider rejected request"
                    );
                    return Err(BlocksoftError::Rejected(format!(
                        "{} responded {}: {}",
                        self.name,
                        resp.status,
                        truncate(&resp.body, 200)
                    )));
                }
                Ok(resp) => {
                    crate::metrics::observe_provider_latency_ms(&self.name, elapsed, false);
                    last_failure = format!("status {}", resp.status);
                }
                Err(e) => {
                    crate::metrics::observe_provider_latency_ms(&self.name, elapsed, false);
                    last_failure = e.0;
                }
            }

            attempt += 1;
            tracing::debug!(
                provider = %self.name,
                url = %loggable_url(&request.url),
                attempt,
                failure = %last_failure,
                "Provider request failed"
            );
            if attempt > self.retries {
                break;
            }
            let backoff = self.backoff_base_ms * (1u64 << attempt.min(5)); // 简单指数回退
            if backoff > 0 {
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }
        Err(BlocksoftError::upstream(format!(
            "{} failed after {} attempts: {}",
            self.name, attempt, last_failure
        )))
    }
}
