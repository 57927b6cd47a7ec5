use crate::health::{join_path, HealthCheckConfig};
use async_trait::async_trait;
use hostroute_core::{
    ConnectionError, DispatchConfig, DispatchEnvelope, DispatchError, PoolConfig, RawResponse,
    SendMessageParams,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// How the pool and dispatcher talk to a worker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Liveness probe against the worker's base URL.
    async fn probe(&self, base: &Url) -> Result<(), ConnectionError>;

    /// Deliver one task message and classify the reply.
    async fn send(
        &self,
        base: &Url,
        envelope: &DispatchEnvelope,
    ) -> Result<RawResponse, DispatchError>;
}

/// reqwest-backed transport: `GET {base}{probe_path}` and `POST {base}{messages_path}`.
pub struct HttpTransport {
    probe_client: Client,
    dispatch_client: Client,
    probe_path: String,
    messages_path: String,
    dispatch_timeout: Duration,
}

impl HttpTransport {
    pub fn new(pool: &PoolConfig, dispatch: &DispatchConfig) -> Result<Self, TransportError> {
        Self::with_settings(
            HealthCheckConfig::from(pool),
            dispatch.messages_path.clone(),
            dispatch.timeout(),
        )
    }

    pub fn with_settings(
        health: HealthCheckConfig,
        messages_path: impl Into<String>,
        dispatch_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let probe_client = ClientBuilder::new()
            .timeout(health.timeout)
            .danger_accept_invalid_certs(health.accept_invalid_certs)
            .build()?;
        let dispatch_client = ClientBuilder::new()
            .timeout(dispatch_timeout)
            .danger_accept_invalid_certs(health.accept_invalid_certs)
            .build()?;

        Ok(Self {
            probe_client,
            dispatch_client,
            probe_path: health.path,
            messages_path: messages_path.into(),
            dispatch_timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, base: &Url) -> Result<(), ConnectionError> {
        let url = join_path(base, &self.probe_path);
        let response = self.probe_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ConnectionError::Timeout { url: url.clone() }
            } else {
                ConnectionError::Transport {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectionError::Status {
                url,
                status: status.as_u16(),
            });
        }
        debug!("probe ok: {}", url);
        Ok(())
    }

    async fn send(
        &self,
        base: &Url,
        envelope: &DispatchEnvelope,
    ) -> Result<RawResponse, DispatchError> {
        let url = join_path(base, &self.messages_path);
        let params = SendMessageParams::from(envelope);

        let response = self
            .dispatch_client
            .post(&url)
            .json(&params)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        RawResponse::from_body(&body, content_type.as_deref())
    }
}

impl HttpTransport {
    fn classify(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::Timeout {
                after_ms: self.dispatch_timeout.as_millis() as u64,
            }
        } else if e.is_decode() || e.is_body() {
            DispatchError::MalformedResponse(e.to_string())
        } else {
            DispatchError::Transport(e.to_string())
        }
    }
}
