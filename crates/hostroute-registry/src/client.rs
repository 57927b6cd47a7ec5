use crate::models::{RegistryAgentItem, RegistryListRequest, RegistryListResponse};
use async_trait::async_trait;
use hostroute_core::{
    Candidate, RegistryConfig, RegistryError, RegistryQuery, RegistryResult, MAX_TOP_K,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Source of ranked candidates for a keyword.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Ranked candidates, best first, at most `top_k` long and never empty.
    async fn resolve(&self, keyword: &str, task: &str, top_k: usize)
        -> RegistryResult<Vec<Candidate>>;
}

/// HTTP client for the discovery service.
pub struct RegistryClient {
    base_url: Url,
    api_key: Option<SecretString>,
    client: Client,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RegistryError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Self::with_client(&config.base_url, config.api_key.clone(), client)
    }

    /// Build on top of an existing client (shared pools, custom TLS).
    pub fn with_client(
        base_url: &str,
        api_key: Option<SecretString>,
        client: Client,
    ) -> RegistryResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            RegistryError::Transport(format!("invalid registry URL {:?}: {}", base_url, e))
        })?;
        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Self::with_client(base_url, api_key, client)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/api/v1/{keyword}/list` with the keyword percent-encoded as one segment.
    fn list_url(&self, keyword: &str) -> RegistryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RegistryError::Transport(format!("registry URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "v1", keyword, "list"]);
        Ok(url)
    }

    /// Raw list call. No ranking, no validation of the payload.
    pub async fn list_agents(&self, query: &RegistryQuery) -> RegistryResult<RegistryListResponse> {
        let url = self.list_url(&query.keyword)?;
        let body = RegistryListRequest {
            request_id: query.request_id.clone(),
            task: query.task.clone(),
            top_k: query.top_k.clamp(1, MAX_TOP_K),
        };

        debug!(%url, request_id = %body.request_id, top_k = body.top_k, "Querying registry");

        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Transport(format!("registry request timed out: {}", e))
            } else {
                RegistryError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RegistryError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<RegistryListResponse>()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Discovery for RegistryClient {
    async fn resolve(
        &self,
        keyword: &str,
        task: &str,
        top_k: usize,
    ) -> RegistryResult<Vec<Candidate>> {
        if keyword.trim().is_empty() {
            return Err(RegistryError::InvalidKeyword(keyword.to_string()));
        }
        if top_k == 0 {
            return Err(RegistryError::InvalidTopK(top_k));
        }

        let query = RegistryQuery::new(keyword, task, top_k);
        let response = self.list_agents(&query).await?;

        if !response.is_success() {
            return Err(RegistryError::Rejected {
                status: response.status,
                request_id: response.request_id,
            });
        }
        if response.request_id != query.request_id {
            warn!(
                sent = %query.request_id,
                received = %response.request_id,
                "Registry echoed a different request id"
            );
        }
        if response.count != response.agents.len() {
            warn!(
                count = response.count,
                agents = response.agents.len(),
                "Registry count does not match the number of agents returned"
            );
        }

        let candidates = rank_candidates(response.agents, top_k);
        if candidates.is_empty() {
            return Err(RegistryError::NoCandidates {
                keyword: keyword.to_string(),
            });
        }

        info!(
            keyword,
            request_id = %query.request_id,
            selected = candidates.len(),
            "Resolved candidates"
        );
        Ok(candidates)
    }
}

fn score_key(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}

/// Best score first, ties in registry order, first occurrence of a name wins,
/// at most `top_k` entries.
pub fn rank_candidates(mut agents: Vec<RegistryAgentItem>, top_k: usize) -> Vec<Candidate> {
    agents.sort_by(|a, b| score_key(b.score).total_cmp(&score_key(a.score)));

    let mut seen = HashSet::new();
    agents
        .into_iter()
        .filter(|agent| seen.insert(agent.name.clone()))
        .take(top_k)
        .map(Candidate::from)
        .collect()
}
