use hostroute_core::Candidate;
use serde::{Deserialize, Serialize};

/// Request body of `POST /api/v1/{keyword}/list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryListRequest {
    pub request_id: String,
    pub task: String,
    pub top_k: usize,
}

/// Candidate as returned by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryAgentItem {
    pub score: f64,
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub version: String,
}

impl From<RegistryAgentItem> for Candidate {
    fn from(item: RegistryAgentItem) -> Self {
        Candidate {
            name: item.name,
            agent_id: item.agent_id,
            url: item.url,
            score: item.score,
            version: item.version,
            description: item.description,
        }
    }
}

/// Response body of `POST /api/v1/{keyword}/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryListResponse {
    /// "success" or "error"
    pub status: String,
    pub request_id: String,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub agents: Vec<RegistryAgentItem>,
}

impl RegistryListResponse {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}
