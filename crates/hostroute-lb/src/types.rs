use crate::transport::Transport;
use hostroute_core::{
    ConnectionRecord, ConnectionStatus, DiagnosticTrail, DispatchEnvelope, DispatchError,
    RawResponse,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Liveness of one named candidate as last observed by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    #[default]
    Unattempted,
    Reachable,
    Unreachable,
}

#[derive(Debug, Default)]
pub(crate) struct PoolEntry {
    pub url: Option<Url>,
    pub state: ProbeState,
    pub last_check: Option<Instant>,
    pub last_error: Option<String>,
}

impl PoolEntry {
    /// Reachable entries are kept until the candidate's URL changes.
    pub fn is_current(&self, url: &Url) -> bool {
        self.state == ProbeState::Reachable && self.url.as_ref() == Some(url)
    }
}

/// A reachable candidate, ready for dispatch.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub name: String,
    pub url: Url,
    transport: Arc<dyn Transport>,
}

impl ConnectionHandle {
    pub fn new(name: impl Into<String>, url: Url, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            url,
            transport,
        }
    }

    pub async fn send(&self, envelope: &DispatchEnvelope) -> Result<RawResponse, DispatchError> {
        self.transport.send(&self.url, envelope).await
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .finish()
    }
}

/// Result of [`ConnectionPool::ensure`](crate::ConnectionPool::ensure).
#[derive(Debug, Default)]
pub struct EnsureReport {
    /// Reachable candidates in candidate order.
    pub reachable: Vec<ConnectionHandle>,
    /// One record per candidate, in candidate order.
    pub connections: Vec<ConnectionRecord>,
    pub diagnostics: DiagnosticTrail,
}

impl EnsureReport {
    pub fn excluded(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.connections
            .iter()
            .filter(|r| r.status != ConnectionStatus::Reachable)
    }

    pub fn reachable_names(&self) -> Vec<&str> {
        self.reachable.iter().map(|h| h.name.as_str()).collect()
    }
}
