use crate::health::candidate_url;
use crate::transport::Transport;
use crate::types::{ConnectionHandle, EnsureReport, PoolEntry, ProbeState};
use dashmap::DashMap;
use futures::future::join_all;
use hostroute_core::{
    Candidate, ConnectionError, ConnectionRecord, ConnectionStatus, DiagnosticTrail,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Probed connections keyed by candidate name.
///
/// Per-name entries are locked for the duration of a probe, so two routing
/// attempts sharing the pool never probe the same candidate concurrently and
/// never observe a half-updated entry.
pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    entries: DashMap<String, Arc<Mutex<PoolEntry>>>,
}

impl ConnectionPool {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            entries: DashMap::new(),
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Make sure every candidate has a probed connection.
    ///
    /// Misconfigured and unreachable candidates are recorded in the report and
    /// left out of `reachable`; this never fails as a whole.
    pub async fn ensure(&self, candidates: &[Candidate]) -> EnsureReport {
        let mut slots: Vec<Option<ConnectionRecord>> = Vec::with_capacity(candidates.len());
        let mut probes = Vec::new();
        let mut diagnostics = DiagnosticTrail::new();

        for (idx, candidate) in candidates.iter().enumerate() {
            match candidate_url(candidate) {
                Ok(url) => {
                    slots.push(None);
                    probes.push(async move {
                        (idx, self.ensure_one(&candidate.name, url).await)
                    });
                }
                Err(e) => {
                    warn!("skipping {}: {}", candidate.name, e);
                    diagnostics.configuration_failure(&candidate.name, &e);
                    slots.push(Some(ConnectionRecord {
                        name: candidate.name.clone(),
                        url: candidate.url.clone(),
                        status: ConnectionStatus::Misconfigured,
                        detail: Some(e.to_string()),
                    }));
                }
            }
        }

        let mut reachable = Vec::new();
        for (idx, result) in join_all(probes).await {
            let candidate = &candidates[idx];
            let record = match result {
                Ok(handle) => {
                    let record = ConnectionRecord {
                        name: candidate.name.clone(),
                        url: Some(handle.url.to_string()),
                        status: ConnectionStatus::Reachable,
                        detail: None,
                    };
                    reachable.push(handle);
                    record
                }
                Err(e) => {
                    diagnostics.connection_failure(&candidate.name, &e);
                    ConnectionRecord {
                        name: candidate.name.clone(),
                        url: candidate.url.clone(),
                        status: ConnectionStatus::Unreachable,
                        detail: Some(e.to_string()),
                    }
                }
            };
            slots[idx] = Some(record);
        }

        let connections: Vec<ConnectionRecord> = slots.into_iter().flatten().collect();
        info!(
            "connections ready: {}/{} reachable",
            reachable.len(),
            candidates.len()
        );

        EnsureReport {
            reachable,
            connections,
            diagnostics,
        }
    }

    async fn ensure_one(&self, name: &str, url: Url) -> Result<ConnectionHandle, ConnectionError> {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_default()
            .clone();
        let mut entry = entry.lock().await;

        if entry.is_current(&url) {
            debug!("reusing connection to {} at {}", name, url);
            return Ok(ConnectionHandle::new(name, url, self.transport.clone()));
        }

        if entry.url.as_ref().is_some_and(|old| old != &url) {
            info!("{} moved from {:?} to {}", name, entry.url.as_ref().map(Url::as_str), url);
        }
        entry.url = Some(url.clone());
        entry.last_check = Some(Instant::now());

        match self.transport.probe(&url).await {
            Ok(()) => {
                entry.state = ProbeState::Reachable;
                entry.last_error = None;
                info!("connected to {} at {}", name, url);
                Ok(ConnectionHandle::new(name, url, self.transport.clone()))
            }
            Err(e) => {
                warn!("{} unreachable: {}", name, e);
                entry.state = ProbeState::Unreachable;
                entry.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Last observed state; `Unattempted` for names the pool has never seen.
    pub async fn state(&self, name: &str) -> ProbeState {
        let entry = match self.entries.get(name) {
            Some(entry) => entry.value().clone(),
            None => return ProbeState::Unattempted,
        };
        let state = entry.lock().await.state;
        state
    }

    /// Drop a candidate so the next `ensure` probes it from scratch.
    pub fn forget(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
