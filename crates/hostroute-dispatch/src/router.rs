use crate::aggregate::ResultAggregator;
use crate::dispatcher::Dispatcher;
use hostroute_core::{
    AggregateResult, Candidate, CandidateOutcome, DiagnosticTrail, DispatchEnvelope,
    DispatchMode, HostRouteConfig, RegistryError,
};
use hostroute_lb::{ConnectionPool, HttpTransport, RouterMetrics, TransportError};
use hostroute_registry::{Discovery, RegistryClient};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// The only failure a routing attempt surfaces. Everything per-candidate ends
/// up in the result's diagnostic trail instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Registry lookup failed: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Error, Debug)]
pub enum RouterBuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub keyword: String,
    pub task: String,
    pub top_k: Option<usize>,
    pub mode: Option<DispatchMode>,
    pub context_id: Option<String>,
    pub message_id: Option<String>,
}

impl RouteRequest {
    pub fn new(keyword: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            task: task.into(),
            top_k: None,
            mode: None,
            context_id: None,
            message_id: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

/// One routing session: registry lookup, connection setup, dispatch,
/// normalization and aggregation. The pool is shared across calls.
pub struct Router {
    discovery: Arc<dyn Discovery>,
    pool: Arc<ConnectionPool>,
    dispatcher: Dispatcher,
    aggregator: ResultAggregator,
    metrics: Option<RouterMetrics>,
    default_top_k: usize,
    default_mode: DispatchMode,
}

impl Router {
    pub fn new(
        discovery: Arc<dyn Discovery>,
        pool: Arc<ConnectionPool>,
        dispatcher: Dispatcher,
        aggregator: ResultAggregator,
    ) -> Self {
        Self {
            discovery,
            pool,
            dispatcher,
            aggregator,
            metrics: None,
            default_top_k: 3,
            default_mode: DispatchMode::FanOut,
        }
    }

    /// HTTP registry and HTTP transport built from configuration.
    pub fn from_config(config: &HostRouteConfig) -> Result<Self, RouterBuildError> {
        let registry = RegistryClient::new(&config.registry)?;
        let transport = HttpTransport::new(&config.pool, &config.dispatch)?;
        let pool = ConnectionPool::new(Arc::new(transport));

        Ok(Self::new(
            Arc::new(registry),
            Arc::new(pool),
            Dispatcher::new(config.dispatch.timeout()),
            ResultAggregator::from(&config.aggregation),
        )
        .with_defaults(config.dispatch.default_top_k, config.dispatch.default_mode))
    }

    pub fn with_defaults(mut self, top_k: usize, mode: DispatchMode) -> Self {
        self.default_top_k = top_k;
        self.default_mode = mode;
        self
    }

    pub fn with_metrics(mut self, metrics: RouterMetrics) -> Self {
        self.dispatcher = Dispatcher::new(self.dispatcher.timeout()).with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub async fn route(&self, request: RouteRequest) -> Result<AggregateResult, RouteError> {
        let top_k = request.top_k.unwrap_or(self.default_top_k);
        let mode = request.mode.unwrap_or(self.default_mode);
        if let Some(metrics) = &self.metrics {
            let label = mode.to_string();
            metrics.routes_total.with_label_values(&[label.as_str()]).inc();
        }
        info!(keyword = %request.keyword, top_k, %mode, "routing task");

        let candidates = match self
            .discovery
            .resolve(&request.keyword, &request.task, top_k)
            .await
        {
            Ok(candidates) => unique_by_name(candidates),
            Err(e) => {
                warn!(keyword = %request.keyword, error = %e, "registry lookup failed");
                if let Some(metrics) = &self.metrics {
                    metrics.registry_failures_total.inc();
                }
                return Err(RouteError::Registry(e));
            }
        };

        let mut diagnostics = DiagnosticTrail::new();
        let mut per_candidate: HashMap<String, CandidateOutcome> = HashMap::new();

        let connections = self.pool.ensure(&candidates).await;
        diagnostics.extend(connections.diagnostics.clone());
        for record in connections.excluded() {
            let detail = record
                .detail
                .clone()
                .unwrap_or_else(|| format!("{:?}", record.status));
            per_candidate.insert(
                record.name.clone(),
                CandidateOutcome::unreachable(record.name.clone(), detail),
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics
                .probe_failures_total
                .inc_by(connections.excluded().count() as u64);
        }

        let envelope =
            DispatchEnvelope::new(request.task.clone(), request.context_id, request.message_id);
        let report = self
            .dispatcher
            .run(mode, &connections.reachable, &envelope)
            .await;
        diagnostics.extend(report.diagnostics);
        for attempt in report.attempts {
            per_candidate.insert(attempt.candidate.clone(), attempt.into_outcome());
        }

        let candidate_order: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
        let ordered: Vec<&CandidateOutcome> = candidate_order
            .iter()
            .filter_map(|name| per_candidate.get(name))
            .collect();
        let merged_text = self.aggregator.merge(&ordered, &mut diagnostics);

        info!(
            keyword = %request.keyword,
            candidates = candidates.len(),
            reachable = connections.reachable.len(),
            answered = per_candidate.values().filter(|o| o.is_success()).count(),
            "routing finished"
        );

        Ok(AggregateResult {
            keyword: request.keyword,
            task: request.task,
            context_id: envelope.context_id,
            mode,
            merged_text,
            per_candidate,
            candidate_order,
            candidates: candidates.iter().map(Candidate::summary).collect(),
            connections: connections.connections,
            diagnostics,
        })
    }
}

fn unique_by_name(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            let fresh = seen.insert(c.name.clone());
            if !fresh {
                warn!(candidate = %c.name, "dropping duplicate candidate");
            }
            fresh
        })
        .collect()
}
