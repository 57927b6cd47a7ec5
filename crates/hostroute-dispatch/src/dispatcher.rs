use crate::normalize::{Normalized, ResponseNormalizer};
use futures::future::join_all;
use hostroute_core::{
    CandidateOutcome, CandidateState, DiagnosticTrail, DispatchEnvelope, DispatchError,
    DispatchMode,
};
use hostroute_lb::{ConnectionHandle, RouterMetrics};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One candidate's pass through `UNATTEMPTED -> DISPATCHED -> SUCCEEDED | FAILED`.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub candidate: String,
    pub state: CandidateState,
    pub result: Result<Normalized, DispatchError>,
    pub elapsed: Duration,
}

impl Attempt {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_outcome(self) -> CandidateOutcome {
        match self.result {
            Ok(normalized) => normalized.into_outcome(self.candidate),
            Err(e) => CandidateOutcome::error(self.candidate, e.to_string()),
        }
    }
}

/// Attempts in the order candidates were supplied, never completion order.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub attempts: Vec<Attempt>,
    /// First-success only: one line per failed attempt before the winner.
    pub errors: Vec<String>,
    pub diagnostics: DiagnosticTrail,
}

impl DispatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &Attempt> {
        self.attempts.iter().filter(|a| a.is_success())
    }

    /// Candidates never reached (first-success stopped early) stay UNATTEMPTED.
    pub fn state_of(&self, candidate: &str) -> CandidateState {
        self.attempts
            .iter()
            .find(|a| a.candidate == candidate)
            .map(|a| a.state)
            .unwrap_or(CandidateState::Unattempted)
    }
}

pub struct Dispatcher {
    timeout: Duration,
    metrics: Option<RouterMetrics>,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: RouterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(
        &self,
        mode: DispatchMode,
        handles: &[ConnectionHandle],
        envelope: &DispatchEnvelope,
    ) -> DispatchReport {
        match mode {
            DispatchMode::FanOut => self.fan_out(handles, envelope).await,
            DispatchMode::FirstSuccess => self.first_success(handles, envelope).await,
        }
    }

    /// Every handle concurrently, each under its own timeout. Waits for all.
    pub async fn fan_out(
        &self,
        handles: &[ConnectionHandle],
        envelope: &DispatchEnvelope,
    ) -> DispatchReport {
        info!(candidates = handles.len(), "fan-out dispatch");
        let attempts = join_all(handles.iter().map(|h| self.attempt(h, envelope))).await;

        let mut report = DispatchReport::default();
        for attempt in attempts {
            if let Err(e) = &attempt.result {
                report.diagnostics.dispatch_failure(&attempt.candidate, e);
            }
            report.attempts.push(attempt);
        }
        report
    }

    /// Handles strictly in order, stopping at the first success.
    pub async fn first_success(
        &self,
        handles: &[ConnectionHandle],
        envelope: &DispatchEnvelope,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for handle in handles {
            let attempt = self.attempt(handle, envelope).await;
            match &attempt.result {
                Ok(_) => {
                    info!(
                        candidate = %handle.name,
                        failed_before = report.errors.len(),
                        "first success"
                    );
                    report.attempts.push(attempt);
                    return report;
                }
                Err(e) => {
                    report.errors.push(format!("{}: {}", handle.name, e));
                    report.diagnostics.dispatch_failure(&handle.name, e);
                    report.attempts.push(attempt);
                }
            }
        }

        warn!(attempted = handles.len(), "no candidate succeeded");
        report
    }

    async fn attempt(&self, handle: &ConnectionHandle, envelope: &DispatchEnvelope) -> Attempt {
        let state = CandidateState::Unattempted.dispatched();
        debug!(candidate = %handle.name, url = %handle.url, ?state, "dispatching");
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, handle.send(envelope)).await {
            Ok(Ok(raw)) => Ok(ResponseNormalizer::normalize(raw)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DispatchError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
        };
        let elapsed = started.elapsed();

        if let Err(e) = &result {
            warn!(candidate = %handle.name, error = %e, "dispatch failed");
        }
        let state = state.settle(result.as_ref().err().map(DispatchError::failure_kind));

        if let Some(metrics) = &self.metrics {
            metrics
                .dispatch_latency_seconds
                .observe(elapsed.as_secs_f64());
            if let CandidateState::Failed(kind) = state {
                metrics
                    .dispatch_failures_total
                    .with_label_values(&[kind.as_str()])
                    .inc();
            }
        }

        Attempt {
            candidate: handle.name.clone(),
            state,
            result,
            elapsed,
        }
    }
}
