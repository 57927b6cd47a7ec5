use crate::diagnostics::DiagnosticTrail;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Rendered in place of a response that yielded no text.
pub const NO_TEXT: &str = "(no text)";

/// Upper bound the registry accepts for `top_k`.
pub const MAX_TOP_K: usize = 50;

/// Guidance attached to the structured result for the upstream decision maker.
pub const FINAL_INSTRUCTIONS: &str = "When child agents return results:\n\
- NEVER mention their names.\n\
- NEVER output sentences like \"<name> Agent said\" or \"<name> Agent responded\".\n\
- ALWAYS merge the results into a single coherent natural language answer.\n\
- The final response MUST NOT explicitly list or quote sub agent responses.\n\
Your job is to give a clean final answer to the user.";

/// One routing attempt's registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryQuery {
    pub request_id: String,
    pub keyword: String,
    pub task: String,
    pub top_k: usize,
}

impl RegistryQuery {
    pub fn new(keyword: impl Into<String>, task: impl Into<String>, top_k: usize) -> Self {
        Self {
            request_id: format!("req-{}", Uuid::new_v4()),
            keyword: keyword.into(),
            task: task.into(),
            top_k,
        }
    }
}

/// A worker instance reported by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub agent_id: String,
    pub url: Option<String>,
    pub score: f64,
    pub version: String,
    pub description: Option<String>,
}

impl Candidate {
    /// Descriptor handed to callers: everything except `score` and `agent_id`.
    pub fn summary(&self) -> CandidateSummary {
        CandidateSummary {
            name: self.name.clone(),
            url: self.url.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub name: String,
    pub url: Option<String>,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Calling convention used against the reachable candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Every reachable candidate concurrently, results joined.
    #[default]
    FanOut,
    /// Candidates in score order, stop at the first success.
    FirstSuccess,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::FanOut => write!(f, "fan_out"),
            DispatchMode::FirstSuccess => write!(f, "first_success"),
        }
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fan_out" | "fanout" => Ok(DispatchMode::FanOut),
            "first_success" => Ok(DispatchMode::FirstSuccess),
            other => Err(format!(
                "Invalid dispatch mode: {}. Must be one of: fan_out, first_success",
                other
            )),
        }
    }
}

/// What gets sent to every candidate in one routing attempt.
///
/// `context_id` is generated once per logical session turn and reused for
/// every candidate call, so stateful workers can correlate retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub message_id: String,
    pub context_id: String,
    pub task_text: String,
}

impl DispatchEnvelope {
    pub fn new(
        task_text: impl Into<String>,
        context_id: Option<String>,
        message_id: Option<String>,
    ) -> Self {
        Self {
            message_id: message_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            context_id: context_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            task_text: task_text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    TransportError,
    MalformedResponse,
    RemoteError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::TransportError => "transport_error",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::RemoteError => "remote_error",
        }
    }
}

/// Per-candidate dispatch state. Only terminal states reach the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    Unattempted,
    Dispatched,
    Succeeded,
    Failed(FailureKind),
}

impl CandidateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CandidateState::Succeeded | CandidateState::Failed(_))
    }

    /// UNATTEMPTED -> DISPATCHED. Other states are left as they are.
    pub fn dispatched(self) -> Self {
        match self {
            CandidateState::Unattempted => CandidateState::Dispatched,
            other => other,
        }
    }

    /// DISPATCHED -> SUCCEEDED | FAILED. Other states are left as they are.
    pub fn settle(self, failure: Option<FailureKind>) -> Self {
        match self {
            CandidateState::Dispatched => match failure {
                Some(kind) => CandidateState::Failed(kind),
                None => CandidateState::Succeeded,
            },
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OutcomePayload {
    Text(String),
    Structured(Value),
    /// A successful reply that carried no text.
    NoText,
    Error(String),
}

/// Exactly one per attempted (or excluded) candidate, keyed by its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub candidate: String,
    pub status: OutcomeStatus,
    pub payload: OutcomePayload,
}

impl CandidateOutcome {
    pub fn text(candidate: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            status: OutcomeStatus::Success,
            payload: OutcomePayload::Text(text.into()),
        }
    }

    pub fn structured(candidate: impl Into<String>, value: Value) -> Self {
        Self {
            candidate: candidate.into(),
            status: OutcomeStatus::Success,
            payload: OutcomePayload::Structured(value),
        }
    }

    pub fn no_text(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            status: OutcomeStatus::Success,
            payload: OutcomePayload::NoText,
        }
    }

    pub fn error(candidate: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            status: OutcomeStatus::Error,
            payload: OutcomePayload::Error(detail.into()),
        }
    }

    pub fn unreachable(candidate: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            status: OutcomeStatus::Unreachable,
            payload: OutcomePayload::Error(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Text this outcome contributes to a merged answer, if any.
    ///
    /// Errors, no-text replies and whitespace-only text contribute nothing.
    pub fn contributed_text(&self) -> Option<String> {
        if !self.is_success() {
            return None;
        }
        match &self.payload {
            OutcomePayload::Text(text) => {
                if text.trim().is_empty() {
                    None
                } else {
                    Some(text.clone())
                }
            }
            OutcomePayload::Structured(value) => Some(value.to_string()),
            OutcomePayload::NoText | OutcomePayload::Error(_) => None,
        }
    }
}

impl fmt::Display for CandidateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            OutcomePayload::Text(text) => write!(f, "{}", text),
            OutcomePayload::Structured(value) => write!(f, "{}", value),
            OutcomePayload::NoText => f.write_str(NO_TEXT),
            OutcomePayload::Error(detail) => write!(f, "error: {}", detail),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Reachable,
    Unreachable,
    Misconfigured,
}

/// Connection setup result for one candidate, in candidate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub name: String,
    pub url: Option<String>,
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The single answer of a routing attempt plus everything needed to explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub keyword: String,
    pub task: String,
    pub context_id: String,
    pub mode: DispatchMode,
    pub merged_text: String,
    pub per_candidate: HashMap<String, CandidateOutcome>,
    /// Candidate iteration order; `per_candidate` keys in a deterministic order.
    pub candidate_order: Vec<String>,
    pub candidates: Vec<CandidateSummary>,
    pub connections: Vec<ConnectionRecord>,
    pub diagnostics: DiagnosticTrail,
}

impl AggregateResult {
    pub fn outcome(&self, candidate: &str) -> Option<&CandidateOutcome> {
        self.per_candidate.get(candidate)
    }

    pub fn ordered_outcomes(&self) -> impl Iterator<Item = &CandidateOutcome> {
        self.candidate_order
            .iter()
            .filter_map(|name| self.per_candidate.get(name))
    }

    /// True when no candidate produced a successful response.
    pub fn all_failed(&self) -> bool {
        !self.per_candidate.values().any(CandidateOutcome::is_success)
    }

    pub fn diagnostic_lines(&self) -> Vec<String> {
        self.diagnostics.lines()
    }

    /// Structured form consumed by the upstream decision maker.
    pub fn to_structured(&self) -> Value {
        let responses: serde_json::Map<String, Value> = self
            .ordered_outcomes()
            .map(|outcome| {
                let value = match &outcome.payload {
                    OutcomePayload::Text(text) => Value::String(text.clone()),
                    OutcomePayload::Structured(value) => value.clone(),
                    OutcomePayload::NoText => Value::String(NO_TEXT.to_string()),
                    OutcomePayload::Error(detail) => json!({ "error": detail }),
                };
                (outcome.candidate.clone(), value)
            })
            .collect();

        json!({
            "type": "multi_agent_response",
            "payload": {
                "keyword": self.keyword,
                "task": self.task,
                "context_id": self.context_id,
                "mode": self.mode,
                "candidates": self.candidates,
                "connections": self.connections,
                "responses": responses,
                "diagnostics": self.diagnostics.lines(),
                "merged_text": self.merged_text,
                "final_instructions": FINAL_INSTRUCTIONS,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_query_gets_prefixed_request_id() {
        let q = RegistryQuery::new("weather", "forecast for Paris", 3);
        assert!(q.request_id.starts_with("req-"));
        assert_eq!(q.top_k, 3);
    }

    #[test]
    fn envelope_keeps_caller_context_id() {
        let env = DispatchEnvelope::new("task", Some("ctx-1".into()), None);
        assert_eq!(env.context_id, "ctx-1");
        assert_eq!(env.message_id.len(), 32);

        let fresh = DispatchEnvelope::new("task", None, Some("m-1".into()));
        assert_eq!(fresh.message_id, "m-1");
        assert!(Uuid::parse_str(&fresh.context_id).is_ok());
    }

    #[test]
    fn dispatch_mode_parses_both_spellings() {
        assert_eq!("fan-out".parse::<DispatchMode>(), Ok(DispatchMode::FanOut));
        assert_eq!(
            "first_success".parse::<DispatchMode>(),
            Ok(DispatchMode::FirstSuccess)
        );
        assert!("round-robin".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn sentinel_and_blank_text_contribute_nothing() {
        assert_eq!(CandidateOutcome::no_text("a").contributed_text(), None);
        assert_eq!(CandidateOutcome::no_text("a").to_string(), NO_TEXT);
        assert_eq!(CandidateOutcome::text("a", "  \n").contributed_text(), None);
        assert_eq!(CandidateOutcome::error("a", "boom").contributed_text(), None);
        assert_eq!(
            CandidateOutcome::text("a", "sunny").contributed_text(),
            Some("sunny".to_string())
        );
        assert_eq!(
            CandidateOutcome::structured("a", json!({"t": 1})).contributed_text(),
            Some("{\"t\":1}".to_string())
        );
    }

    #[test]
    fn summary_drops_score_and_agent_id() {
        let c = Candidate {
            name: "W1".into(),
            agent_id: "id-1".into(),
            url: Some("http://h1".into()),
            score: 0.9,
            version: "1.0".into(),
            description: None,
        };
        let json = serde_json::to_value(c.summary()).unwrap();
        assert!(json.get("score").is_none());
        assert!(json.get("agent_id").is_none());
        assert_eq!(json["name"], "W1");
    }

    #[test]
    fn worker_text_equal_to_sentinel_is_kept() {
        let genuine = CandidateOutcome::text("a", NO_TEXT);
        assert_ne!(genuine, CandidateOutcome::no_text("a"));
        assert_eq!(genuine.contributed_text(), Some(NO_TEXT.to_string()));
    }

    #[test]
    fn candidate_state_walks_the_dispatch_machine() {
        let dispatched = CandidateState::Unattempted.dispatched();
        assert_eq!(dispatched, CandidateState::Dispatched);
        assert!(!dispatched.is_terminal());

        assert_eq!(dispatched.settle(None), CandidateState::Succeeded);
        assert_eq!(
            dispatched.settle(Some(FailureKind::Timeout)),
            CandidateState::Failed(FailureKind::Timeout)
        );
        assert_eq!(
            CandidateState::Unattempted.settle(None),
            CandidateState::Unattempted
        );
        assert_eq!(
            CandidateState::Succeeded.dispatched(),
            CandidateState::Succeeded
        );
    }
}
