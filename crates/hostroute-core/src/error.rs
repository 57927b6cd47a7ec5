use crate::types::FailureKind;
use thiserror::Error;

/// Failure of the registry lookup. Always fatal to the routing attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid keyword: {0:?}")]
    InvalidKeyword(String),

    #[error("top_k must be at least 1, got {0}")]
    InvalidTopK(usize),

    #[error("Registry transport error: {0}")]
    Transport(String),

    #[error("Registry returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to decode registry response: {0}")]
    Decode(String),

    #[error("Registry reported status '{status}' for request {request_id}")]
    Rejected { status: String, request_id: String },

    #[error("No agent candidates for keyword '{keyword}'")]
    NoCandidates { keyword: String },
}

/// Malformed candidate entry. Fatal to that candidate only; raised before any
/// network call is made to it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Candidate {candidate} has no URL")]
    MissingUrl { candidate: String },

    #[error("Candidate {candidate} has an invalid URL {url:?}: {reason}")]
    InvalidUrl {
        candidate: String,
        url: String,
        reason: String,
    },

    #[error("Candidate {candidate} URL {url:?} has unsupported scheme '{scheme}'")]
    UnsupportedScheme {
        candidate: String,
        url: String,
        scheme: String,
    },
}

/// Liveness probe failure. Excludes one candidate from dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Health probe to {url} timed out")]
    Timeout { url: String },

    #[error("Health probe to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Health probe to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Per-candidate send failure. Recorded, never propagated to siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Worker returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Worker returned error {code}: {message}")]
    Remote { code: i64, message: String },
}

impl DispatchError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            DispatchError::Timeout { .. } => FailureKind::Timeout,
            DispatchError::Transport(_) | DispatchError::Status { .. } => {
                FailureKind::TransportError
            }
            DispatchError::MalformedResponse(_) => FailureKind::MalformedResponse,
            DispatchError::Remote { .. } => FailureKind::RemoteError,
        }
    }
}

/// Informational: an outcome was excluded from the merged answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationWarning {
    #[error("Response from {candidate} carried no text and was left out of the merged answer")]
    NoText { candidate: String },

    #[error("Response from {candidate} was empty and was left out of the merged answer")]
    EmptyText { candidate: String },
}

impl AggregationWarning {
    pub fn candidate(&self) -> &str {
        match self {
            AggregationWarning::NoText { candidate }
            | AggregationWarning::EmptyText { candidate } => candidate,
        }
    }
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_failure_kinds() {
        assert_eq!(
            DispatchError::Timeout { after_ms: 10 }.failure_kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            DispatchError::Status {
                status: 502,
                body: String::new()
            }
            .failure_kind(),
            FailureKind::TransportError
        );
        assert_eq!(
            DispatchError::MalformedResponse("x".into()).failure_kind(),
            FailureKind::MalformedResponse
        );
        assert_eq!(
            DispatchError::Remote {
                code: -32600,
                message: "bad".into()
            }
            .failure_kind(),
            FailureKind::RemoteError
        );
    }

    #[test]
    fn registry_http_error_carries_status_and_body() {
        let err = RegistryError::Http {
            status: 401,
            body: "unauthorized".into(),
        };
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("unauthorized"));
    }
}
