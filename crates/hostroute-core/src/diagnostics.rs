//! Typed diagnostic trail.
//!
//! Every registry, configuration, connection and dispatch failure of a routing
//! attempt lands here as one entry, together with aggregation warnings. The
//! trail is returned to the caller next to the merged answer and is the only
//! way to tell "every candidate failed" apart from "every candidate answered
//! with nothing". Recording never fails.

use crate::error::{
    AggregationWarning, ConfigurationError, ConnectionError, DispatchError, RegistryError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStage {
    Registry,
    Configuration,
    Connection,
    Dispatch,
    Aggregation,
}

impl fmt::Display for DiagnosticStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticStage::Registry => "registry",
            DiagnosticStage::Configuration => "configuration",
            DiagnosticStage::Connection => "connection",
            DiagnosticStage::Dispatch => "dispatch",
            DiagnosticStage::Aggregation => "aggregation",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub stage: DiagnosticStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl DiagnosticEntry {
    /// Warnings are informational; everything else is a failure.
    pub fn is_failure(&self) -> bool {
        self.stage != DiagnosticStage::Aggregation
    }
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.candidate {
            Some(candidate) => write!(f, "[{}] {}: {}", self.stage, candidate, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticTrail {
    entries: Vec<DiagnosticEntry>,
}

impl DiagnosticTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        stage: DiagnosticStage,
        candidate: Option<&str>,
        message: impl Into<String>,
    ) {
        self.entries.push(DiagnosticEntry {
            stage,
            candidate: candidate.map(str::to_string),
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn registry_failure(&mut self, err: &RegistryError) {
        self.record(DiagnosticStage::Registry, None, err.to_string());
    }

    pub fn configuration_failure(&mut self, candidate: &str, err: &ConfigurationError) {
        self.record(
            DiagnosticStage::Configuration,
            Some(candidate),
            err.to_string(),
        );
    }

    pub fn connection_failure(&mut self, candidate: &str, err: &ConnectionError) {
        self.record(DiagnosticStage::Connection, Some(candidate), err.to_string());
    }

    pub fn dispatch_failure(&mut self, candidate: &str, err: &DispatchError) {
        self.record(DiagnosticStage::Dispatch, Some(candidate), err.to_string());
    }

    pub fn aggregation_warning(&mut self, warning: &AggregationWarning) {
        self.record(
            DiagnosticStage::Aggregation,
            Some(warning.candidate()),
            warning.to_string(),
        );
    }

    pub fn extend(&mut self, other: DiagnosticTrail) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn failures(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries.iter().filter(|e| e.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
