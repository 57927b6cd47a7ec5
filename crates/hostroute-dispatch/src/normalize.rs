//! Canonical text extraction from worker replies.
//!
//! Precedence, first match wins:
//! 1. plain text passes through unchanged;
//! 2. a task's first artifact, first text-bearing part;
//! 3. a task's history (or a lone message treated as a one-turn history):
//!    the last agent turn, first text-bearing part;
//! 4. any other JSON value is kept as structured data;
//! 5. otherwise [`Normalized::NoText`].

use hostroute_core::{CandidateOutcome, Message, RawResponse, Task, NO_TEXT};
use serde_json::Value;
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Text(String),
    Structured(Value),
    NoText,
}

impl Normalized {
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Normalized::Text(text) => Cow::Borrowed(text),
            Normalized::Structured(value) => Cow::Owned(value.to_string()),
            Normalized::NoText => Cow::Borrowed(NO_TEXT),
        }
    }

    pub fn into_outcome(self, candidate: impl Into<String>) -> CandidateOutcome {
        match self {
            Normalized::Text(text) => CandidateOutcome::text(candidate, text),
            Normalized::Structured(value) => CandidateOutcome::structured(candidate, value),
            Normalized::NoText => CandidateOutcome::no_text(candidate),
        }
    }
}

pub struct ResponseNormalizer;

impl ResponseNormalizer {
    pub fn normalize(raw: RawResponse) -> Normalized {
        match raw {
            RawResponse::Text(text) => Normalized::Text(text),
            RawResponse::Task(task) => Self::from_task(&task),
            RawResponse::Message(message) => Self::from_history(std::slice::from_ref(&message)),
            RawResponse::Structured(value) => Normalized::Structured(value),
            RawResponse::Empty => Normalized::NoText,
        }
    }

    fn from_task(task: &Task) -> Normalized {
        let from_artifact = task
            .artifacts
            .as_ref()
            .and_then(|artifacts| artifacts.first())
            .and_then(|artifact| artifact.first_text());
        if let Some(text) = from_artifact {
            return Normalized::Text(text.to_string());
        }

        match &task.history {
            Some(history) => Self::from_history(history),
            None => Normalized::NoText,
        }
    }

    fn from_history(history: &[Message]) -> Normalized {
        history
            .iter()
            .rev()
            .find(|m| m.is_agent())
            .and_then(Message::first_text)
            .map(|text| Normalized::Text(text.to_string()))
            .unwrap_or(Normalized::NoText)
    }
}
