use hostroute_core::{
    AggregationConfig, AggregationWarning, CandidateOutcome, DiagnosticTrail, OutcomePayload,
};
use tracing::debug;

/// Merges per-candidate outcomes into the single caller-visible answer.
pub struct ResultAggregator {
    redact_names: bool,
    delimiter: String,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self {
            redact_names: true,
            delimiter: "\n\n".to_string(),
        }
    }
}

impl From<&AggregationConfig> for ResultAggregator {
    fn from(cfg: &AggregationConfig) -> Self {
        Self::new(cfg.redact_candidate_names, cfg.delimiter.clone())
    }
}

impl ResultAggregator {
    pub fn new(redact_names: bool, delimiter: impl Into<String>) -> Self {
        Self {
            redact_names,
            delimiter: delimiter.into(),
        }
    }

    pub fn redacts_names(&self) -> bool {
        self.redact_names
    }

    /// Join contributed texts in the given order. Successful outcomes that
    /// carry no text stay out of the answer and leave a warning in `trail`;
    /// failed outcomes are skipped, their failure is already recorded.
    pub fn merge(&self, outcomes: &[&CandidateOutcome], trail: &mut DiagnosticTrail) -> String {
        let mut sections = Vec::new();

        for outcome in outcomes {
            if !outcome.is_success() {
                continue;
            }
            match outcome.contributed_text() {
                Some(text) if self.redact_names => sections.push(text.trim().to_string()),
                Some(text) => sections.push(format!("[{}]\n{}", outcome.candidate, text.trim())),
                None => {
                    let warning = match &outcome.payload {
                        OutcomePayload::NoText => AggregationWarning::NoText {
                            candidate: outcome.candidate.clone(),
                        },
                        _ => AggregationWarning::EmptyText {
                            candidate: outcome.candidate.clone(),
                        },
                    };
                    debug!("{}", warning);
                    trail.aggregation_warning(&warning);
                }
            }
        }

        sections.join(&self.delimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostroute_core::{DiagnosticStage, NO_TEXT};
    use serde_json::json;

    #[test]
    fn merges_in_given_order_and_skips_empties() {
        let outcomes = [
            CandidateOutcome::text("W1", "sunny"),
            CandidateOutcome::no_text("W2"),
            CandidateOutcome::error("W3", "timed out"),
            CandidateOutcome::text("W4", "  "),
            CandidateOutcome::structured("W5", json!({"temp": 21})),
        ];
        let refs: Vec<_> = outcomes.iter().collect();
        let mut trail = DiagnosticTrail::new();

        let merged = ResultAggregator::default().merge(&refs, &mut trail);

        assert_eq!(merged, "sunny\n\n{\"temp\":21}");
        assert!(!merged.contains("W1"));
        assert_eq!(trail.len(), 2);
        assert!(trail
            .entries()
            .iter()
            .all(|e| e.stage == DiagnosticStage::Aggregation));
        assert!(!trail.has_failures());
    }

    #[test]
    fn names_appear_only_when_redaction_is_off() {
        let outcomes = [
            CandidateOutcome::text("W1", "sunny"),
            CandidateOutcome::text("W2", "mild"),
        ];
        let refs: Vec<_> = outcomes.iter().collect();
        let mut trail = DiagnosticTrail::new();

        let merged = ResultAggregator::new(false, "\n---\n").merge(&refs, &mut trail);
        assert_eq!(merged, "[W1]\nsunny\n---\n[W2]\nmild");
    }

    #[test]
    fn worker_text_equal_to_sentinel_is_merged() {
        let outcomes = [
            CandidateOutcome::text("W1", NO_TEXT),
            CandidateOutcome::no_text("W2"),
        ];
        let refs: Vec<_> = outcomes.iter().collect();
        let mut trail = DiagnosticTrail::new();

        let merged = ResultAggregator::default().merge(&refs, &mut trail);

        assert_eq!(merged, NO_TEXT);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.entries()[0].candidate.as_deref(), Some("W2"));
    }

    #[test]
    fn all_failures_merge_to_empty() {
        let outcomes = [CandidateOutcome::error("W1", "boom")];
        let refs: Vec<_> = outcomes.iter().collect();
        let mut trail = DiagnosticTrail::new();
        assert_eq!(ResultAggregator::default().merge(&refs, &mut trail), "");
        assert!(trail.is_empty());
    }
}
