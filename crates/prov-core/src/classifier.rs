//! Outcome classification of a submission window
//!
//! Rules, first match wins:
//! 1. any 409 → [`Classification::Conflict`]
//! 2. any status >= 400 → [`Classification::ValidationFailure`]
//! 3. otherwise → [`Classification::Success`]

use prov_capture::{ApiCallRecord, CaptureStream, CaptureWindow};

/// Verdict on the calls captured during one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// No failed calls
    Success,
    /// Server reported the target as already existing; failed calls
    /// (the 409 included) attached
    Conflict(Vec<ApiCallRecord>),
    /// Server rejected the submission; failed calls attached
    ValidationFailure(Vec<ApiCallRecord>),
}

/// Classifies captured calls
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeClassifier;

impl OutcomeClassifier {
    /// Create classifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify a set of calls
    #[must_use]
    pub fn classify(&self, calls: &[ApiCallRecord]) -> Classification {
        let failed: Vec<_> = calls.iter().filter(|c| c.is_failure()).cloned().collect();
        if failed.iter().any(ApiCallRecord::is_conflict) {
            Classification::Conflict(failed)
        } else if failed.is_empty() {
            Classification::Success
        } else {
            Classification::ValidationFailure(failed)
        }
    }

    /// Classify the calls captured since `window` was opened
    #[must_use]
    pub fn classify_window(&self, stream: &CaptureStream, window: &CaptureWindow) -> Classification {
        let calls = window.calls(stream);
        let verdict = self.classify(&calls);
        tracing::debug!(
            "classified {} call(s) from index {}: {:?}",
            calls.len(),
            window.start(),
            verdict
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_capture::{ObservedResponse, ResourceKind};

    fn call(status: u16) -> ApiCallRecord {
        ApiCallRecord::from_response(ObservedResponse::new("POST", "/api/field", status))
    }

    #[test]
    fn empty_window_is_success() {
        assert_eq!(OutcomeClassifier::new().classify(&[]), Classification::Success);
    }

    #[test]
    fn ok_statuses_are_success() {
        let calls = [call(200), call(201), call(304)];
        assert_eq!(OutcomeClassifier::new().classify(&calls), Classification::Success);
    }

    #[test]
    fn conflict_takes_priority_over_other_failures() {
        let calls = [call(500), call(409), call(422)];
        match OutcomeClassifier::new().classify(&calls) {
            Classification::Conflict(failed) => {
                let statuses: Vec<_> = failed.iter().map(|c| c.status).collect();
                assert_eq!(statuses, vec![500, 409, 422]);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn failures_are_attached() {
        let calls = [call(201), call(422), call(503)];
        match OutcomeClassifier::new().classify(&calls) {
            Classification::ValidationFailure(failed) => {
                let statuses: Vec<_> = failed.iter().map(|c| c.status).collect();
                assert_eq!(statuses, vec![422, 503]);
            }
            other => panic!("expected ValidationFailure, got {other:?}"),
        }
    }

    #[test]
    fn window_ignores_earlier_calls() {
        let stream = CaptureStream::new();
        stream.record(ObservedResponse::new("POST", "/api/field", 409).with_kind(ResourceKind::Xhr));

        let window = stream.window();
        stream.record(ObservedResponse::new("POST", "/api/field", 201).with_kind(ResourceKind::Xhr));

        assert_eq!(
            OutcomeClassifier::new().classify_window(&stream, &window),
            Classification::Success
        );
    }
}
