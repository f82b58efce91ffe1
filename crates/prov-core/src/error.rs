//! Error types for the provisioning engine
//!
//! Two layers:
//! - [`DriverError`]: faults reported by the UI driver collaborator
//! - [`ProvisionError`]: internal failure of one provisioning step
//!
//! Neither escapes the engine's public operations. A [`ProvisionError`] is
//! converted into a [`Failure`] carried by `ProvisionOutcome::Failed`.

use crate::types::{Failure, ProvisionOutcome};
use prov_capture::ApiCallRecord;
use serde::{Deserialize, Serialize};

/// Errors reported by a [`UiDriver`](crate::driver::UiDriver)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Element could not be located
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// Element located but not interactable (covered, disabled, detached)
    #[error("element not interactable: {0}")]
    NotInteractable(String),

    /// Dropdown does not (yet) offer the requested option
    #[error("option {option:?} not available in {field}")]
    OptionUnavailable {
        /// Logical field id
        field: String,
        /// Requested option
        option: String,
    },

    /// A bounded wait expired
    #[error("timed out after {after_ms}ms waiting for {target}")]
    Timeout {
        /// What was being waited for
        target: String,
        /// Elapsed limit in milliseconds
        after_ms: u64,
    },

    /// Form operation issued with no form open
    #[error("no form is open")]
    NoOpenForm,

    /// Anything else
    #[error("driver failure: {0}")]
    Other(String),
}

impl DriverError {
    /// Check if the fault is a race that may clear on its own
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound(_)
                | Self::NotInteractable(_)
                | Self::OptionUnavailable { .. }
                | Self::Timeout { .. }
        )
    }
}

/// Failure classification attached to `ProvisionOutcome::Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Descriptor missing required keys, or kind not bound
    InputContractViolation,
    /// Form never became usable within the retry budget
    TransientFormRace,
    /// Server rejected the submission
    ValidationFailure,
    /// Write reported success but the entity is not observable
    VerificationMismatch,
    /// Update requested for an entity that does not exist
    NotPresentForUpdate,
    /// A bounded wait expired
    Timeout,
    /// Unexpected driver fault
    Driver,
}

impl FailureReason {
    /// Stable snake_case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputContractViolation => "input_contract_violation",
            Self::TransientFormRace => "transient_form_race",
            Self::ValidationFailure => "validation_failure",
            Self::VerificationMismatch => "verification_mismatch",
            Self::NotPresentForUpdate => "not_present_for_update",
            Self::Timeout => "timeout",
            Self::Driver => "driver",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single provisioning step
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Descriptor violates the input contract
    #[error("input contract violation: {0}")]
    InputContract(String),

    /// Form race persisted through every retry
    #[error("form not ready after {attempts} attempts: {last}")]
    TransientFormRace {
        /// Attempts made
        attempts: u32,
        /// Last driver error seen
        last: DriverError,
    },

    /// Server answered the submission with a non-conflict failure
    #[error("submission rejected ({} failed call(s))", .failed_calls.len())]
    ValidationFailure {
        /// Failed calls captured in the submission window
        failed_calls: Vec<ApiCallRecord>,
    },

    /// Entity not observable after a write
    #[error("{entity} not observable after write")]
    VerificationMismatch {
        /// Entity label
        entity: String,
        /// Near matches seen while re-verifying
        similar: Vec<String>,
    },

    /// Update target does not exist
    #[error("{entity} not present for update")]
    NotPresentForUpdate {
        /// Entity label
        entity: String,
        /// Near matches seen while resolving
        similar: Vec<String>,
    },

    /// Bounded wait expired
    #[error("timed out after {after_ms}ms: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Limit in milliseconds
        after_ms: u64,
    },

    /// Driver fault
    #[error("driver error: {0}")]
    Driver(DriverError),
}

impl ProvisionError {
    /// Create input contract violation
    #[inline]
    pub fn input_contract(message: impl Into<String>) -> Self {
        Self::InputContract(message.into())
    }

    /// Failure classification for this error
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::InputContract(_) => FailureReason::InputContractViolation,
            Self::TransientFormRace { .. } => FailureReason::TransientFormRace,
            Self::ValidationFailure { .. } => FailureReason::ValidationFailure,
            Self::VerificationMismatch { .. } => FailureReason::VerificationMismatch,
            Self::NotPresentForUpdate { .. } => FailureReason::NotPresentForUpdate,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::Driver(_) => FailureReason::Driver,
        }
    }

    /// Convert into the failure value returned to callers
    #[must_use]
    pub fn into_failure(self) -> Failure {
        let reason = self.reason();
        let detail = self.to_string();
        let mut failure = Failure::new(reason, detail);
        match self {
            Self::ValidationFailure { failed_calls } => {
                failure.failed_calls = failed_calls;
            }
            Self::VerificationMismatch { similar, .. } | Self::NotPresentForUpdate { similar, .. } => {
                failure.similar_candidates = similar;
            }
            _ => {}
        }
        failure
    }

    /// Convert into a failed outcome
    #[inline]
    #[must_use]
    pub fn into_outcome(self) -> ProvisionOutcome {
        ProvisionOutcome::Failed(self.into_failure())
    }
}

impl From<DriverError> for ProvisionError {
    fn from(value: DriverError) -> Self {
        match value {
            DriverError::Timeout { target, after_ms } => Self::Timeout {
                operation: target,
                after_ms,
            },
            other => Self::Driver(other),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML did not parse
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed but semantically invalid
    #[error("invalid config: {0}")]
    Invalid(String),
}
