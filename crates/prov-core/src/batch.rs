//! Batch provisioning
//!
//! Runs the engine over data-file rows, one row at a time. A failed row is
//! logged and recorded; it never stops the rows after it.

use crate::session::Session;
use crate::types::{DesiredState, ProvisionOutcome, ResourceDescriptor};
use crate::workflow::ProvisioningEngine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One data-file row
///
/// Rows with a `desired` block are updates; all others ensure existence.
///
/// ```yaml
/// - kind: field
///   category: General
///   name: PTPDate
///   field: { kind: TextSingleLine, min: "0", max: "50" }
/// - kind: tag
///   name: VIP
///   desired:
///     color: { type: text, value: Gold }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Entity to provision
    #[serde(flatten)]
    pub descriptor: ResourceDescriptor,
    /// Field values for an update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<DesiredState>,
}

impl BatchItem {
    /// Row ensuring `descriptor` exists
    #[inline]
    #[must_use]
    pub fn ensure(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            desired: None,
        }
    }

    /// Row bringing `descriptor` to `desired`
    #[inline]
    #[must_use]
    pub fn update(descriptor: ResourceDescriptor, desired: DesiredState) -> Self {
        Self {
            descriptor,
            desired: Some(desired),
        }
    }

    /// Whether this row is an update
    #[inline]
    #[must_use]
    pub fn is_update(&self) -> bool {
        self.desired.is_some()
    }
}

/// Outcome of one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Row label (`kind:category/name`)
    pub label: String,
    /// Outcome returned by the engine
    pub outcome: ProvisionOutcome,
}

/// Outcomes of a batch, in row order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Per-row outcomes
    pub entries: Vec<BatchEntry>,
    /// Rows per outcome name
    pub counts: BTreeMap<String, usize>,
}

impl BatchReport {
    /// Create empty report
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row's outcome
    pub fn push(&mut self, label: impl Into<String>, outcome: ProvisionOutcome) {
        *self.counts.entry(outcome.as_str().to_string()).or_default() += 1;
        self.entries.push(BatchEntry {
            label: label.into(),
            outcome,
        });
    }

    /// Rows with the given outcome name (e.g. `"created"`)
    #[must_use]
    pub fn count(&self, outcome: &str) -> usize {
        self.counts.get(outcome).copied().unwrap_or(0)
    }

    /// Failed rows
    pub fn failed(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    /// Whether any row failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no rows ran
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One-line summary, e.g. `3 item(s): created=2 failed=1`
    #[must_use]
    pub fn summary(&self) -> String {
        let counts: Vec<_> = self
            .counts
            .iter()
            .map(|(outcome, n)| format!("{outcome}={n}"))
            .collect();
        format!("{} item(s): {}", self.len(), counts.join(" "))
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Runs rows through a [`ProvisioningEngine`]
#[derive(Debug, Clone)]
pub struct BatchRunner {
    engine: ProvisioningEngine,
}

impl BatchRunner {
    /// Create runner
    #[inline]
    #[must_use]
    pub fn new(engine: ProvisioningEngine) -> Self {
        Self { engine }
    }

    /// Underlying engine
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &ProvisioningEngine {
        &self.engine
    }

    /// Provision every row in order
    pub async fn run(&self, session: &Session, items: &[BatchItem]) -> BatchReport {
        tracing::info!("Running batch of {} item(s)", items.len());
        let mut report = BatchReport::new();

        for (index, item) in items.iter().enumerate() {
            let label = item.descriptor.label();
            let outcome = match &item.desired {
                Some(desired) => {
                    self.engine
                        .ensure_matches(session, &item.descriptor, desired)
                        .await
                }
                None => self.engine.ensure_exists(session, &item.descriptor).await,
            };

            if let Some(failure) = outcome.failure() {
                tracing::error!("row {} ({}) failed: {}", index + 1, label, failure);
            }
            report.push(label, outcome);
        }

        tracing::info!("Batch finished: {}", report.summary());
        report
    }
}
