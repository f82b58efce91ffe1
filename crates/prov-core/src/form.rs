//! Form field descriptor interpreter
//!
//! Turns a [`FieldSpec`] into the ordered steps its sub-form needs, then
//! drives those steps through the [`UiDriver`]. Only the constraints the
//! field kind uses are read; everything else on the spec is ignored.

use crate::binding::FieldIds;
use crate::driver::UiDriver;
use crate::error::DriverError;
use crate::types::{FieldKind, FieldSpec, FieldValue};

/// One write against the open form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormStep {
    /// Type text into a field
    Fill {
        /// Logical field id
        field: String,
        /// Text
        value: String,
    },
    /// Pick an option
    Select {
        /// Logical field id
        field: String,
        /// Option label
        option: String,
    },
    /// Set a toggle
    Toggle {
        /// Logical field id
        field: String,
        /// Desired state
        on: bool,
    },
}

impl FormStep {
    fn fill(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Fill {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Step writing a desired value with the control its type implies
    #[must_use]
    pub fn for_value(field: &str, value: &FieldValue) -> Self {
        match value {
            FieldValue::Text(text) => Self::fill(field, text.trim()),
            FieldValue::Choice(option) => Self::Select {
                field: field.to_string(),
                option: option.trim().to_string(),
            },
            FieldValue::Flag(on) => Self::Toggle {
                field: field.to_string(),
                on: *on,
            },
        }
    }

    /// Field this step writes
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Fill { field, .. } | Self::Select { field, .. } | Self::Toggle { field, .. } => {
                field
            }
        }
    }

    /// Perform this step
    ///
    /// # Errors
    /// Whatever the driver reports.
    pub async fn apply(&self, driver: &dyn UiDriver) -> Result<(), DriverError> {
        tracing::trace!("form step {:?}", self);
        match self {
            Self::Fill { field, value } => driver.fill_field(field, value).await,
            Self::Select { field, option } => driver.select_option(field, option).await,
            Self::Toggle { field, on } => driver.set_toggle(field, *on).await,
        }
    }
}

impl FieldSpec {
    /// Steps populating this field's sub-form
    #[must_use]
    pub fn form_steps(&self, ids: &FieldIds) -> Vec<FormStep> {
        let mut steps = vec![FormStep::Select {
            field: ids.type_selector.clone(),
            option: self.kind.label().to_string(),
        }];

        if self.kind.uses_bounds() {
            if let Some(min) = &self.min {
                steps.push(FormStep::fill(&ids.min, min));
            }
            if let Some(max) = &self.max {
                steps.push(FormStep::fill(&ids.max, max));
            }
        }

        if self.kind == FieldKind::TextArea {
            if let Some(lines) = self.number_of_lines {
                steps.push(FormStep::fill(&ids.number_of_lines, lines.to_string()));
            }
        }

        if self.kind.is_select() {
            for (i, label) in self.options.iter().enumerate() {
                steps.push(FormStep::fill(ids.option_label_at(i), label));
                if let Some(value) = self.option_values.get(i) {
                    steps.push(FormStep::fill(ids.option_value_at(i), value));
                }
            }
            if self.allow_other {
                steps.push(FormStep::Toggle {
                    field: ids.allow_other.clone(),
                    on: true,
                });
            }
        }

        if let Some(message) = &self.tooltip_message {
            steps.push(FormStep::Toggle {
                field: ids.tooltip_toggle.clone(),
                on: true,
            });
            steps.push(FormStep::fill(&ids.tooltip_text, message));
        }

        steps
    }
}

/// Apply steps in order, stopping at the first driver error
///
/// # Errors
/// The first driver error encountered.
pub async fn apply_steps(driver: &dyn UiDriver, steps: &[FormStep]) -> Result<(), DriverError> {
    for step in steps {
        step.apply(driver).await?;
    }
    Ok(())
}
