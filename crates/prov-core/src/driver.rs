//! Boundary with the browser automation driver
//!
//! The engine never locates elements itself. Everything it needs from the
//! page goes through [`UiDriver`], addressed by logical ids taken from a
//! [`FormBinding`](crate::binding::FormBinding).

use crate::error::DriverError;
use async_trait::async_trait;
use std::time::Duration;

/// Result of pressing a listing's "next page" control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAdvance {
    /// Control was present and enabled; listing moved on
    Advanced,
    /// No control on the page
    Absent,
    /// Control present but disabled
    Disabled,
}

/// Named action that opens a form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormAction {
    /// Open a blank creation form
    Create {
        /// Action name (e.g. button label)
        action: String,
    },
    /// Open the edit form of an existing listing row
    Edit {
        /// Action name
        action: String,
        /// Listing text identifying the row
        row: String,
        /// Category of the row, for category-scoped listings
        category: Option<String>,
    },
}

impl FormAction {
    /// Action name
    #[inline]
    #[must_use]
    pub fn action(&self) -> &str {
        match self {
            Self::Create { action } | Self::Edit { action, .. } => action,
        }
    }
}

impl std::fmt::Display for FormAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create { action } => write!(f, "{action}"),
            Self::Edit { action, row, .. } => write!(f, "{action} [{row}]"),
        }
    }
}

/// Page-level operations the engine relies on
///
/// Every method is a suspension point. Implementations must bound their own
/// waits; the engine additionally bounds each call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// Text of `column` for every row of the current listing page
    async fn read_column(&self, column: &str) -> Result<Vec<String>, DriverError>;

    /// Return the listing to its first page
    async fn first_page(&self) -> Result<(), DriverError>;

    /// Press the listing's "next page" control
    async fn next_page(&self) -> Result<PageAdvance, DriverError>;

    /// Open a creation or edit form
    async fn open_form(&self, action: &FormAction) -> Result<(), DriverError>;

    /// Type `value` into a text-like field, replacing its content
    async fn fill_field(&self, field: &str, value: &str) -> Result<(), DriverError>;

    /// Pick `option` in a dropdown or radio group
    async fn select_option(&self, field: &str, option: &str) -> Result<(), DriverError>;

    /// Set a checkbox or switch
    async fn set_toggle(&self, field: &str, on: bool) -> Result<(), DriverError>;

    /// Current value of a field, `None` if it has none
    async fn read_field(&self, field: &str) -> Result<Option<String>, DriverError>;

    /// Submit the open form
    async fn submit_form(&self) -> Result<(), DriverError>;

    /// Close the open form without submitting
    async fn cancel_form(&self) -> Result<(), DriverError>;

    /// Wait until `selector` is visible
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait until `selector` is hidden
    async fn wait_hidden(&self, selector: &str, timeout: Duration) -> Result<(), DriverError>;
}
