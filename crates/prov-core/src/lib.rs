//! Provisioning Core - idempotent entity provisioning
//!
//! Drives a web administration console through a [`UiDriver`] so that
//! configuration entities end up present (and, on request, matching a
//! desired state) no matter how often a run is repeated:
//! - Resolves entities against paginated listings with tiered matching
//! - Creates only what is absent, updates only what differs
//! - Judges every write from the server's captured responses
//! - Re-verifies each write against the listing
//!
//! # Example
//!
//! ```rust,ignore
//! use prov_core::prelude::*;
//!
//! # async fn example(driver: Arc<dyn UiDriver>, feed: &dyn ResponseFeed) {
//! let session = Session::attach(driver, feed);
//! let engine = ProvisioningEngine::new(EngineConfig::new());
//!
//! let ptp = ResourceDescriptor::new(EntityKind::Field, "PTPDate")
//!     .with_category("General")
//!     .with_field(FieldSpec::new(FieldKind::TextSingleLine).with_bounds("0", "50"));
//!
//! match engine.ensure_exists(&session, &ptp).await {
//!     ProvisionOutcome::Created | ProvisionOutcome::AlreadyExists => {}
//!     other => eprintln!("{other}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod batch;
pub mod binding;
pub mod classifier;
pub mod config;
pub mod driver;
pub mod error;
pub mod form;
pub mod matcher;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod types;
pub mod workflow;

// Re-exports for convenience
pub use batch::{BatchEntry, BatchItem, BatchReport, BatchRunner};
pub use binding::{BindingRegistry, FieldIds, FormBinding};
pub use classifier::{Classification, OutcomeClassifier};
pub use config::EngineConfig;
pub use driver::{FormAction, PageAdvance, UiDriver};
pub use error::{ConfigError, DriverError, FailureReason, ProvisionError};
pub use form::{apply_steps, FormStep};
pub use resolver::{validate_descriptor, EntityResolver};
pub use retry::{bounded, retry_with_backoff, RetryError, RetryPolicy};
pub use session::Session;
pub use types::{
    DesiredState, EntityKind, Failure, FieldKind, FieldSpec, FieldValue, MatchResult, MatchTier,
    ProvisionOutcome, ResourceDescriptor, SessionId,
};
pub use workflow::ProvisioningEngine;

pub use prov_capture::{
    ApiCallRecord, CaptureStream, CaptureWindow, ObservedResponse, ResourceKind, ResponseFeed,
    ResponseListener,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for provisioning runs
    pub use crate::{
        BatchItem, BatchReport, BatchRunner, DesiredState, EngineConfig, EntityKind, FieldKind,
        FieldSpec, FormBinding, ProvisionOutcome, ProvisioningEngine, ResourceDescriptor,
        ResponseFeed, Session, UiDriver,
    };
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
