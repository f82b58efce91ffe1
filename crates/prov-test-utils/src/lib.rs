//! Testing utilities for the provisioning workspace
//!
//! Simulated console, fixtures and tracing setup shared by integration
//! tests and the `simulate` command.

#![allow(missing_docs)]

mod console;

pub use console::{ConsoleStats, SimRow, SimulatedConsole};

use prov_core::{
    EngineConfig, EntityKind, FieldKind, FieldSpec, ProvisioningEngine, ResourceDescriptor,
    RetryPolicy, Session, UiDriver,
};
use std::sync::Arc;

/// Engine configuration with every pause set to zero
pub fn fast_config() -> EngineConfig {
    EngineConfig::new()
        .with_settle_delay_ms(0)
        .with_wait_timeout_ms(1_000)
        .with_category_retry(RetryPolicy::new(3, 0, 1))
        .with_pagination_retry(RetryPolicy::new(2, 0, 1))
}

pub fn setup_engine() -> ProvisioningEngine {
    ProvisioningEngine::new(fast_config())
}

/// Session driving `console` and capturing its responses
pub fn attach_session(console: &Arc<SimulatedConsole>) -> Session {
    let driver: Arc<dyn UiDriver> = Arc::clone(console) as Arc<dyn UiDriver>;
    Session::attach(driver, console.as_ref())
}

/// Console with `page_size` rows per page and an attached session
pub fn setup_console(page_size: usize) -> (Arc<SimulatedConsole>, Session) {
    let console = Arc::new(SimulatedConsole::new(page_size));
    let session = attach_session(&console);
    (console, session)
}

/// `General/PTPDate`, a single-line text field limited to 0..50
pub fn ptp_date() -> ResourceDescriptor {
    ResourceDescriptor::new(EntityKind::Field, "PTPDate")
        .with_category("General")
        .with_field(FieldSpec::new(FieldKind::TextSingleLine).with_bounds("0", "50"))
}

pub fn tag(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(EntityKind::Tag, name)
}

/// Install a test-writer subscriber once; later calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
