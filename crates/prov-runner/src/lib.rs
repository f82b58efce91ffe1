//! Provisioning runner
//!
//! Loads data-file rows, seeds a simulated console and runs the batch
//! through the provisioning engine. Also validates engine configuration
//! files.

#![warn(missing_docs)]

use anyhow::{bail, Context, Result};
use prov_core::{BatchItem, BatchReport, BatchRunner, EngineConfig, ProvisioningEngine, ResourceDescriptor};
use prov_test_utils::{attach_session, fast_config, SimulatedConsole};
use serde::de::DeserializeOwned;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options of the `simulate` command
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Data-file rows (YAML or JSON)
    pub rows: PathBuf,
    /// Engine configuration (TOML)
    pub config: Option<PathBuf>,
    /// Rows present in the console before the run (YAML or JSON)
    pub seed: Option<PathBuf>,
    /// Listing page size
    pub page_size: usize,
    /// Refreshes before a written row shows in its listing
    pub listing_lag: u32,
    /// Zero every pause unless a config file is given
    pub fast: bool,
}

impl SimulateOptions {
    /// Options for `rows` with defaults for everything else
    #[must_use]
    pub fn new(rows: impl Into<PathBuf>) -> Self {
        Self {
            rows: rows.into(),
            config: None,
            seed: None,
            page_size: 10,
            listing_lag: 0,
            fast: false,
        }
    }
}

/// Install the global tracing subscriber
///
/// Filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Parse a YAML or JSON data file, chosen by extension
///
/// # Errors
/// Unreadable file, unknown extension or malformed content.
pub fn load_data<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml" | "yml") => serde_yaml::from_str(&text)
            .with_context(|| format!("invalid YAML in {}", path.display())),
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.display())),
        _ => bail!(
            "{}: expected a .yaml, .yml or .json file",
            path.display()
        ),
    }
}

/// Load batch rows
///
/// # Errors
/// See [`load_data`].
pub fn load_rows(path: &Path) -> Result<Vec<BatchItem>> {
    let rows: Vec<BatchItem> = load_data(path)?;
    tracing::debug!("Loaded {} row(s) from {}", rows.len(), path.display());
    Ok(rows)
}

/// Load and validate an engine configuration file
///
/// # Errors
/// Unreadable, malformed or invalid configuration.
pub fn check_config(path: &Path) -> Result<EngineConfig> {
    EngineConfig::load(path).with_context(|| format!("config {}", path.display()))
}

/// Seed a console and run `options.rows` through the engine
///
/// # Errors
/// Only for unusable inputs; row failures are reported in the
/// [`BatchReport`].
pub async fn simulate(options: &SimulateOptions) -> Result<BatchReport> {
    let config = match (&options.config, options.fast) {
        (Some(path), _) => check_config(path)?,
        (None, true) => fast_config(),
        (None, false) => EngineConfig::new(),
    };
    let rows = load_rows(&options.rows)?;

    let console = Arc::new(SimulatedConsole::new(options.page_size));
    if let Some(seed) = &options.seed {
        let seeded: Vec<ResourceDescriptor> = load_data(seed)?;
        tracing::info!("Seeding console with {} row(s)", seeded.len());
        for descriptor in &seeded {
            console.seed_descriptor(descriptor);
        }
    }
    console.set_listing_lag(options.listing_lag);

    let session = attach_session(&console);
    let runner = BatchRunner::new(ProvisioningEngine::new(config));
    let report = runner.run(&session, &rows).await;

    let stats = console.stats();
    tracing::info!(
        page_reads = stats.page_reads,
        submits = stats.submits,
        captured = session.capture().len(),
        "Simulation finished"
    );
    Ok(report)
}

/// Plain-text rendering of a report
#[must_use]
pub fn render_report(report: &BatchReport) -> String {
    let mut out = String::new();
    for entry in &report.entries {
        let _ = writeln!(out, "{:<40} {}", entry.label, entry.outcome);
    }
    let _ = writeln!(out, "{}", report.summary());
    out
}
