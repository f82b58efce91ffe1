//! In-memory admin console
//!
//! Implements [`UiDriver`] and [`ResponseFeed`] over a set of listings keyed
//! by slug (`tag`, `field`, ...). Selectors and actions follow the naming
//! of `FormBinding::for_kind`: `#<slug>-listing`, `#<slug>-form`,
//! `add_<slug>`, `edit_<slug>` and `/api/<slug>`.
//!
//! Faults can be injected to reproduce what real consoles do: rejected
//! submissions, listings that lag behind writes, category dropdowns that
//! populate late and "next" controls that never disable.

use async_trait::async_trait;
use parking_lot::Mutex;
use prov_capture::{ObservedResponse, ResourceKind, ResponseFeed, ResponseListener};
use prov_core::matcher::collapse_whitespace;
use prov_core::{DriverError, FormAction, PageAdvance, ResourceDescriptor, UiDriver};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

const NAME_COLUMN: &str = "name";
const CATEGORY_COLUMN: &str = "category";

/// One listing row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRow {
    pub name: String,
    pub category: Option<String>,
    pub fields: BTreeMap<String, String>,
    /// Listing refreshes left before the row shows up
    pending_refreshes: u32,
}

impl SimRow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            fields: BTreeMap::new(),
            pending_refreshes: 0,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    fn is_visible(&self) -> bool {
        self.pending_refreshes == 0
    }

    /// Server-side uniqueness: same name and category, ignoring case and spacing
    fn same_key(&self, name: &str, category: Option<&str>) -> bool {
        fn key(s: &str) -> String {
            collapse_whitespace(s).to_lowercase()
        }
        key(&self.name) == key(name)
            && self.category.as_deref().map(key) == category.map(key)
    }
}

/// Interaction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleStats {
    /// Reads of a listing's name column
    pub page_reads: usize,
    /// Presses of a "next" control
    pub next_clicks: usize,
    /// Forms opened
    pub forms_opened: usize,
    /// Form submissions
    pub submits: usize,
    /// Rows created by submissions
    pub rows_created: usize,
    /// Rows changed by submissions
    pub rows_updated: usize,
}

#[derive(Debug, Clone)]
enum FormMode {
    Create,
    Edit { index: usize },
}

#[derive(Debug, Clone)]
struct OpenForm {
    slug: String,
    mode: FormMode,
    values: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct ConsoleState {
    listings: HashMap<String, Vec<SimRow>>,
    current: Option<String>,
    page: usize,
    form: Option<OpenForm>,
    stats: ConsoleStats,
    // faults
    injected_statuses: VecDeque<u16>,
    category_failures: u32,
    listing_lag: u32,
    next_never_disables: bool,
    stalled_reads: u32,
    read_stall: Duration,
}

/// Simulated console driving one in-memory session
pub struct SimulatedConsole {
    page_size: usize,
    state: Mutex<ConsoleState>,
    listeners: Mutex<Vec<Arc<dyn ResponseListener>>>,
}

impl SimulatedConsole {
    /// Create console whose listings show `page_size` rows per page
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: Mutex::new(ConsoleState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Add a row to the `slug` listing
    pub fn seed(&self, slug: &str, row: SimRow) {
        self.state
            .lock()
            .listings
            .entry(slug.to_string())
            .or_default()
            .push(row);
    }

    /// Add the row a descriptor would create
    pub fn seed_descriptor(&self, descriptor: &ResourceDescriptor) {
        let mut row = SimRow::new(descriptor.name.trim());
        row.category = descriptor.category.as_deref().map(|c| c.trim().to_string());
        if let Some(display_name) = &descriptor.display_name {
            row.fields.insert("display_name".into(), display_name.clone());
        }
        self.seed(descriptor.kind.as_str(), row);
    }

    /// Answer the next submissions with these statuses, in order
    ///
    /// An injected 409 on a creation also stores the row, as if another
    /// writer had won the race. Injected failures on an edit, and every
    /// other injected failure, leave the listing untouched.
    pub fn inject_statuses(&self, statuses: impl IntoIterator<Item = u16>) {
        self.state.lock().injected_statuses.extend(statuses);
    }

    /// Make the next `n` category selections fail as not yet populated
    pub fn fail_category_selects(&self, n: u32) {
        self.state.lock().category_failures = n;
    }

    /// Hide newly written rows until the listing has been refreshed `n` times
    pub fn set_listing_lag(&self, n: u32) {
        self.state.lock().listing_lag = n;
    }

    /// Make the next `n` column reads take `delay` before answering
    pub fn stall_reads(&self, n: u32, delay: Duration) {
        let mut state = self.state.lock();
        state.stalled_reads = n;
        state.read_stall = delay;
    }

    /// Keep "next" enabled on the last page, re-showing it
    pub fn never_disable_next(&self) {
        self.state.lock().next_never_disables = true;
    }

    /// Interaction counters so far
    pub fn stats(&self) -> ConsoleStats {
        self.state.lock().stats
    }

    /// Every row of `slug`, visible or not
    pub fn rows(&self, slug: &str) -> Vec<SimRow> {
        self.state
            .lock()
            .listings
            .get(slug)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a form is open
    pub fn form_open(&self) -> bool {
        self.state.lock().form.is_some()
    }

    /// Deliver a response to every subscriber
    pub fn emit(&self, response: ObservedResponse) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_response(response.clone());
        }
    }

    fn page_rows(state: &ConsoleState, page_size: usize) -> Result<Vec<SimRow>, DriverError> {
        let slug = state
            .current
            .as_ref()
            .ok_or_else(|| DriverError::ElementNotFound("listing".into()))?;
        let visible: Vec<_> = state
            .listings
            .get(slug)
            .map(|rows| rows.iter().filter(|r| r.is_visible()).cloned().collect())
            .unwrap_or_default();
        Ok(visible
            .into_iter()
            .skip(state.page * page_size)
            .take(page_size)
            .collect())
    }

    fn visible_count(state: &ConsoleState) -> usize {
        state
            .current
            .as_ref()
            .and_then(|slug| state.listings.get(slug))
            .map_or(0, |rows| rows.iter().filter(|r| r.is_visible()).count())
    }

    /// Apply a submission and build the response the server would send
    fn apply_submit(state: &mut ConsoleState) -> Result<ObservedResponse, DriverError> {
        let form = state.form.clone().ok_or(DriverError::NoOpenForm)?;
        state.stats.submits += 1;
        let injected = state.injected_statuses.pop_front();
        let lag = state.listing_lag;
        let endpoint = format!("/api/{}", form.slug);

        let mut values = form.values.clone();
        let name = values.remove(NAME_COLUMN).unwrap_or_default().trim().to_string();
        let category = values
            .remove(CATEGORY_COLUMN)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let rows = state.listings.entry(form.slug.clone()).or_default();

        let (method, url, status) = match form.mode {
            FormMode::Create => {
                let duplicate = rows.iter().any(|r| r.same_key(&name, category.as_deref()));
                let status = match injected {
                    Some(status) => status,
                    None if name.is_empty() => 422,
                    None if duplicate => 409,
                    None => 201,
                };
                if (status < 400 || (status == 409 && injected.is_some())) && !duplicate {
                    rows.push(SimRow {
                        name,
                        category,
                        fields: values,
                        pending_refreshes: lag,
                    });
                    state.stats.rows_created += 1;
                }
                ("POST", endpoint, status)
            }
            FormMode::Edit { index } => {
                let status = injected.unwrap_or(200);
                let url = format!("{endpoint}/{index}");
                if status < 400 {
                    let row = rows
                        .get_mut(index)
                        .ok_or_else(|| DriverError::ElementNotFound(format!("row {index}")))?;
                    if !name.is_empty() {
                        row.name = name;
                    }
                    row.fields.extend(values);
                    row.pending_refreshes = lag;
                    state.stats.rows_updated += 1;
                }
                ("PUT", url, status)
            }
        };

        if status < 400 {
            state.form = None;
        }
        tracing::trace!("simulated {} {} -> {}", method, url, status);
        Ok(ObservedResponse::new(method, url, status).with_kind(ResourceKind::Xhr))
    }
}

impl std::fmt::Debug for SimulatedConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedConsole")
            .field("page_size", &self.page_size)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ResponseFeed for SimulatedConsole {
    fn subscribe(&self, listener: Arc<dyn ResponseListener>) {
        self.listeners.lock().push(listener);
    }
}

fn slug_of<'s>(selector: &'s str, suffix: &str) -> Option<&'s str> {
    selector.strip_prefix('#')?.strip_suffix(suffix)
}

fn not_visible(selector: &str, timeout: Duration) -> DriverError {
    DriverError::Timeout {
        target: selector.to_string(),
        after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

#[async_trait]
impl UiDriver for SimulatedConsole {
    async fn read_column(&self, column: &str) -> Result<Vec<String>, DriverError> {
        let stall = {
            let mut state = self.state.lock();
            (state.stalled_reads > 0).then(|| {
                state.stalled_reads -= 1;
                state.read_stall
            })
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let rows = Self::page_rows(&state, self.page_size)?;
        if column == NAME_COLUMN {
            state.stats.page_reads += 1;
        }
        Ok(rows
            .into_iter()
            .map(|row| match column {
                NAME_COLUMN => row.name,
                CATEGORY_COLUMN => row.category.unwrap_or_default(),
                other => row.fields.get(other).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn first_page(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.page = 0;
        for row in state.listings.values_mut().flatten() {
            row.pending_refreshes = row.pending_refreshes.saturating_sub(1);
        }
        Ok(())
    }

    async fn next_page(&self) -> Result<PageAdvance, DriverError> {
        let mut state = self.state.lock();
        state.stats.next_clicks += 1;
        let pages = Self::visible_count(&state).div_ceil(self.page_size);
        if pages <= 1 && !state.next_never_disables {
            return Ok(PageAdvance::Absent);
        }
        if state.page + 1 < pages {
            state.page += 1;
            Ok(PageAdvance::Advanced)
        } else if state.next_never_disables {
            Ok(PageAdvance::Advanced)
        } else {
            Ok(PageAdvance::Disabled)
        }
    }

    async fn open_form(&self, action: &FormAction) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let (slug, mode, values) = match action {
            FormAction::Create { action } => {
                let slug = action
                    .strip_prefix("add_")
                    .ok_or_else(|| DriverError::ElementNotFound(action.clone()))?;
                (slug.to_string(), FormMode::Create, BTreeMap::new())
            }
            FormAction::Edit {
                action,
                row,
                category,
            } => {
                let slug = action
                    .strip_prefix("edit_")
                    .ok_or_else(|| DriverError::ElementNotFound(action.clone()))?;
                let rows = state.listings.get(slug).map(Vec::as_slice).unwrap_or_default();
                let index = rows
                    .iter()
                    .position(|r| {
                        r.is_visible()
                            && r.name == *row
                            && category.as_deref().map_or(true, |c| {
                                r.category
                                    .as_deref()
                                    .is_some_and(|rc| rc.trim().eq_ignore_ascii_case(c.trim()))
                            })
                    })
                    .ok_or_else(|| DriverError::ElementNotFound(format!("row {row}")))?;
                let found = &rows[index];
                let mut values = found.fields.clone();
                values.insert(NAME_COLUMN.into(), found.name.clone());
                if let Some(category) = &found.category {
                    values.insert(CATEGORY_COLUMN.into(), category.clone());
                }
                (slug.to_string(), FormMode::Edit { index }, values)
            }
        };
        state.stats.forms_opened += 1;
        state.form = Some(OpenForm { slug, mode, values });
        Ok(())
    }

    async fn fill_field(&self, field: &str, value: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let form = state.form.as_mut().ok_or(DriverError::NoOpenForm)?;
        form.values.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn select_option(&self, field: &str, option: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if state.form.is_none() {
            return Err(DriverError::NoOpenForm);
        }
        if field == CATEGORY_COLUMN && state.category_failures > 0 {
            state.category_failures -= 1;
            return Err(DriverError::OptionUnavailable {
                field: field.to_string(),
                option: option.to_string(),
            });
        }
        if let Some(form) = state.form.as_mut() {
            form.values.insert(field.to_string(), option.to_string());
        }
        Ok(())
    }

    async fn set_toggle(&self, field: &str, on: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let form = state.form.as_mut().ok_or(DriverError::NoOpenForm)?;
        form.values.insert(field.to_string(), on.to_string());
        Ok(())
    }

    async fn read_field(&self, field: &str) -> Result<Option<String>, DriverError> {
        let state = self.state.lock();
        let form = state.form.as_ref().ok_or(DriverError::NoOpenForm)?;
        Ok(form.values.get(field).cloned())
    }

    async fn submit_form(&self) -> Result<(), DriverError> {
        let response = {
            let mut state = self.state.lock();
            Self::apply_submit(&mut state)?
        };
        let slug = response
            .url
            .trim_start_matches("/api/")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let accepted = response.status < 400;

        self.emit(ObservedResponse::new("GET", "/static/app.js", 200).with_kind(ResourceKind::Script));
        self.emit(response);
        if accepted {
            self.emit(
                ObservedResponse::new("GET", format!("/api/{slug}?page=1"), 200)
                    .with_kind(ResourceKind::Fetch),
            );
        }
        Ok(())
    }

    async fn cancel_form(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.form.take().map(|_| ()).ok_or(DriverError::NoOpenForm)
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if let Some(slug) = slug_of(selector, "-listing") {
            if state.current.as_deref() != Some(slug) {
                state.current = Some(slug.to_string());
                state.page = 0;
            }
            return Ok(());
        }
        if let Some(slug) = slug_of(selector, "-form") {
            return match &state.form {
                Some(form) if form.slug == slug => Ok(()),
                _ => Err(not_visible(selector, timeout)),
            };
        }
        Err(DriverError::ElementNotFound(selector.to_string()))
    }

    async fn wait_hidden(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let state = self.state.lock();
        match (slug_of(selector, "-form"), &state.form) {
            (Some(slug), Some(form)) if form.slug == slug => Err(not_visible(selector, timeout)),
            _ => Ok(()),
        }
    }
}
