//! Provisioning workflow
//!
//! The two public operations of the engine:
//! - [`ProvisioningEngine::ensure_exists`]: create the entity only if absent
//! - [`ProvisioningEngine::ensure_matches`]: update an existing entity only
//!   where its fields differ
//!
//! # Write sequence
//! 1. Resolve the descriptor against the listing
//! 2. Open the form (selecting the category with bounded retry)
//! 3. Fill it and submit inside a capture window
//! 4. Classify the window's calls
//! 5. Wait for the listing to settle and re-resolve
//!
//! Both operations return a [`ProvisionOutcome`]; expected failures are
//! values, never `Err` or panics.

use crate::binding::{BindingRegistry, FormBinding};
use crate::classifier::{Classification, OutcomeClassifier};
use crate::config::EngineConfig;
use crate::driver::{FormAction, UiDriver};
use crate::error::{DriverError, ProvisionError};
use crate::form::{apply_steps, FormStep};
use crate::resolver::EntityResolver;
use crate::retry::{bounded, retry_with_backoff, RetryError};
use crate::session::Session;
use crate::types::{DesiredState, FieldValue, MatchResult, ProvisionOutcome, ResourceDescriptor};
use tracing::Instrument;

/// Generic provisioning engine, parameterised by per-kind form bindings
#[derive(Debug, Clone)]
pub struct ProvisioningEngine {
    config: EngineConfig,
    bindings: BindingRegistry,
    classifier: OutcomeClassifier,
}

impl ProvisioningEngine {
    /// Create engine with default bindings for every kind
    #[inline]
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            bindings: BindingRegistry::with_defaults(),
            classifier: OutcomeClassifier::new(),
        }
    }

    /// With a custom binding registry
    #[inline]
    #[must_use]
    pub fn with_bindings(mut self, bindings: BindingRegistry) -> Self {
        self.bindings = bindings;
        self
    }

    /// Register or replace one binding
    #[inline]
    #[must_use]
    pub fn with_binding(mut self, binding: FormBinding) -> Self {
        self.bindings.register(binding);
        self
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bound kinds
    #[inline]
    #[must_use]
    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    /// Look up a descriptor without writing anything
    ///
    /// # Errors
    /// `InputContract` for an unbound kind or invalid descriptor, and any
    /// resolver failure.
    pub async fn exists(
        &self,
        session: &Session,
        descriptor: &ResourceDescriptor,
    ) -> Result<MatchResult, ProvisionError> {
        let binding = self.binding(descriptor)?;
        EntityResolver::new(session.driver(), binding, &self.config)
            .resolve(descriptor)
            .await
    }

    /// Create the entity unless it already exists
    ///
    /// # Returns
    /// - `Created` once the write is accepted and observed in the listing
    /// - `AlreadyExists` when resolved before writing, or when the server
    ///   answers 409 and the entity is observed afterwards
    /// - `Failed` otherwise
    pub async fn ensure_exists(
        &self,
        session: &Session,
        descriptor: &ResourceDescriptor,
    ) -> ProvisionOutcome {
        let span = tracing::info_span!(
            "ensure_exists",
            session = %session.id(),
            entity = %descriptor.label()
        );
        let outcome = self
            .try_ensure_exists(session, descriptor)
            .instrument(span)
            .await
            .unwrap_or_else(ProvisionError::into_outcome);
        log_outcome(descriptor, &outcome);
        outcome
    }

    /// Write the fields of `desired` that differ on an existing entity
    ///
    /// Never creates. A desired value under the binding's name field renames
    /// the entity; verification then looks for the new name.
    ///
    /// # Returns
    /// - `NoOpSkipped` when every desired field already matches
    /// - `Updated` once differing fields are written and the entity observed.
    ///   After a 409 the entity is re-opened, and `Updated` requires every
    ///   desired field to hold its value there.
    /// - `Failed(ValidationFailure)` when a 409 left fields unwritten
    /// - `Failed(NotPresentForUpdate)` when the entity does not resolve
    pub async fn ensure_matches(
        &self,
        session: &Session,
        descriptor: &ResourceDescriptor,
        desired: &DesiredState,
    ) -> ProvisionOutcome {
        let span = tracing::info_span!(
            "ensure_matches",
            session = %session.id(),
            entity = %descriptor.label(),
            fields = desired.len()
        );
        let outcome = self
            .try_ensure_matches(session, descriptor, desired)
            .instrument(span)
            .await
            .unwrap_or_else(ProvisionError::into_outcome);
        log_outcome(descriptor, &outcome);
        outcome
    }

    fn binding(&self, descriptor: &ResourceDescriptor) -> Result<&FormBinding, ProvisionError> {
        self.bindings.get(descriptor.kind).ok_or_else(|| {
            ProvisionError::input_contract(format!("no form binding for {}", descriptor.kind))
        })
    }

    async fn try_ensure_exists(
        &self,
        session: &Session,
        descriptor: &ResourceDescriptor,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let binding = self.binding(descriptor)?;
        let driver = session.driver();
        let resolver = EntityResolver::new(driver, binding, &self.config);

        let lookup = resolver.resolve(descriptor).await?;
        if lookup.is_found() {
            tracing::debug!(
                "already present as {:?} ({})",
                lookup.matched,
                lookup.tier
            );
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        let action = binding.create_form();
        self.open_form(driver, binding, &action).await?;
        self.select_category(driver, binding, descriptor, &action).await?;
        self.fill_create_form(driver, binding, descriptor).await?;

        match self.submit(session, binding).await? {
            Classification::Success => {
                self.await_form_closed(driver, binding).await?;
                self.verify(&resolver, descriptor).await?;
                Ok(ProvisionOutcome::Created)
            }
            Classification::Conflict(_) => {
                tracing::info!("server reports a conflict; re-verifying");
                self.discard_form(driver).await;
                tokio::time::sleep(self.config.settle_delay()).await;
                self.verify(&resolver, descriptor).await?;
                Ok(ProvisionOutcome::AlreadyExists)
            }
            Classification::ValidationFailure(failed_calls) => {
                self.discard_form(driver).await;
                Err(ProvisionError::ValidationFailure { failed_calls })
            }
        }
    }

    async fn try_ensure_matches(
        &self,
        session: &Session,
        descriptor: &ResourceDescriptor,
        desired: &DesiredState,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let binding = self.binding(descriptor)?;
        let driver = session.driver();
        let resolver = EntityResolver::new(driver, binding, &self.config);

        let lookup = resolver.resolve(descriptor).await?;
        let row = match lookup.matched {
            Some(row) if lookup.tier.is_found() => row,
            _ => {
                return Err(ProvisionError::NotPresentForUpdate {
                    entity: descriptor.label(),
                    similar: lookup.similar_candidates,
                })
            }
        };

        let action = binding.edit_form(row, descriptor.category.clone());
        self.open_form(driver, binding, &action).await?;

        let steps = self.pending_writes(driver, desired).await?;
        if steps.is_empty() {
            tracing::debug!("all {} desired field(s) already match", desired.len());
            self.discard_form(driver).await;
            return Ok(ProvisionOutcome::NoOpSkipped);
        }
        tracing::debug!("writing {} differing field(s)", steps.len());
        bounded(
            self.config.wait_timeout(),
            &binding.form_selector,
            apply_steps(driver, &steps),
        )
        .await?;

        let target = renamed(descriptor, binding, desired);
        match self.submit(session, binding).await? {
            Classification::Success => {
                self.await_form_closed(driver, binding).await?;
                self.verify(&resolver, &target).await?;
                Ok(ProvisionOutcome::Updated)
            }
            Classification::Conflict(failed_calls) => {
                tracing::info!("server reports a conflict on update; re-reading the entity");
                self.discard_form(driver).await;
                tokio::time::sleep(self.config.settle_delay()).await;
                match self
                    .confirm_update(driver, &resolver, binding, descriptor, &target, desired)
                    .await?
                {
                    None => Ok(ProvisionOutcome::Updated),
                    Some(differing) => {
                        tracing::warn!("{} field(s) still differ after conflict", differing);
                        Err(ProvisionError::ValidationFailure { failed_calls })
                    }
                }
            }
            Classification::ValidationFailure(failed_calls) => {
                self.discard_form(driver).await;
                Err(ProvisionError::ValidationFailure { failed_calls })
            }
        }
    }

    async fn open_form(
        &self,
        driver: &dyn UiDriver,
        binding: &FormBinding,
        action: &FormAction,
    ) -> Result<(), DriverError> {
        let timeout = self.config.wait_timeout();
        tracing::debug!("opening form {}", action);
        bounded(timeout, action.action(), driver.open_form(action)).await?;
        bounded(
            timeout,
            &binding.form_selector,
            driver.wait_visible(&binding.form_selector, timeout),
        )
        .await
    }

    /// Select the category, re-opening the form between attempts
    ///
    /// Category dropdowns populate asynchronously; every attempt after the
    /// first starts from a freshly opened form.
    async fn select_category(
        &self,
        driver: &dyn UiDriver,
        binding: &FormBinding,
        descriptor: &ResourceDescriptor,
        action: &FormAction,
    ) -> Result<(), ProvisionError> {
        let (Some(field), Some(category)) = (&binding.category_field, &descriptor.category) else {
            return Ok(());
        };
        if !binding.is_category_scoped() {
            return Ok(());
        }

        let timeout = self.config.wait_timeout();
        let category = category.trim();
        retry_with_backoff(
            &self.config.category_retry,
            "category selection",
            DriverError::is_retryable,
            |attempt| async move {
                if attempt > 1 {
                    self.discard_form(driver).await;
                    self.open_form(driver, binding, action).await?;
                }
                bounded(timeout, field, driver.select_option(field, category)).await
            },
        )
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => {
                ProvisionError::TransientFormRace { attempts, last }
            }
            RetryError::Fatal(e) => e.into(),
        })
    }

    async fn fill_create_form(
        &self,
        driver: &dyn UiDriver,
        binding: &FormBinding,
        descriptor: &ResourceDescriptor,
    ) -> Result<(), ProvisionError> {
        let mut steps = vec![FormStep::for_value(
            &binding.name_field,
            &FieldValue::Text(descriptor.name.clone()),
        )];
        if let (Some(field), Some(display_name)) =
            (&binding.display_name_field, &descriptor.display_name)
        {
            steps.push(FormStep::for_value(field, &FieldValue::Text(display_name.clone())));
        }
        if let (Some(ids), Some(spec)) = (&binding.field_ids, &descriptor.field) {
            steps.extend(spec.form_steps(ids));
        }

        bounded(
            self.config.wait_timeout(),
            &binding.form_selector,
            apply_steps(driver, &steps),
        )
        .await?;
        Ok(())
    }

    /// Steps for every desired field whose current value differs
    async fn pending_writes(
        &self,
        driver: &dyn UiDriver,
        desired: &DesiredState,
    ) -> Result<Vec<FormStep>, ProvisionError> {
        let timeout = self.config.wait_timeout();
        let mut steps = Vec::new();
        for (field, value) in desired.iter() {
            let current = bounded(timeout, field, driver.read_field(field)).await?;
            if value.matches(current.as_deref()) {
                continue;
            }
            tracing::trace!("{} differs: {:?} -> {}", field, current, value);
            steps.push(FormStep::for_value(field, value));
        }
        Ok(steps)
    }

    /// Submit inside a capture window and classify what the server answered
    async fn submit(
        &self,
        session: &Session,
        binding: &FormBinding,
    ) -> Result<Classification, ProvisionError> {
        let window = session.capture().window();
        bounded(
            self.config.wait_timeout(),
            "form submit",
            session.driver().submit_form(),
        )
        .await?;
        tokio::time::sleep(self.config.settle_delay()).await;

        let verdict = self.classifier.classify_window(session.capture(), &window);
        match verdict {
            Classification::Conflict(failed_calls) if !binding.conflict_means_exists => {
                Ok(Classification::ValidationFailure(failed_calls))
            }
            other => Ok(other),
        }
    }

    /// Re-open the edited entity and count desired fields that still differ
    ///
    /// The entity is looked up under its old name first; a rename that did
    /// land is found under the new one. Returns `None` when every desired
    /// field holds its value.
    async fn confirm_update(
        &self,
        driver: &dyn UiDriver,
        resolver: &EntityResolver<'_>,
        binding: &FormBinding,
        descriptor: &ResourceDescriptor,
        target: &ResourceDescriptor,
        desired: &DesiredState,
    ) -> Result<Option<usize>, ProvisionError> {
        let mut lookup = resolver.resolve(descriptor).await?;
        if !lookup.is_found() && target.name != descriptor.name {
            lookup = resolver.resolve(target).await?;
        }
        let row = match lookup.matched {
            Some(row) if lookup.tier.is_found() => row,
            _ => {
                return Err(ProvisionError::VerificationMismatch {
                    entity: target.label(),
                    similar: lookup.similar_candidates,
                })
            }
        };

        let action = binding.edit_form(row, descriptor.category.clone());
        self.open_form(driver, binding, &action).await?;
        let pending = self.pending_writes(driver, desired).await;
        self.discard_form(driver).await;

        let differing = pending?.len();
        Ok((differing > 0).then_some(differing))
    }

    async fn await_form_closed(
        &self,
        driver: &dyn UiDriver,
        binding: &FormBinding,
    ) -> Result<(), ProvisionError> {
        let timeout = self.config.wait_timeout();
        bounded(
            timeout,
            &binding.form_selector,
            driver.wait_hidden(&binding.form_selector, timeout),
        )
        .await?;
        Ok(())
    }

    /// Close the form without submitting, ignoring failures
    async fn discard_form(&self, driver: &dyn UiDriver) {
        if let Err(e) = bounded(self.config.wait_timeout(), "form cancel", driver.cancel_form()).await
        {
            tracing::debug!("form cancel ignored: {}", e);
        }
    }

    /// Re-resolve after a write, allowing the listing to lag
    async fn verify(
        &self,
        resolver: &EntityResolver<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<MatchResult, ProvisionError> {
        let attempts = self.config.verify_attempts.max(1);
        let mut similar = Vec::new();

        for attempt in 1..=attempts {
            let lookup = resolver.resolve(descriptor).await?;
            if lookup.is_found() {
                return Ok(lookup);
            }
            similar = lookup.similar_candidates;
            if attempt < attempts {
                tracing::debug!("not yet observable (attempt {}/{})", attempt, attempts);
                tokio::time::sleep(self.config.settle_delay()).await;
            }
        }

        Err(ProvisionError::VerificationMismatch {
            entity: descriptor.label(),
            similar,
        })
    }
}

/// Descriptor to verify after an update that may rename the entity
fn renamed(
    descriptor: &ResourceDescriptor,
    binding: &FormBinding,
    desired: &DesiredState,
) -> ResourceDescriptor {
    match desired.get(&binding.name_field) {
        Some(FieldValue::Text(name)) if !name.trim().is_empty() => ResourceDescriptor {
            name: name.trim().to_string(),
            ..descriptor.clone()
        },
        _ => descriptor.clone(),
    }
}

fn log_outcome(descriptor: &ResourceDescriptor, outcome: &ProvisionOutcome) {
    match outcome {
        ProvisionOutcome::Failed(failure) => {
            tracing::warn!("{} -> {}", descriptor.label(), failure);
        }
        other => tracing::info!("{} -> {}", descriptor.label(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockUiDriver, PageAdvance};
    use crate::error::FailureReason;
    use crate::retry::RetryPolicy;
    use crate::types::EntityKind;
    use prov_capture::{CaptureStream, ObservedResponse, ResourceKind};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn config() -> EngineConfig {
        EngineConfig::new()
            .with_settle_delay_ms(0)
            .with_wait_timeout_ms(1_000)
            .with_category_retry(RetryPolicy::new(3, 0, 1))
            .with_pagination_retry(RetryPolicy::once())
            .with_verify_attempts(1)
    }

    fn single_page_listing(driver: &mut MockUiDriver) {
        driver.expect_wait_visible().returning(|_, _| Ok(()));
        driver.expect_first_page().returning(|| Ok(()));
        driver
            .expect_next_page()
            .returning(|| Ok(PageAdvance::Absent));
    }

    /// Mock whose listing shows `name` once `created` is set
    fn listing_after_submit(driver: &mut MockUiDriver, name: &'static str, created: &Arc<AtomicBool>) {
        let created = Arc::clone(created);
        driver.expect_read_column().returning(move |_| {
            if created.load(Ordering::SeqCst) {
                Ok(vec![name.to_string()])
            } else {
                Ok(Vec::new())
            }
        });
    }

    fn respond(capture: &CaptureStream, status: u16) {
        capture.record(ObservedResponse::new("POST", "/api/tag", status).with_kind(ResourceKind::Xhr));
    }

    fn tag(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(EntityKind::Tag, name)
    }

    #[tokio::test]
    async fn present_entity_is_never_written() {
        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver
            .expect_read_column()
            .returning(|_| Ok(vec!["VIP".to_string()]));
        // open_form / submit_form have no expectations

        let session = Session::new(Arc::new(driver));
        let engine = ProvisioningEngine::new(config());

        let outcome = engine.ensure_exists(&session, &tag("vip")).await;
        assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn absent_entity_is_created_and_verified() {
        let capture = Arc::new(CaptureStream::new());
        let created = Arc::new(AtomicBool::new(false));

        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        listing_after_submit(&mut driver, "VIP", &created);
        driver
            .expect_open_form()
            .withf(|action| action.action() == "add_tag")
            .times(1)
            .returning(|_| Ok(()));
        driver
            .expect_fill_field()
            .withf(|field, value| field == "name" && value == "VIP")
            .times(1)
            .returning(|_, _| Ok(()));
        {
            let capture = Arc::clone(&capture);
            let created = Arc::clone(&created);
            driver.expect_submit_form().times(1).returning(move || {
                respond(&capture, 201);
                created.store(true, Ordering::SeqCst);
                Ok(())
            });
        }
        driver.expect_wait_hidden().returning(|_, _| Ok(()));

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config());

        assert_eq!(engine.ensure_exists(&session, &tag("VIP")).await, ProvisionOutcome::Created);
    }

    #[tokio::test]
    async fn accepted_write_missing_from_listing_is_mismatch() {
        let capture = Arc::new(CaptureStream::new());

        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver
            .expect_read_column()
            .returning(|_| Ok(vec!["VIP2".to_string()]));
        driver.expect_open_form().returning(|_| Ok(()));
        driver.expect_fill_field().returning(|_, _| Ok(()));
        {
            let capture = Arc::clone(&capture);
            driver.expect_submit_form().returning(move || {
                respond(&capture, 200);
                Ok(())
            });
        }
        driver.expect_wait_hidden().returning(|_, _| Ok(()));

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config().with_verify_attempts(2));

        let outcome = engine.ensure_exists(&session, &tag("VIP")).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.reason, FailureReason::VerificationMismatch);
        assert_eq!(failure.similar_candidates, vec!["VIP2".to_string()]);
    }

    #[tokio::test]
    async fn conflict_is_already_exists_after_reverify() {
        let capture = Arc::new(CaptureStream::new());
        let created = Arc::new(AtomicBool::new(false));

        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        listing_after_submit(&mut driver, "VIP", &created);
        driver.expect_open_form().returning(|_| Ok(()));
        driver.expect_fill_field().returning(|_, _| Ok(()));
        {
            let capture = Arc::clone(&capture);
            let created = Arc::clone(&created);
            driver.expect_submit_form().returning(move || {
                respond(&capture, 409);
                created.store(true, Ordering::SeqCst);
                Ok(())
            });
        }
        driver.expect_cancel_form().times(1).returning(|| Ok(()));

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config());

        assert_eq!(
            engine.ensure_exists(&session, &tag("VIP")).await,
            ProvisionOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn conflict_can_be_bound_as_failure() {
        let capture = Arc::new(CaptureStream::new());

        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver.expect_read_column().returning(|_| Ok(Vec::new()));
        driver.expect_open_form().returning(|_| Ok(()));
        driver.expect_fill_field().returning(|_, _| Ok(()));
        {
            let capture = Arc::clone(&capture);
            driver.expect_submit_form().returning(move || {
                respond(&capture, 409);
                Ok(())
            });
        }
        driver.expect_cancel_form().returning(|| Ok(()));

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config())
            .with_binding(FormBinding::for_kind(EntityKind::Tag).conflict_is_failure());

        let outcome = engine.ensure_exists(&session, &tag("VIP")).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.reason, FailureReason::ValidationFailure);
        assert_eq!(failure.failed_calls[0].status, 409);
    }

    #[tokio::test]
    async fn rejected_submission_carries_failed_calls() {
        let capture = Arc::new(CaptureStream::new());

        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver.expect_read_column().returning(|_| Ok(Vec::new()));
        driver.expect_open_form().returning(|_| Ok(()));
        driver.expect_fill_field().returning(|_, _| Ok(()));
        {
            let capture = Arc::clone(&capture);
            driver.expect_submit_form().returning(move || {
                respond(&capture, 422);
                Ok(())
            });
        }
        driver.expect_cancel_form().times(1).returning(|| Ok(()));

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config());

        let outcome = engine.ensure_exists(&session, &tag("VIP")).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.reason, FailureReason::ValidationFailure);
        assert_eq!(failure.failed_calls.len(), 1);
        assert_eq!(failure.failed_calls[0].status, 422);
    }

    #[tokio::test]
    async fn category_race_exhausts_into_transient_failure() {
        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver.expect_read_column().returning(|_| Ok(Vec::new()));
        driver.expect_open_form().times(3).returning(|_| Ok(()));
        driver.expect_cancel_form().times(2).returning(|| Ok(()));
        driver.expect_select_option().times(3).returning(|field, option| {
            Err(DriverError::OptionUnavailable {
                field: field.to_string(),
                option: option.to_string(),
            })
        });

        let session = Session::new(Arc::new(driver));
        let engine = ProvisioningEngine::new(config());
        let descriptor =
            ResourceDescriptor::new(EntityKind::Skill, "Collections").with_category("General");

        let outcome = engine.ensure_exists(&session, &descriptor).await;
        assert_eq!(outcome.failure_reason(), Some(FailureReason::TransientFormRace));
    }

    #[tokio::test]
    async fn unbound_kind_is_contract_violation() {
        let session = Session::new(Arc::new(MockUiDriver::new()));
        let engine = ProvisioningEngine::new(config()).with_bindings(BindingRegistry::new());

        let outcome = engine.ensure_exists(&session, &tag("VIP")).await;
        assert_eq!(
            outcome.failure_reason(),
            Some(FailureReason::InputContractViolation)
        );
    }

    #[tokio::test]
    async fn matching_fields_skip_without_submit() {
        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver
            .expect_read_column()
            .returning(|_| Ok(vec!["VIP".to_string()]));
        driver
            .expect_open_form()
            .withf(|action| matches!(action, FormAction::Edit { row, .. } if row == "VIP"))
            .times(1)
            .returning(|_| Ok(()));
        driver
            .expect_read_field()
            .withf(|field| field == "color")
            .returning(|_| Ok(Some(" Gold ".to_string())));
        driver
            .expect_read_field()
            .withf(|field| field == "active")
            .returning(|_| Ok(Some("on".to_string())));
        driver.expect_cancel_form().times(1).returning(|| Ok(()));
        // submit_form has no expectation

        let session = Session::new(Arc::new(driver));
        let engine = ProvisioningEngine::new(config());
        let desired = DesiredState::new().text("color", "Gold").flag("active", true);

        assert_eq!(
            engine.ensure_matches(&session, &tag("VIP"), &desired).await,
            ProvisionOutcome::NoOpSkipped
        );
    }

    #[tokio::test]
    async fn only_differing_fields_are_written() {
        let capture = Arc::new(CaptureStream::new());

        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver
            .expect_read_column()
            .returning(|_| Ok(vec!["VIP".to_string()]));
        driver.expect_open_form().returning(|_| Ok(()));
        driver
            .expect_read_field()
            .withf(|field| field == "color")
            .returning(|_| Ok(Some("Gold".to_string())));
        driver
            .expect_read_field()
            .withf(|field| field == "priority")
            .returning(|_| Ok(Some("Low".to_string())));
        driver
            .expect_select_option()
            .withf(|field, option| field == "priority" && option == "High")
            .times(1)
            .returning(|_, _| Ok(()));
        {
            let capture = Arc::clone(&capture);
            driver.expect_submit_form().times(1).returning(move || {
                respond(&capture, 200);
                Ok(())
            });
        }
        driver.expect_wait_hidden().returning(|_, _| Ok(()));

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config());
        let desired = DesiredState::new()
            .text("color", "Gold")
            .choice("priority", "High");

        assert_eq!(
            engine.ensure_matches(&session, &tag("VIP"), &desired).await,
            ProvisionOutcome::Updated
        );
    }

    /// Mock for a `color` update whose submission answers 409
    ///
    /// `color` reads back `Silver` after the submission when `lands` is set.
    fn conflicting_color_update(capture: &Arc<CaptureStream>, lands: bool) -> MockUiDriver {
        let submitted = Arc::new(AtomicBool::new(false));

        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver
            .expect_read_column()
            .returning(|_| Ok(vec!["VIP".to_string()]));
        driver.expect_open_form().times(2).returning(|_| Ok(()));
        {
            let submitted = Arc::clone(&submitted);
            driver.expect_read_field().returning(move |_| {
                if lands && submitted.load(Ordering::SeqCst) {
                    Ok(Some("Silver".to_string()))
                } else {
                    Ok(Some("Gold".to_string()))
                }
            });
        }
        driver.expect_fill_field().times(1).returning(|_, _| Ok(()));
        {
            let capture = Arc::clone(capture);
            driver.expect_submit_form().times(1).returning(move || {
                respond(&capture, 409);
                submitted.store(true, Ordering::SeqCst);
                Ok(())
            });
        }
        driver.expect_cancel_form().times(2).returning(|| Ok(()));
        driver
    }

    #[tokio::test]
    async fn conflicted_update_counts_only_when_fields_landed() {
        let capture = Arc::new(CaptureStream::new());
        let driver = conflicting_color_update(&capture, true);

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config());
        let desired = DesiredState::new().text("color", "Silver");

        assert_eq!(
            engine.ensure_matches(&session, &tag("VIP"), &desired).await,
            ProvisionOutcome::Updated
        );
    }

    #[tokio::test]
    async fn conflicted_update_with_stale_fields_fails() {
        let capture = Arc::new(CaptureStream::new());
        let driver = conflicting_color_update(&capture, false);

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config());
        let desired = DesiredState::new().text("color", "Silver");

        let outcome = engine.ensure_matches(&session, &tag("VIP"), &desired).await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.reason, FailureReason::ValidationFailure);
        assert_eq!(failure.failed_calls.len(), 1);
        assert_eq!(failure.failed_calls[0].status, 409);
    }

    #[tokio::test]
    async fn expired_wait_fails_with_timeout() {
        let capture = Arc::new(CaptureStream::new());

        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver.expect_read_column().returning(|_| Ok(Vec::new()));
        driver.expect_open_form().returning(|_| Ok(()));
        driver.expect_fill_field().returning(|_, _| Ok(()));
        {
            let capture = Arc::clone(&capture);
            driver.expect_submit_form().returning(move || {
                respond(&capture, 201);
                Ok(())
            });
        }
        driver.expect_wait_hidden().returning(|selector, timeout| {
            Err(DriverError::Timeout {
                target: selector.to_string(),
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        });

        let session = Session::with_capture(Arc::new(driver), capture);
        let engine = ProvisioningEngine::new(config());

        let outcome = engine.ensure_exists(&session, &tag("VIP")).await;
        assert_eq!(outcome.failure_reason(), Some(FailureReason::Timeout));
    }

    #[tokio::test]
    async fn update_never_creates() {
        let mut driver = MockUiDriver::new();
        single_page_listing(&mut driver);
        driver
            .expect_read_column()
            .returning(|_| Ok(vec!["VIPs".to_string()]));

        let session = Session::new(Arc::new(driver));
        let engine = ProvisioningEngine::new(config());

        let outcome = engine
            .ensure_matches(&session, &tag("VIP"), &DesiredState::new().text("color", "Gold"))
            .await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.reason, FailureReason::NotPresentForUpdate);
        assert_eq!(failure.similar_candidates, vec!["VIPs".to_string()]);
    }

    #[test]
    fn rename_targets_new_name() {
        let binding = FormBinding::for_kind(EntityKind::Tag);
        let target = renamed(
            &tag("VIP"),
            &binding,
            &DesiredState::new().text("name", " Premium "),
        );
        assert_eq!(target.name, "Premium");

        let unchanged = renamed(&tag("VIP"), &binding, &DesiredState::new());
        assert_eq!(unchanged.name, "VIP");
    }
}
