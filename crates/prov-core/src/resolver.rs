//! Entity resolver
//!
//! Decides whether a descriptor's entity is already present in the
//! console's listing, reading one page or walking the pagination.
//!
//! # Traversal
//! 1. Rewind the listing to its first page
//! 2. Scan the page (filtered by category for scoped kinds)
//! 3. Stop on a match, a missing/disabled "next" control, or the page cap
//!
//! Near matches are collected for diagnostics but never reported as a match.

use crate::binding::FormBinding;
use crate::config::EngineConfig;
use crate::driver::{PageAdvance, UiDriver};
use crate::error::{DriverError, ProvisionError};
use crate::matcher::{best_match, similar_candidates, tier_for};
use crate::retry::{bounded, retry_with_backoff};
use crate::types::{MatchResult, MatchTier, ResourceDescriptor};

/// Check a descriptor against the input contract of its binding
///
/// # Errors
/// `ProvisionError::InputContract` when:
/// - the binding belongs to another kind
/// - `name` is blank
/// - `category` is present but blank
/// - the kind is category-scoped and `category` is missing
/// - a typed field is given for a form without a field sub-form
pub fn validate_descriptor(
    descriptor: &ResourceDescriptor,
    binding: &FormBinding,
) -> Result<(), ProvisionError> {
    if descriptor.kind != binding.kind {
        return Err(ProvisionError::input_contract(format!(
            "descriptor kind {} does not match binding kind {}",
            descriptor.kind, binding.kind
        )));
    }
    if descriptor.name.trim().is_empty() {
        return Err(ProvisionError::input_contract(format!(
            "{} descriptor has an empty name",
            descriptor.kind
        )));
    }
    if descriptor.field.is_some() && binding.field_ids.is_none() {
        return Err(ProvisionError::input_contract(format!(
            "{} forms carry no typed field",
            binding.kind
        )));
    }
    match descriptor.category.as_deref() {
        Some(category) if category.trim().is_empty() => Err(ProvisionError::input_contract(
            format!("{} has an empty category", descriptor.label()),
        )),
        None if binding.is_category_scoped() => Err(ProvisionError::input_contract(format!(
            "{} requires a category",
            descriptor.label()
        ))),
        _ => Ok(()),
    }
}

/// Existence checks against one kind's listing
pub struct EntityResolver<'a> {
    driver: &'a dyn UiDriver,
    binding: &'a FormBinding,
    config: &'a EngineConfig,
}

impl<'a> EntityResolver<'a> {
    /// Create resolver over `binding`'s listing
    #[inline]
    #[must_use]
    pub fn new(driver: &'a dyn UiDriver, binding: &'a FormBinding, config: &'a EngineConfig) -> Self {
        Self {
            driver,
            binding,
            config,
        }
    }

    /// Look up the descriptor using the binding's listing shape
    ///
    /// Paginated listings are walked; single-page listings are read once.
    ///
    /// # Errors
    /// See [`Self::exists_across_pages`].
    pub async fn resolve(&self, descriptor: &ResourceDescriptor) -> Result<MatchResult, ProvisionError> {
        if self.binding.paginated {
            self.exists_across_pages(descriptor).await
        } else {
            self.exists(descriptor).await
        }
    }

    /// Look up the descriptor on the current listing page only
    ///
    /// # Errors
    /// - `InputContract` for an invalid descriptor
    /// - `Timeout` / `Driver` when the listing cannot be read
    pub async fn exists(&self, descriptor: &ResourceDescriptor) -> Result<MatchResult, ProvisionError> {
        validate_descriptor(descriptor, self.binding)?;
        self.await_listing().await?;

        let mut seen = Vec::new();
        let result = match self.scan_page(descriptor, &mut seen).await? {
            Some((tier, matched)) => MatchResult::found(tier, matched),
            None => self.not_found(descriptor, &seen),
        };
        Ok(result)
    }

    /// Look up the descriptor across listing pages
    ///
    /// Reads at most `page_cap` pages.
    ///
    /// # Errors
    /// - `InputContract` for an invalid descriptor
    /// - `Timeout` / `Driver` when the listing cannot be read or advanced
    pub async fn exists_across_pages(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<MatchResult, ProvisionError> {
        validate_descriptor(descriptor, self.binding)?;
        let timeout = self.config.wait_timeout();

        bounded(timeout, "listing first page", self.driver.first_page()).await?;
        self.await_listing().await?;

        let mut seen = Vec::new();
        let mut pages = 0;
        loop {
            pages += 1;
            if let Some((tier, matched)) = self.scan_page(descriptor, &mut seen).await? {
                tracing::debug!(
                    "{} resolved {} on page {}",
                    descriptor.label(),
                    tier,
                    pages
                );
                return Ok(MatchResult::found(tier, matched).with_pages_read(pages));
            }

            if pages >= self.config.page_cap {
                tracing::debug!(
                    "{} not found before page cap ({})",
                    descriptor.label(),
                    self.config.page_cap
                );
                break;
            }

            match self.advance().await? {
                PageAdvance::Advanced => self.await_listing().await?,
                PageAdvance::Absent | PageAdvance::Disabled => break,
            }
        }

        Ok(self.not_found(descriptor, &seen).with_pages_read(pages))
    }

    async fn await_listing(&self) -> Result<(), ProvisionError> {
        let timeout = self.config.wait_timeout();
        bounded(
            timeout,
            &self.binding.listing_selector,
            self.driver.wait_visible(&self.binding.listing_selector, timeout),
        )
        .await?;
        Ok(())
    }

    async fn advance(&self) -> Result<PageAdvance, ProvisionError> {
        let timeout = self.config.wait_timeout();
        retry_with_backoff(
            &self.config.pagination_retry,
            "listing next page",
            DriverError::is_retryable,
            |_| bounded(timeout, "listing next page", self.driver.next_page()),
        )
        .await
        .map_err(|e| ProvisionError::from(e.into_inner()))
    }

    /// Scan the current page, returning the strongest match
    async fn scan_page(
        &self,
        descriptor: &ResourceDescriptor,
        seen: &mut Vec<String>,
    ) -> Result<Option<(MatchTier, String)>, ProvisionError> {
        let timeout = self.config.wait_timeout();
        let names = bounded(
            timeout,
            "listing names",
            self.driver.read_column(&self.binding.name_column),
        )
        .await?;

        let rows = match (&self.binding.category_column, descriptor.category.as_deref()) {
            (Some(column), Some(category)) if self.binding.is_category_scoped() => {
                let categories =
                    bounded(timeout, "listing categories", self.driver.read_column(column)).await?;
                if categories.len() != names.len() {
                    return Err(DriverError::Other(format!(
                        "listing columns disagree: {} name(s) but {} category value(s)",
                        names.len(),
                        categories.len()
                    ))
                    .into());
                }
                names
                    .into_iter()
                    .zip(categories)
                    .filter(|(_, c)| tier_for(c, category).is_found())
                    .map(|(n, _)| n)
                    .collect()
            }
            _ => names,
        };

        let hit = best_match(&rows, &descriptor.name).map(|(tier, i)| (tier, rows[i].clone()));
        seen.extend(rows);
        Ok(hit)
    }

    fn not_found(&self, descriptor: &ResourceDescriptor, seen: &[String]) -> MatchResult {
        let similar = similar_candidates(seen, &descriptor.name, self.config.similar_candidates);
        if !similar.is_empty() {
            tracing::debug!("{} not found; similar: {:?}", descriptor.label(), similar);
        }
        MatchResult::not_found(similar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockUiDriver;
    use crate::retry::RetryPolicy;
    use crate::types::{EntityKind, FieldKind, FieldSpec};
    use mockall::Sequence;

    fn config() -> EngineConfig {
        EngineConfig::new()
            .with_wait_timeout_ms(1_000)
            .with_pagination_retry(RetryPolicy::once())
    }

    fn listing_ready(driver: &mut MockUiDriver) {
        driver.expect_wait_visible().returning(|_, _| Ok(()));
        driver.expect_first_page().returning(|| Ok(()));
    }

    #[test]
    fn validation_rejects_blank_keys() {
        let tags = FormBinding::for_kind(EntityKind::Tag);
        let fields = FormBinding::for_kind(EntityKind::Field);

        let blank = ResourceDescriptor::new(EntityKind::Tag, "   ");
        let blank_category = ResourceDescriptor::new(EntityKind::Tag, "vip").with_category(" ");
        let missing_category = ResourceDescriptor::new(EntityKind::Field, "PTPDate");
        let wrong_kind = ResourceDescriptor::new(EntityKind::Skill, "vip");
        let stray_field = ResourceDescriptor::new(EntityKind::Tag, "vip")
            .with_field(FieldSpec::new(FieldKind::Number));

        assert!(validate_descriptor(&blank, &tags).is_err());
        assert!(validate_descriptor(&blank_category, &tags).is_err());
        assert!(validate_descriptor(&missing_category, &fields).is_err());
        assert!(validate_descriptor(&wrong_kind, &tags).is_err());
        assert!(validate_descriptor(&stray_field, &tags).is_err());
        assert!(validate_descriptor(&ResourceDescriptor::new(EntityKind::Tag, "vip"), &tags).is_ok());
    }

    #[tokio::test]
    async fn blank_name_fails_before_touching_driver() {
        // no expectations: any driver call would panic
        let driver = MockUiDriver::new();
        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config();
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let err = resolver
            .exists_across_pages(&ResourceDescriptor::new(EntityKind::Tag, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InputContract(_)));
    }

    #[tokio::test]
    async fn single_page_tiers() {
        let mut driver = MockUiDriver::new();
        driver.expect_wait_visible().returning(|_, _| Ok(()));
        driver
            .expect_read_column()
            .returning(|_| Ok(vec!["Branch Name".to_string(), "Region".to_string()]));

        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config();
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let exact = resolver
            .exists(&ResourceDescriptor::new(EntityKind::Tag, "Branch Name"))
            .await
            .unwrap();
        let folded = resolver
            .exists(&ResourceDescriptor::new(EntityKind::Tag, "branch name"))
            .await
            .unwrap();
        let spaced = resolver
            .exists(&ResourceDescriptor::new(EntityKind::Tag, "Branch  Name"))
            .await
            .unwrap();

        assert_eq!(exact.tier, MatchTier::Exact);
        assert_eq!(folded.tier, MatchTier::CaseInsensitive);
        assert_eq!(spaced.tier, MatchTier::WhitespaceNormalized);
        assert_eq!(spaced.matched.as_deref(), Some("Branch Name"));
    }

    #[tokio::test]
    async fn target_on_third_page_reads_three_pages() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);

        let mut pages = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string(), "d".to_string()],
            vec!["e".to_string(), "Target".to_string()],
        ]
        .into_iter();
        driver
            .expect_read_column()
            .times(3)
            .returning(move |_| Ok(pages.next().unwrap_or_default()));
        driver
            .expect_next_page()
            .times(2)
            .returning(|| Ok(PageAdvance::Advanced));

        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config();
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let result = resolver
            .exists_across_pages(&ResourceDescriptor::new(EntityKind::Tag, "Target"))
            .await
            .unwrap();

        assert_eq!(result.tier, MatchTier::Exact);
        assert_eq!(result.pages_read, 3);
    }

    #[tokio::test]
    async fn absent_target_stops_at_disabled_next() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);
        driver
            .expect_read_column()
            .times(3)
            .returning(|_| Ok(vec!["Other".to_string()]));

        let mut seq = Sequence::new();
        driver
            .expect_next_page()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(PageAdvance::Advanced));
        driver
            .expect_next_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(PageAdvance::Disabled));

        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config();
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let result = resolver
            .exists_across_pages(&ResourceDescriptor::new(EntityKind::Tag, "Missing"))
            .await
            .unwrap();

        assert_eq!(result.tier, MatchTier::NotFound);
        assert_eq!(result.pages_read, 3);
    }

    #[tokio::test]
    async fn page_cap_bounds_a_next_control_that_never_disables() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);
        driver
            .expect_read_column()
            .times(4)
            .returning(|_| Ok(vec!["Other".to_string()]));
        driver
            .expect_next_page()
            .times(3)
            .returning(|| Ok(PageAdvance::Advanced));

        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config().with_page_cap(4);
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let result = resolver
            .exists_across_pages(&ResourceDescriptor::new(EntityKind::Tag, "Missing"))
            .await
            .unwrap();

        assert_eq!(result.tier, MatchTier::NotFound);
        assert_eq!(result.pages_read, 4);
    }

    #[tokio::test]
    async fn category_scope_filters_rows() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);
        driver
            .expect_read_column()
            .withf(|column| column == "name")
            .returning(|_| Ok(vec!["PTPDate".to_string(), "PTPDate".to_string()]));
        driver
            .expect_read_column()
            .withf(|column| column == "category")
            .returning(|_| Ok(vec!["Sales".to_string(), "general".to_string()]));
        driver
            .expect_next_page()
            .returning(|| Ok(PageAdvance::Absent));

        let binding = FormBinding::for_kind(EntityKind::Field);
        let config = config();
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let general = resolver
            .exists_across_pages(
                &ResourceDescriptor::new(EntityKind::Field, "PTPDate").with_category("General"),
            )
            .await
            .unwrap();
        let support = resolver
            .exists_across_pages(
                &ResourceDescriptor::new(EntityKind::Field, "PTPDate").with_category("Support"),
            )
            .await
            .unwrap();

        assert_eq!(general.tier, MatchTier::Exact);
        assert_eq!(support.tier, MatchTier::NotFound);
    }

    #[tokio::test]
    async fn not_found_reports_similar_but_never_matches() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);
        driver
            .expect_read_column()
            .returning(|_| Ok(vec!["PTPDate2".to_string(), "PTP Date Old".to_string()]));
        driver
            .expect_next_page()
            .returning(|| Ok(PageAdvance::Absent));

        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config();
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let result = resolver
            .exists_across_pages(&ResourceDescriptor::new(EntityKind::Tag, "PTPDate"))
            .await
            .unwrap();

        assert!(!result.is_found());
        assert!(result.matched.is_none());
        assert_eq!(result.similar_candidates[0], "PTPDate2");
    }

    #[tokio::test]
    async fn unreadable_listing_is_driver_error() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);
        driver
            .expect_read_column()
            .returning(|_| Err(DriverError::Other("detached".into())));

        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config();
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let err = resolver
            .exists_across_pages(&ResourceDescriptor::new(EntityKind::Tag, "vip"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Driver(DriverError::Other(_))));
    }

    #[tokio::test]
    async fn failed_next_click_is_retried() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);

        let mut pages = vec![vec!["a".to_string()], vec!["Target".to_string()]].into_iter();
        driver
            .expect_read_column()
            .times(2)
            .returning(move |_| Ok(pages.next().unwrap_or_default()));

        let mut seq = Sequence::new();
        driver
            .expect_next_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(DriverError::NotInteractable("next".into())));
        driver
            .expect_next_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(PageAdvance::Advanced));

        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config().with_pagination_retry(RetryPolicy::new(2, 0, 1));
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let result = resolver
            .exists_across_pages(&ResourceDescriptor::new(EntityKind::Tag, "Target"))
            .await
            .unwrap();

        assert_eq!(result.tier, MatchTier::Exact);
        assert_eq!(result.pages_read, 2);
    }

    #[tokio::test]
    async fn next_click_failing_past_budget_is_driver_error() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);
        driver
            .expect_read_column()
            .times(1)
            .returning(|_| Ok(vec!["a".to_string()]));
        driver
            .expect_next_page()
            .times(2)
            .returning(|| Err(DriverError::NotInteractable("next".into())));

        let binding = FormBinding::for_kind(EntityKind::Tag);
        let config = config().with_pagination_retry(RetryPolicy::new(2, 0, 1));
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let err = resolver
            .exists_across_pages(&ResourceDescriptor::new(EntityKind::Tag, "Target"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Driver(DriverError::NotInteractable(_))));
    }

    #[tokio::test]
    async fn ragged_category_column_is_driver_error() {
        let mut driver = MockUiDriver::new();
        listing_ready(&mut driver);
        driver
            .expect_read_column()
            .withf(|column| column == "name")
            .returning(|_| Ok(vec!["PTPDate".to_string(), "Region".to_string()]));
        driver
            .expect_read_column()
            .withf(|column| column == "category")
            .returning(|_| Ok(vec!["General".to_string()]));

        let binding = FormBinding::for_kind(EntityKind::Field);
        let config = config();
        let resolver = EntityResolver::new(&driver, &binding, &config);

        let err = resolver
            .exists_across_pages(
                &ResourceDescriptor::new(EntityKind::Field, "Region").with_category("General"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Driver(DriverError::Other(_))));
    }
}
