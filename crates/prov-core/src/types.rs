//! Core types for the provisioning engine
//!
//! Defines the fundamental types:
//! - Entity kinds and resource descriptors
//! - Typed form field specifications
//! - Match results and tiers
//! - Desired state for updates
//! - Provisioning outcomes

use crate::error::FailureReason;
use indexmap::IndexMap;
use prov_capture::ApiCallRecord;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique session identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration entity kinds managed through the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Top-level category
    Category,
    /// Agent skill (per category)
    Skill,
    /// Custom data field (per category)
    Field,
    /// Lead pipeline stage (per category)
    LeadStage,
    /// Ticket type
    TicketType,
    /// Ticket priority
    TicketPriority,
    /// Ticket workflow stage (per category)
    TicketStage,
    /// Disposition screen
    DispositionScreen,
    /// Disposition (per category)
    Disposition,
    /// Tag
    Tag,
    /// Message template (per category)
    Template,
    /// Routing queue
    Queue,
    /// Agent team
    Team,
    /// Holiday calendar entry
    Holiday,
    /// Business hours profile
    BusinessHours,
    /// Saved custom view
    CustomView,
}

impl EntityKind {
    /// Every kind, in declaration order
    pub const ALL: [EntityKind; 16] = [
        Self::Category,
        Self::Skill,
        Self::Field,
        Self::LeadStage,
        Self::TicketType,
        Self::TicketPriority,
        Self::TicketStage,
        Self::DispositionScreen,
        Self::Disposition,
        Self::Tag,
        Self::Template,
        Self::Queue,
        Self::Team,
        Self::Holiday,
        Self::BusinessHours,
        Self::CustomView,
    ];

    /// Stable snake_case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Skill => "skill",
            Self::Field => "field",
            Self::LeadStage => "lead_stage",
            Self::TicketType => "ticket_type",
            Self::TicketPriority => "ticket_priority",
            Self::TicketStage => "ticket_stage",
            Self::DispositionScreen => "disposition_screen",
            Self::Disposition => "disposition",
            Self::Tag => "tag",
            Self::Template => "template",
            Self::Queue => "queue",
            Self::Team => "team",
            Self::Holiday => "holiday",
            Self::BusinessHours => "business_hours",
            Self::CustomView => "custom_view",
        }
    }

    /// Whether entities of this kind live under a category
    #[inline]
    #[must_use]
    pub fn is_category_scoped(&self) -> bool {
        matches!(
            self,
            Self::Skill
                | Self::Field
                | Self::LeadStage
                | Self::TicketStage
                | Self::Disposition
                | Self::Template
        )
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the entity being provisioned
///
/// Immutable for the duration of one provisioning call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Entity kind (selects the form binding)
    pub kind: EntityKind,
    /// Optional scoping key
    #[serde(default)]
    pub category: Option<String>,
    /// Primary matchable key
    pub name: String,
    /// Optional secondary label
    #[serde(default)]
    pub display_name: Option<String>,
    /// Typed field payload for creation forms
    #[serde(default)]
    pub field: Option<FieldSpec>,
}

impl ResourceDescriptor {
    /// Create new descriptor
    #[inline]
    #[must_use]
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            category: None,
            name: name.into(),
            display_name: None,
            field: None,
        }
    }

    /// With category
    #[inline]
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// With display name
    #[inline]
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// With typed field payload
    #[inline]
    #[must_use]
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.field = Some(field);
        self
    }

    /// Human-readable label for logs (`kind:category/name`)
    #[must_use]
    pub fn label(&self) -> String {
        match &self.category {
            Some(category) => format!("{}:{}/{}", self.kind, category.trim(), self.name.trim()),
            None => format!("{}:{}", self.kind, self.name.trim()),
        }
    }
}

/// Data field type offered by the console's field form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Single-line text
    TextSingleLine,
    /// Multi-line text
    TextArea,
    /// Number
    Number,
    /// Date
    Date,
    /// Radio buttons
    SingleSelectRadio,
    /// Dropdown
    SingleSelectDropdown,
    /// Checkboxes
    MultiSelectCheckbox,
    /// Multi-select list
    MultiSelectList,
}

impl FieldKind {
    /// Label of this type in the console's type selector
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::TextSingleLine => "Text (Single Line)",
            Self::TextArea => "Text Area",
            Self::Number => "Number",
            Self::Date => "Date",
            Self::SingleSelectRadio => "Radio Button",
            Self::SingleSelectDropdown => "Dropdown",
            Self::MultiSelectCheckbox => "Checkbox",
            Self::MultiSelectList => "Multi Select List",
        }
    }

    /// Select kinds carry options
    #[inline]
    #[must_use]
    pub fn is_select(&self) -> bool {
        matches!(
            self,
            Self::SingleSelectRadio
                | Self::SingleSelectDropdown
                | Self::MultiSelectCheckbox
                | Self::MultiSelectList
        )
    }

    /// Kinds that take `min` / `max`
    #[inline]
    #[must_use]
    pub fn uses_bounds(&self) -> bool {
        matches!(
            self,
            Self::TextSingleLine | Self::TextArea | Self::Number | Self::Date
        )
    }
}

/// One logical data field within a creation or update form
///
/// Constraints that do not apply to `kind` are ignored, never validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field type
    pub kind: FieldKind,
    /// Lower bound (length, value or date)
    #[serde(default)]
    pub min: Option<String>,
    /// Upper bound (length, value or date)
    #[serde(default)]
    pub max: Option<String>,
    /// Visible lines (text area)
    #[serde(default)]
    pub number_of_lines: Option<u32>,
    /// Option labels (select kinds)
    #[serde(default)]
    pub options: Vec<String>,
    /// Option values, positionally paired with `options`
    #[serde(default)]
    pub option_values: Vec<String>,
    /// Offer an "other" choice (select kinds)
    #[serde(default)]
    pub allow_other: bool,
    /// Tooltip text (any kind)
    #[serde(default)]
    pub tooltip_message: Option<String>,
}

impl FieldSpec {
    /// Create new field spec with no constraints
    #[inline]
    #[must_use]
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            min: None,
            max: None,
            number_of_lines: None,
            options: Vec::new(),
            option_values: Vec::new(),
            allow_other: false,
            tooltip_message: None,
        }
    }

    /// With min / max bounds
    #[inline]
    #[must_use]
    pub fn with_bounds(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.min = Some(min.into());
        self.max = Some(max.into());
        self
    }

    /// With number of lines
    #[inline]
    #[must_use]
    pub fn with_lines(mut self, lines: u32) -> Self {
        self.number_of_lines = Some(lines);
        self
    }

    /// With option labels
    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// With option values
    #[must_use]
    pub fn with_option_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.option_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Offer an "other" choice
    #[inline]
    #[must_use]
    pub fn allowing_other(mut self) -> Self {
        self.allow_other = true;
        self
    }

    /// With tooltip
    #[inline]
    #[must_use]
    pub fn with_tooltip(mut self, message: impl Into<String>) -> Self {
        self.tooltip_message = Some(message.into());
        self
    }
}

/// Strength of an existence match
///
/// Ordered so that `Exact > CaseInsensitive > WhitespaceNormalized > NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// No listing entry matched
    NotFound,
    /// Equal after collapsing whitespace runs and folding case
    WhitespaceNormalized,
    /// Equal after folding case
    CaseInsensitive,
    /// Equal after trimming
    Exact,
}

impl MatchTier {
    /// Any tier other than `NotFound`
    #[inline]
    #[must_use]
    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::WhitespaceNormalized => "whitespace_normalized",
            Self::CaseInsensitive => "case_insensitive",
            Self::Exact => "exact",
        };
        f.write_str(s)
    }
}

/// Outcome of an existence query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Match strength
    pub tier: MatchTier,
    /// Listing text that matched, if any
    pub matched: Option<String>,
    /// Near matches, for diagnostics only
    pub similar_candidates: Vec<String>,
    /// Listing pages read to reach this result
    pub pages_read: usize,
}

impl MatchResult {
    /// Create found result
    #[inline]
    #[must_use]
    pub fn found(tier: MatchTier, matched: impl Into<String>) -> Self {
        Self {
            tier,
            matched: Some(matched.into()),
            similar_candidates: Vec::new(),
            pages_read: 1,
        }
    }

    /// Create not-found result
    #[inline]
    #[must_use]
    pub fn not_found(similar_candidates: Vec<String>) -> Self {
        Self {
            tier: MatchTier::NotFound,
            matched: None,
            similar_candidates,
            pages_read: 1,
        }
    }

    /// With number of pages read
    #[inline]
    #[must_use]
    pub fn with_pages_read(mut self, pages: usize) -> Self {
        self.pages_read = pages;
        self
    }

    /// Tier is not `NotFound`
    #[inline]
    #[must_use]
    pub fn is_found(&self) -> bool {
        self.tier.is_found()
    }
}

/// Desired value for one form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free text, written by filling
    Text(String),
    /// Option label, written by selecting
    Choice(String),
    /// Toggle state
    Flag(bool),
}

impl FieldValue {
    /// Whether the form's current value already equals this one
    ///
    /// Text and choices compare trimmed; an unreadable value counts as empty.
    #[must_use]
    pub fn matches(&self, current: Option<&str>) -> bool {
        let current = current.map_or("", str::trim);
        match self {
            Self::Text(v) | Self::Choice(v) => current == v.trim(),
            Self::Flag(v) => parse_flag(current) == *v,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "on" | "yes" | "checked" | "1"
    )
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(v) | Self::Choice(v) => f.write_str(v),
            Self::Flag(v) => write!(f, "{v}"),
        }
    }
}

/// Desired field values for an update, keyed by logical field id
///
/// Fields absent from the map are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredState {
    fields: IndexMap<String, FieldValue>,
}

impl DesiredState {
    /// Create empty desired state
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Desire a text value
    #[must_use]
    pub fn text(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldValue::Text(value.into()));
        self
    }

    /// Desire a selected option
    #[must_use]
    pub fn choice(mut self, field: impl Into<String>, option: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldValue::Choice(option.into()));
        self
    }

    /// Desire a toggle state
    #[must_use]
    pub fn flag(mut self, field: impl Into<String>, on: bool) -> Self {
        self.fields.insert(field.into(), FieldValue::Flag(on));
        self
    }

    /// Desired value for a field
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of desired fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether nothing is desired
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Diagnostic payload of a failed provisioning call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Classification
    pub reason: FailureReason,
    /// Human-readable detail
    pub detail: String,
    /// Failed calls captured during the submission window
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_calls: Vec<ApiCallRecord>,
    /// Near matches seen while resolving
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similar_candidates: Vec<String>,
}

impl Failure {
    /// Create new failure without diagnostics
    #[inline]
    #[must_use]
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            failed_calls: Vec::new(),
            similar_candidates: Vec::new(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

/// Result returned to the caller of a provisioning operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// Entity was absent and has been created
    Created,
    /// Entity was already present; nothing written
    AlreadyExists,
    /// Entity existed and differing fields were written
    Updated,
    /// Update requested but every field already matched
    NoOpSkipped,
    /// Operation failed
    Failed(Failure),
}

impl ProvisionOutcome {
    /// Whether this is `Failed`
    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Failure payload, if failed
    #[inline]
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(f) => Some(f),
            _ => None,
        }
    }

    /// Failure reason, if failed
    #[inline]
    #[must_use]
    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure().map(|f| f.reason)
    }

    /// Stable snake_case name of the variant
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AlreadyExists => "already_exists",
            Self::Updated => "updated",
            Self::NoOpSkipped => "no_op_skipped",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(failure) => write!(f, "failed ({failure})"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tier_ordering() {
        assert!(MatchTier::Exact > MatchTier::CaseInsensitive);
        assert!(MatchTier::CaseInsensitive > MatchTier::WhitespaceNormalized);
        assert!(MatchTier::WhitespaceNormalized > MatchTier::NotFound);
        assert!(!MatchTier::NotFound.is_found());
    }

    #[test]
    fn descriptor_label() {
        let scoped = ResourceDescriptor::new(EntityKind::Field, " PTPDate ").with_category("General");
        let plain = ResourceDescriptor::new(EntityKind::Tag, "vip");

        assert_eq!(scoped.label(), "field:General/PTPDate");
        assert_eq!(plain.label(), "tag:vip");
    }

    #[test]
    fn descriptor_deserializes_from_row() {
        let row = r#"{
            "kind": "field",
            "category": "General",
            "name": "PTPDate",
            "field": {"kind": "TextSingleLine", "min": "0", "max": "50"}
        }"#;
        let descriptor: ResourceDescriptor = serde_json::from_str(row).unwrap();

        assert_eq!(
            descriptor,
            ResourceDescriptor::new(EntityKind::Field, "PTPDate")
                .with_category("General")
                .with_field(FieldSpec::new(FieldKind::TextSingleLine).with_bounds("0", "50"))
        );
    }

    #[test]
    fn field_value_matching() {
        assert!(FieldValue::Text("Sales".into()).matches(Some(" Sales ")));
        assert!(!FieldValue::Text("Sales".into()).matches(Some("sales")));
        assert!(FieldValue::Text(String::new()).matches(None));
        assert!(FieldValue::Flag(true).matches(Some("checked")));
        assert!(FieldValue::Flag(false).matches(None));
        assert!(!FieldValue::Flag(false).matches(Some("on")));
    }

    #[test]
    fn desired_state_keeps_insertion_order() {
        let desired = DesiredState::new()
            .text("display_name", "Promise To Pay")
            .flag("active", true)
            .choice("type", "Date");

        let keys: Vec<_> = desired.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["display_name", "active", "type"]);
        assert_eq!(desired.len(), 3);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(ProvisionOutcome::Created).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "created"}));

        let failed = ProvisionOutcome::Failed(Failure::new(FailureReason::Timeout, "listing"));
        assert_eq!(failed.failure_reason(), Some(FailureReason::Timeout));
        assert_eq!(failed.to_string(), "failed (timeout: listing)");
    }
}
