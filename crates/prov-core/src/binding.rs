//! Per-kind form bindings
//!
//! A [`FormBinding`] tells the generic engine where an entity kind lives in
//! the console: which listing columns to read, which actions open its forms,
//! which logical field ids to write, and which API call creates it.
//! [`BindingRegistry`] maps every [`EntityKind`] to its binding.

use crate::driver::FormAction;
use crate::types::EntityKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Logical field ids of the typed-field sub-form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIds {
    /// Field type selector
    pub type_selector: String,
    /// Lower bound input
    pub min: String,
    /// Upper bound input
    pub max: String,
    /// Number-of-lines input
    pub number_of_lines: String,
    /// Option label input prefix (indexed)
    pub option_label: String,
    /// Option value input prefix (indexed)
    pub option_value: String,
    /// "Allow other" toggle
    pub allow_other: String,
    /// Tooltip toggle
    pub tooltip_toggle: String,
    /// Tooltip text input
    pub tooltip_text: String,
}

impl FieldIds {
    /// Label input of option `index`
    #[inline]
    #[must_use]
    pub fn option_label_at(&self, index: usize) -> String {
        format!("{}[{}]", self.option_label, index)
    }

    /// Value input of option `index`
    #[inline]
    #[must_use]
    pub fn option_value_at(&self, index: usize) -> String {
        format!("{}[{}]", self.option_value, index)
    }
}

impl Default for FieldIds {
    fn default() -> Self {
        Self {
            type_selector: "field_type".into(),
            min: "min".into(),
            max: "max".into(),
            number_of_lines: "number_of_lines".into(),
            option_label: "option_label".into(),
            option_value: "option_value".into(),
            allow_other: "allow_other".into(),
            tooltip_toggle: "show_tooltip".into(),
            tooltip_text: "tooltip_message".into(),
        }
    }
}

/// Where and how one entity kind is provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormBinding {
    /// Entity kind
    pub kind: EntityKind,
    /// Listing column holding the entity name
    pub name_column: String,
    /// Listing column holding the category, for category-scoped kinds
    pub category_column: Option<String>,
    /// Action opening the creation form
    pub create_action: String,
    /// Action opening a row's edit form
    pub edit_action: String,
    /// Name input
    pub name_field: String,
    /// Display name input, if the form has one
    pub display_name_field: Option<String>,
    /// Category selector, for category-scoped kinds
    pub category_field: Option<String>,
    /// Typed-field sub-form, if the form has one
    pub field_ids: Option<FieldIds>,
    /// Selector that is visible once the listing has rendered
    pub listing_selector: String,
    /// Selector that is visible while a form is open
    pub form_selector: String,
    /// URL fragment of the creation API call
    pub create_endpoint: String,
    /// Whether the listing is paginated
    pub paginated: bool,
    /// Whether a 409 on submission means the entity already exists
    pub conflict_means_exists: bool,
}

impl FormBinding {
    /// Default binding for `kind`, following the console's naming scheme
    #[must_use]
    pub fn for_kind(kind: EntityKind) -> Self {
        let slug = kind.as_str();
        let scoped = kind.is_category_scoped();
        let has_display_name = matches!(
            kind,
            EntityKind::Field
                | EntityKind::DispositionScreen
                | EntityKind::Template
                | EntityKind::CustomView
        );

        Self {
            kind,
            name_column: "name".into(),
            category_column: scoped.then(|| "category".into()),
            create_action: format!("add_{slug}"),
            edit_action: format!("edit_{slug}"),
            name_field: "name".into(),
            display_name_field: has_display_name.then(|| "display_name".into()),
            category_field: scoped.then(|| "category".into()),
            field_ids: (kind == EntityKind::Field).then(FieldIds::default),
            listing_selector: format!("#{slug}-listing"),
            form_selector: format!("#{slug}-form"),
            create_endpoint: format!("/api/{slug}"),
            paginated: true,
            conflict_means_exists: true,
        }
    }

    /// Whether lookups and creation are scoped by category
    #[inline]
    #[must_use]
    pub fn is_category_scoped(&self) -> bool {
        self.category_column.is_some() && self.category_field.is_some()
    }

    /// Action opening the creation form
    #[inline]
    #[must_use]
    pub fn create_form(&self) -> FormAction {
        FormAction::Create {
            action: self.create_action.clone(),
        }
    }

    /// Action opening the edit form of `row`
    #[inline]
    #[must_use]
    pub fn edit_form(&self, row: impl Into<String>, category: Option<String>) -> FormAction {
        FormAction::Edit {
            action: self.edit_action.clone(),
            row: row.into(),
            category,
        }
    }

    /// With single-page listing
    #[inline]
    #[must_use]
    pub fn unpaginated(mut self) -> Self {
        self.paginated = false;
        self
    }

    /// Treat 409 as a hard validation failure for this kind
    #[inline]
    #[must_use]
    pub fn conflict_is_failure(mut self) -> Self {
        self.conflict_means_exists = false;
        self
    }
}

/// Registry of form bindings by entity kind
#[derive(Debug, Default, Clone)]
pub struct BindingRegistry {
    bindings: HashMap<EntityKind, FormBinding>,
}

impl BindingRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Create registry with a default binding for every kind
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in EntityKind::ALL {
            registry.register(FormBinding::for_kind(kind));
        }
        registry
    }

    /// Register or replace the binding of `binding.kind`
    pub fn register(&mut self, binding: FormBinding) -> Option<FormBinding> {
        self.bindings.insert(binding.kind, binding)
    }

    /// Binding for `kind`
    #[inline]
    #[must_use]
    pub fn get(&self, kind: EntityKind) -> Option<&FormBinding> {
        self.bindings.get(&kind)
    }

    /// Number of bound kinds
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<_> = self.bindings.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
