//! Wire and domain types for the storefront cart.
//!
//! Field names follow the storefront AJAX API (`item_count`, `total_price`);
//! prices are integers in minor currency units.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use theme_cart_core::{LineKey, Money, VariantId};

use super::error::ValidationError;

// =============================================================================
// Snapshot Types
// =============================================================================

/// Full authoritative cart state as returned by `/cart.js` and `/cart/change.js`.
///
/// Replaced wholesale on every successful server interaction, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Storefront cart token, also the value of the `cart` cookie.
    #[serde(default)]
    pub token: Option<String>,
    /// Lines in server order.
    #[serde(default)]
    pub items: Vec<LineItem>,
    /// Sum of line quantities.
    #[serde(default)]
    pub item_count: u32,
    /// Cart total in minor units.
    #[serde(default)]
    pub total_price: Money,
}

impl CartSnapshot {
    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a line by its key.
    #[must_use]
    pub fn line(&self, key: &LineKey) -> Option<&LineItem> {
        self.items.iter().find(|item| &item.key == key)
    }

    /// Whether `item_count` agrees with the presence of lines.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        (self.item_count == 0) == self.items.is_empty()
    }
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Stable line identifier used to target updates and removals.
    pub key: LineKey,
    /// Variant ID.
    pub id: VariantId,
    /// Quantity (at least 1).
    pub quantity: u32,
    /// Unit price in minor units.
    #[serde(default)]
    pub price: Money,
    /// Line total in minor units, when the storefront reports it.
    #[serde(default)]
    pub line_price: Option<Money>,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Custom line properties.
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: BTreeMap<String, String>,
    /// Variant availability at the time it was added.
    #[serde(default = "default_available")]
    pub available: bool,
}

const fn default_available() -> bool {
    true
}

/// Properties arrive as `null`, an object of strings, or occasionally
/// non-string values; everything but `null` is kept as text.
fn deserialize_properties<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect())
}

// =============================================================================
// Request Types
// =============================================================================

/// A line to add, as posted to `/cart/add.js`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineInput {
    /// Variant ID.
    pub id: VariantId,
    /// Quantity to add.
    pub quantity: u32,
    /// Custom line properties; omitted from the body when empty.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl LineInput {
    /// A line without properties.
    #[must_use]
    pub const fn new(id: VariantId, quantity: u32) -> Self {
        Self {
            id,
            quantity,
            properties: BTreeMap::new(),
        }
    }

    /// Attach a line property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Body of a bundle add.
#[derive(Debug, Serialize)]
pub(crate) struct AddManyBody<'a> {
    pub items: &'a [LineInput],
}

/// Body of `/cart/change.js`.
#[derive(Debug, Serialize)]
pub(crate) struct ChangeBody<'a> {
    pub id: &'a LineKey,
    pub quantity: u32,
}

/// A cart mutation originating from a UI trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    /// Add a single line.
    AddOne(LineInput),
    /// Add several lines in one request.
    AddMany(Vec<LineInput>),
    /// Set the quantity of an existing line; 0 removes it.
    UpdateQuantity { key: LineKey, quantity: u32 },
    /// Remove a line (sent as quantity 0).
    Remove { key: LineKey },
}

impl MutationRequest {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AddOne(_) => "add_one",
            Self::AddMany(_) => "add_many",
            Self::UpdateQuantity { .. } => "update_quantity",
            Self::Remove { .. } => "remove",
        }
    }

    /// Check local preconditions before any network call.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for zero-quantity adds or empty bundles.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::AddOne(line) => validate_line(line),
            Self::AddMany(lines) => {
                if lines.is_empty() {
                    return Err(ValidationError::EmptyBundle);
                }
                lines.iter().try_for_each(validate_line)
            }
            Self::UpdateQuantity { .. } | Self::Remove { .. } => Ok(()),
        }
    }
}

fn validate_line(line: &LineInput) -> Result<(), ValidationError> {
    if line.quantity == 0 {
        return Err(ValidationError::InvalidQuantity("0".to_string()));
    }
    Ok(())
}
