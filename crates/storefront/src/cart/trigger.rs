//! Adapters from UI submissions to [`MutationRequest`]s.
//!
//! Product forms post `id`, `quantity` and `properties[Name]` fields; bundle
//! forms post `items[n][id]`, `items[n][quantity]` and
//! `items[n][properties][Name]`; quick-add buttons carry `variantId` and
//! `quantity` data attributes.

use std::collections::BTreeMap;

use serde::Deserialize;
use theme_cart_core::VariantId;

use super::error::ValidationError;
use super::types::{LineInput, MutationRequest};

/// A submitted product form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductForm {
    pub line: LineInput,
}

impl ProductForm {
    /// Read a product form from its field pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if `id` is missing or not numeric, or if
    /// `quantity` is present but not a positive integer.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut id = None;
        let mut quantity = None;
        let mut properties = BTreeMap::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "id" => id = Some(value.to_string()),
                "quantity" => quantity = Some(value.to_string()),
                _ => {
                    if let Some(name) = property_name(key)
                        && !value.is_empty()
                    {
                        properties.insert(name.to_string(), value.to_string());
                    }
                }
            }
        }

        let line = LineInput {
            id: parse_variant(id.as_deref())?,
            quantity: parse_quantity(quantity.as_deref())?,
            properties,
        };
        Ok(Self { line })
    }

    /// Read a product form from an `application/x-www-form-urlencoded` body.
    ///
    /// # Errors
    ///
    /// See [`ProductForm::from_pairs`].
    pub fn from_urlencoded(body: &str) -> Result<Self, ValidationError> {
        Self::from_pairs(url::form_urlencoded::parse(body.as_bytes()))
    }

    #[must_use]
    pub fn into_request(self) -> MutationRequest {
        MutationRequest::AddOne(self.line)
    }
}

/// A submitted bundle form adding several lines at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleForm {
    pub lines: Vec<LineInput>,
}

#[derive(Default)]
struct PartialLine {
    id: Option<String>,
    quantity: Option<String>,
    properties: BTreeMap<String, String>,
}

impl BundleForm {
    /// Read `items[n][...]` fields; lines keep the order of their index.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyBundle`] if no line is present, or the
    /// first line-level error.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut partials: BTreeMap<usize, PartialLine> = BTreeMap::new();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Some((index, field)) = bundle_field(key) else {
                continue;
            };
            let partial = partials.entry(index).or_default();
            match field {
                "[id]" => partial.id = Some(value.to_string()),
                "[quantity]" => partial.quantity = Some(value.to_string()),
                other => {
                    if let Some(name) = other
                        .strip_prefix("[properties]")
                        .and_then(|rest| rest.strip_prefix('['))
                        .and_then(|rest| rest.strip_suffix(']'))
                        && !value.is_empty()
                    {
                        partial
                            .properties
                            .insert(name.to_string(), value.to_string());
                    }
                }
            }
        }

        if partials.is_empty() {
            return Err(ValidationError::EmptyBundle);
        }

        let lines = partials
            .into_values()
            .map(|p| {
                Ok(LineInput {
                    id: parse_variant(p.id.as_deref())?,
                    quantity: parse_quantity(p.quantity.as_deref())?,
                    properties: p.properties,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(Self { lines })
    }

    /// Read a bundle form from an urlencoded body.
    ///
    /// # Errors
    ///
    /// See [`BundleForm::from_pairs`].
    pub fn from_urlencoded(body: &str) -> Result<Self, ValidationError> {
        Self::from_pairs(url::form_urlencoded::parse(body.as_bytes()))
    }

    #[must_use]
    pub fn into_request(self) -> MutationRequest {
        MutationRequest::AddMany(self.lines)
    }
}

/// Data carried by a quick-add button.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAdd {
    pub variant_id: Option<String>,
    pub quantity: Option<String>,
}

impl QuickAdd {
    /// Convert to an add request.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for a missing or invalid variant id or quantity.
    pub fn into_request(self) -> Result<MutationRequest, ValidationError> {
        Ok(MutationRequest::AddOne(LineInput::new(
            parse_variant(self.variant_id.as_deref())?,
            parse_quantity(self.quantity.as_deref())?,
        )))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// `properties[Name]` -> `Name`
fn property_name(key: &str) -> Option<&str> {
    key.strip_prefix("properties[")
        .and_then(|rest| rest.strip_suffix(']'))
        .filter(|name| !name.is_empty())
}

/// `items[3][quantity]` -> `(3, "[quantity]")`
fn bundle_field(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix("items[")?;
    let (index, field) = rest.split_once(']')?;
    let index = index.parse().ok()?;
    Some((index, field))
}

fn parse_variant(raw: Option<&str>) -> Result<VariantId, ValidationError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingVariant)?;
    raw.parse()
        .map_err(|_| ValidationError::InvalidVariant(raw.to_string()))
}

/// Missing or blank quantity means 1.
fn parse_quantity(raw: Option<&str>) -> Result<u32, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(1);
    };
    match raw.parse::<u32>() {
        Ok(0) | Err(_) => Err(ValidationError::InvalidQuantity(raw.to_string())),
        Ok(quantity) => Ok(quantity),
    }
}
