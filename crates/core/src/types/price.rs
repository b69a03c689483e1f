//! Money in minor currency units and storefront money format templates.
//!
//! The storefront reports every price as an integer number of minor units
//! (cents for USD). [`Money`] keeps that representation and only converts to
//! a decimal amount for display, either through a shop-provided
//! [`MoneyFormat`] template such as `"${{amount}}"` or through the fixed
//! fallback `"$" + amount with two decimals`.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// An amount of money in minor currency units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create money from minor units (e.g., cents).
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Get the amount in minor units.
    #[must_use]
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Get the amount in the currency's standard unit (e.g., dollars).
    #[must_use]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Format using the shop template if one is given, else the fallback.
    #[must_use]
    pub fn format(&self, template: Option<&MoneyFormat>) -> String {
        template.map_or_else(|| self.fallback_display(), |t| t.format(*self))
    }

    /// Fixed fallback format: dollar sign, two decimals, no grouping.
    #[must_use]
    pub fn fallback_display(&self) -> String {
        format!("${}", fixed(self.to_decimal(), 2))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fallback_display())
    }
}

impl From<i64> for Money {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

/// Errors that can occur when parsing a [`MoneyFormat`] template.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyFormatError {
    /// The template has no `{{ ... }}` placeholder.
    #[error("money format has no placeholder")]
    MissingPlaceholder,
    /// The placeholder name is not a known amount style.
    #[error("unknown money format placeholder: {0}")]
    UnknownPlaceholder(String),
}

/// How the amount inside a money template is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AmountStyle {
    /// `{{amount}}` - 1,234.56
    Amount,
    /// `{{amount_no_decimals}}` - 1,235
    NoDecimals,
    /// `{{amount_with_comma_separator}}` - 1.234,56
    CommaSeparator,
    /// `{{amount_no_decimals_with_comma_separator}}` - 1.235
    NoDecimalsCommaSeparator,
    /// `{{amount_with_apostrophe_separator}}` - 1'234.56
    ApostropheSeparator,
}

impl AmountStyle {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "amount" => Some(Self::Amount),
            "amount_no_decimals" => Some(Self::NoDecimals),
            "amount_with_comma_separator" => Some(Self::CommaSeparator),
            "amount_no_decimals_with_comma_separator" => Some(Self::NoDecimalsCommaSeparator),
            "amount_with_apostrophe_separator" => Some(Self::ApostropheSeparator),
            _ => None,
        }
    }

    /// (decimal places, thousands delimiter, decimal mark)
    const fn layout(self) -> (u32, char, char) {
        match self {
            Self::Amount => (2, ',', '.'),
            Self::NoDecimals => (0, ',', '.'),
            Self::CommaSeparator => (2, '.', ','),
            Self::NoDecimalsCommaSeparator => (0, '.', ','),
            Self::ApostropheSeparator => (2, '\'', '.'),
        }
    }
}

/// A shop money format template, e.g. `"${{amount}}"` or `"{{amount_with_comma_separator}} €"`.
///
/// Only the first placeholder is substituted; the text around it is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MoneyFormat {
    prefix: String,
    style: AmountStyle,
    suffix: String,
}

impl MoneyFormat {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyFormatError`] if the template has no placeholder or the
    /// placeholder name is not one of the supported amount styles.
    pub fn parse(template: &str) -> Result<Self, MoneyFormatError> {
        let start = template
            .find("{{")
            .ok_or(MoneyFormatError::MissingPlaceholder)?;
        let (prefix, rest) = template.split_at(start);
        let rest = rest.trim_start_matches('{');
        let end = rest
            .find("}}")
            .ok_or(MoneyFormatError::MissingPlaceholder)?;
        let (name, suffix) = rest.split_at(end);
        let name = name.trim();
        let style = AmountStyle::from_name(name)
            .ok_or_else(|| MoneyFormatError::UnknownPlaceholder(name.to_string()))?;

        Ok(Self {
            prefix: prefix.to_string(),
            style,
            suffix: suffix.trim_start_matches('}').to_string(),
        })
    }

    /// Render an amount with this template.
    #[must_use]
    pub fn format(&self, money: Money) -> String {
        let (places, delimiter, mark) = self.style.layout();
        let rendered = fixed(money.to_decimal(), places);

        let (int_part, frac_part) = match rendered.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (rendered.as_str(), None),
        };

        let mut amount = group_thousands(int_part, delimiter);
        if let Some(frac) = frac_part {
            amount.push(mark);
            amount.push_str(frac);
        }

        format!("{}{amount}{}", self.prefix, self.suffix)
    }
}

impl core::str::FromStr for MoneyFormat {
    type Err = MoneyFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Round half away from zero and render with exactly `places` decimals.
fn fixed(amount: Decimal, places: u32) -> String {
    let rounded = amount.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.prec$}", prec = places as usize)
}

fn group_thousands(int_part: &str, delimiter: char) -> String {
    let (sign, digits) = int_part
        .strip_prefix('-')
        .map_or(("", int_part), |d| ("-", d));

    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3 + 1);
    out.push_str(sign);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(delimiter);
        }
        out.push(c);
    }
    out
}
