//! Newtype identifiers for type-safe cart references.
//!
//! Use the `define_id!` macro for numeric storefront IDs and `define_key!`
//! for opaque string keys. Both prevent accidentally mixing, say, a variant ID
//! with a line key when building a cart request.

/// Macro to define a type-safe numeric ID wrapper.
///
/// Creates a newtype wrapper around `u64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_u64()`
/// - `From<u64>`, `Into<u64>`, `Display` and `FromStr` implementations
///
/// # Example
///
/// ```rust
/// # use theme_cart_core::define_id;
/// define_id!(ProductId);
/// define_id!(OptionId);
///
/// let product_id = ProductId::new(1);
/// let option_id: OptionId = "1".parse().unwrap();
///
/// // These are different types, so this won't compile:
/// // let _: ProductId = option_id;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create a new ID from a u64 value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the underlying u64 value.
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Macro to define a type-safe opaque string key.
///
/// Keys are compared byte-for-byte and never interpreted.
#[macro_export]
macro_rules! define_key {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new key.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Borrow the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_string())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(VariantId);

define_key!(LineKey);
define_key!(TriggerId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_id_from_str_trims() {
        let id: VariantId = " 39897499729985 ".parse().unwrap();
        assert_eq!(id.as_u64(), 39_897_499_729_985);
    }

    #[test]
    fn test_variant_id_rejects_non_numeric() {
        assert!("gid://shopify/ProductVariant/1".parse::<VariantId>().is_err());
        assert!("".parse::<VariantId>().is_err());
    }

    #[test]
    fn test_variant_id_serde_transparent() {
        let id = VariantId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: VariantId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_line_key_is_opaque() {
        let key = LineKey::from("39897499729985:5c0e6e1f9f4e");
        assert_eq!(key.as_str(), "39897499729985:5c0e6e1f9f4e");
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            "\"39897499729985:5c0e6e1f9f4e\""
        );
    }

    #[test]
    fn test_trigger_ids_compare_by_value() {
        assert_eq!(TriggerId::from("qty-plus"), TriggerId::new("qty-plus"));
        assert_ne!(TriggerId::from("qty-plus"), TriggerId::from("qty-minus"));
    }
}
