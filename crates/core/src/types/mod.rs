//! Core types for the theme cart.
//!
//! This module provides type-safe wrappers for common cart concepts.

pub mod id;
pub mod price;

pub use id::*;
pub use price::{Money, MoneyFormat, MoneyFormatError};
