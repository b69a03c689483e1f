//! Theme Cart Core - Shared types library.
//!
//! This crate provides common types used across the theme cart components:
//! - `storefront` - Cart gateway, store and synchronizer
//! - `cli` - Command-line driver for a live storefront cart
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients,
//! no async runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for variant IDs, line keys, trigger IDs and money

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
