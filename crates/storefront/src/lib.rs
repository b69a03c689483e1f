//! Theme Cart Storefront - cart synchronization against the storefront AJAX API.
//!
//! # Architecture
//!
//! - [`cart::CartGateway`] wraps the fixed cart endpoints (`/cart/add.js`,
//!   `/cart/change.js`, `/cart.js`); [`cart::HttpCartGateway`] is the `reqwest`
//!   implementation
//! - [`cart::CartStore`] owns the single cart snapshot plus transient UI flags
//!   and publishes every change over a `tokio::sync::watch` channel
//! - [`cart::CartSynchronizer`] is the only entry point for mutations; it drops
//!   duplicate submits per trigger and signals the cart drawer
//! - [`cart::trigger`] turns product forms and quick-add controls into requests
//!
//! The storefront is the source of truth - the local snapshot is only ever
//! replaced wholesale by a server response, never patched.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use theme_cart_storefront::{CartConfig, cart::*};
//!
//! let config = CartConfig::from_env()?;
//! let gateway = HttpCartGateway::new(&config)?;
//! let store = Arc::new(CartStore::new(config.money_format.clone()));
//! let sync = CartSynchronizer::new(gateway, Arc::clone(&store), SyncOptions::from(&config));
//!
//! sync.hydrate().await.ok();
//! let request = ProductForm::from_urlencoded("id=39897499729985&quantity=2")?.into_request();
//! sync.mutate(&TriggerId::from("product-form"), request, true).await;
//! println!("{}", store.formatted_total());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;

pub use config::{CartConfig, ConfigError};
