//! Cart commands.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_URL` - Storefront base URL
//! - `SHOP_MONEY_FORMAT` - Optional money template used for printed totals
//! - `CART_TOKEN` - Cart to resume (overridden by `--cart`)
//!
//! The storefront ties a cart to its `cart` cookie. Each run prints the cart
//! token; pass it back with `--cart` (or `CART_TOKEN`) so later commands act
//! on the same cart.

use std::fmt::Write as _;
use std::sync::Arc;

use theme_cart_core::{LineKey, TriggerId};
use theme_cart_storefront::CartConfig;
use theme_cart_storefront::cart::{
    CartState, CartStore, CartSynchronizer, GatewayError, HttpCartGateway, LineItem,
    MutationOutcome, MutationRequest, ProductForm, SyncOptions, ValidationError,
};
use thiserror::Error;

/// Errors that can occur while running a cart command.
#[derive(Debug, Error)]
pub enum CartCommandError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] theme_cart_storefront::ConfigError),

    /// The gateway could not be created.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The command arguments do not form a valid request.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// A property argument is not `name=value`.
    #[error("Invalid property (expected NAME=VALUE): {0}")]
    Property(String),

    /// The storefront rejected the mutation.
    #[error("Cart update failed: {0}")]
    Mutation(String),

    /// No line with this key in the cart.
    #[error("No line with key {0} in this cart (pass --cart to select a cart)")]
    UnknownLine(String),
}

/// A hydrated cart session against the configured storefront.
pub struct Session {
    sync: CartSynchronizer<HttpCartGateway>,
}

impl Session {
    /// Load configuration, build the synchronizer and hydrate the cart.
    ///
    /// `cart` selects an existing cart by token, overriding `CART_TOKEN`.
    /// A failed hydration is logged and the session continues with an empty cart.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is missing or the gateway cannot be built.
    pub async fn connect(cart: Option<String>) -> Result<Self, CartCommandError> {
        let mut config = CartConfig::from_env()?;
        if cart.is_some() {
            config.cart_token = cart;
        }
        tracing::debug!(
            storefront = %config.storefront_url,
            resuming = config.cart_token.is_some(),
            "Connecting to storefront"
        );

        let gateway = HttpCartGateway::new(&config)?;
        let store = Arc::new(CartStore::new(config.money_format.clone()));
        let sync = CartSynchronizer::new(gateway, store, SyncOptions::from(&config));

        if let Err(e) = sync.hydrate().await {
            tracing::warn!("Could not load cart, continuing with an empty cart: {e}");
        }

        Ok(Self { sync })
    }

    /// Add a variant, validated the same way as a product form submission.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid arguments or a rejected mutation.
    pub async fn add(
        &self,
        variant: &str,
        quantity: &str,
        properties: &[String],
    ) -> Result<(), CartCommandError> {
        let mut fields = vec![
            ("id".to_string(), variant.to_string()),
            ("quantity".to_string(), quantity.to_string()),
        ];
        for property in properties {
            let (name, value) = property
                .split_once('=')
                .filter(|(name, _)| !name.trim().is_empty())
                .ok_or_else(|| CartCommandError::Property(property.clone()))?;
            fields.push((format!("properties[{}]", name.trim()), value.to_string()));
        }

        let request = ProductForm::from_pairs(fields)?.into_request();
        self.run("add", request).await
    }

    /// Set a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storefront rejects the change.
    pub async fn update(&self, key: &str, quantity: u32) -> Result<(), CartCommandError> {
        let request = MutationRequest::UpdateQuantity {
            key: LineKey::from(key),
            quantity,
        };
        self.run("update", request).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the storefront rejects the removal.
    pub async fn remove(&self, key: &str) -> Result<(), CartCommandError> {
        let outcome = self
            .sync
            .remove(&TriggerId::from("remove"), &LineKey::from(key))
            .await;
        check(outcome)
    }

    /// Increase a line's quantity by one.
    ///
    /// # Errors
    ///
    /// Returns an error if the storefront rejects the change.
    pub async fn increment(&self, key: &str) -> Result<(), CartCommandError> {
        let line = known_line(self.sync.store(), key)?;
        let outcome = self
            .sync
            .increment_quantity(&TriggerId::from("increment"), &line.key)
            .await;
        check(outcome)
    }

    /// Decrease a line's quantity by one.
    ///
    /// # Errors
    ///
    /// Returns an error if the storefront rejects the change.
    pub async fn decrement(&self, key: &str) -> Result<(), CartCommandError> {
        let line = known_line(self.sync.store(), key)?;
        let outcome = self
            .sync
            .decrement_quantity(&TriggerId::from("decrement"), &line.key)
            .await;
        check(outcome)
    }

    async fn run(&self, trigger: &str, request: MutationRequest) -> Result<(), CartCommandError> {
        let outcome = self
            .sync
            .mutate(&TriggerId::from(trigger), request, false)
            .await;
        check(outcome)
    }

    /// Print the current cart to stdout.
    pub fn print(&self) {
        let rendered = render(&self.sync.store().current(), |amount| {
            self.sync.store().format_money(amount)
        });

        #[allow(clippy::print_stdout)]
        {
            print!("{rendered}");
        }
    }
}

/// The line for `key`, or an error when the cart has no such line.
fn known_line(store: &CartStore, key: &str) -> Result<LineItem, CartCommandError> {
    store
        .lookup(&LineKey::from(key))
        .ok_or_else(|| CartCommandError::UnknownLine(key.to_string()))
}

fn check(outcome: MutationOutcome) -> Result<(), CartCommandError> {
    match outcome {
        MutationOutcome::Applied => Ok(()),
        MutationOutcome::Skipped => {
            tracing::info!("Nothing to change");
            Ok(())
        }
        MutationOutcome::Dropped => {
            tracing::warn!("Another update for this command was still running");
            Ok(())
        }
        MutationOutcome::Failed(message) => Err(CartCommandError::Mutation(message)),
    }
}

/// Render a cart as plain text.
fn render<F>(state: &CartState, format_money: F) -> String
where
    F: Fn(theme_cart_core::Money) -> String,
{
    let snapshot = &state.snapshot;
    let mut out = String::new();
    if let Some(token) = &snapshot.token {
        let _ = writeln!(out, "Cart token: {token}");
    }
    if snapshot.is_empty() {
        out.push_str("Cart is empty\n");
        return out;
    }

    for item in &snapshot.items {
        let title = item.title.as_deref().unwrap_or("(untitled)");
        let _ = write!(out, "{:>3} x {title}", item.quantity);
        if !item.available {
            out.push_str(" [unavailable]");
        }
        let _ = writeln!(
            out,
            "  {}  [{}]",
            format_money(item.line_price.unwrap_or(item.price)),
            item.key
        );
        for (name, value) in &item.properties {
            let _ = writeln!(out, "        {name}: {value}");
        }
    }
    let _ = writeln!(
        out,
        "{} item(s), total {}",
        snapshot.item_count, state.formatted_total
    );
    out
}
