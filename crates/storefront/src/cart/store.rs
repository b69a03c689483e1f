//! Reactive cart state.
//!
//! The store owns exactly one [`CartState`] and publishes it through a
//! `tokio::sync::watch` channel. UI bindings hold a receiver and re-render
//! on change; they always see a whole state, never a half-applied snapshot.

use theme_cart_core::{LineKey, Money, MoneyFormat};
use tokio::sync::watch;

use super::types::{CartSnapshot, LineItem};

/// Transient UI flags, owned by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiState {
    /// A mutation is in flight.
    pub loading: bool,
    /// Message from the last failed mutation.
    pub error: Option<String>,
}

/// Everything a cart binding renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartState {
    /// Last snapshot received from the storefront.
    pub snapshot: CartSnapshot,
    /// `snapshot.total_price` rendered with the shop money format.
    pub formatted_total: String,
    /// Loading and error flags.
    pub ui: UiState,
}

/// Single owner of the cart state.
#[derive(Debug)]
pub struct CartStore {
    state: watch::Sender<CartState>,
    money_format: Option<MoneyFormat>,
}

impl CartStore {
    /// Create an empty store.
    ///
    /// `money_format` is the shop template; `None` uses the `$0.00` fallback.
    #[must_use]
    pub fn new(money_format: Option<MoneyFormat>) -> Self {
        let initial = CartState {
            snapshot: CartSnapshot::default(),
            formatted_total: Money::default().format(money_format.as_ref()),
            ui: UiState::default(),
        };
        let (state, _) = watch::channel(initial);
        Self {
            state,
            money_format,
        }
    }

    /// Replace the snapshot and its derived total in one step.
    pub fn apply(&self, snapshot: CartSnapshot) {
        if !snapshot.is_consistent() {
            tracing::warn!(
                item_count = snapshot.item_count,
                lines = snapshot.items.len(),
                "Cart snapshot item_count disagrees with its lines"
            );
        }

        let formatted_total = self.format_money(snapshot.total_price);
        self.state.send_modify(|state| {
            state.snapshot = snapshot;
            state.formatted_total = formatted_total;
        });
    }

    /// Set the loading flag.
    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.ui.loading != loading;
            state.ui.loading = loading;
            changed
        });
    }

    /// Set or clear the error message.
    pub fn set_error(&self, error: Option<String>) {
        self.state.send_if_modified(|state| {
            let changed = state.ui.error != error;
            state.ui.error = error;
            changed
        });
    }

    /// Look up a line by key.
    #[must_use]
    pub fn lookup(&self, key: &LineKey) -> Option<LineItem> {
        self.state.borrow().snapshot.line(key).cloned()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn current(&self) -> CartState {
        self.state.borrow().clone()
    }

    /// Copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.state.borrow().snapshot.clone()
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.state.borrow().snapshot.item_count
    }

    #[must_use]
    pub fn total_price(&self) -> Money {
        self.state.borrow().snapshot.total_price
    }

    #[must_use]
    pub fn formatted_total(&self) -> String {
        self.state.borrow().formatted_total.clone()
    }

    #[must_use]
    pub fn ui(&self) -> UiState {
        self.state.borrow().ui.clone()
    }

    /// Render an amount with the shop format, or `$0.00` style without one.
    #[must_use]
    pub fn format_money(&self, amount: Money) -> String {
        amount.format(self.money_format.as_ref())
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new(None)
    }
}
