//! Cart synchronization: remote gateway, reactive store and mutation synchronizer.
//!
//! # Flow
//!
//! ```text
//! trigger -> CartSynchronizer::mutate -> CartGateway -> CartStore::apply -> watch subscribers
//!                                                                        \-> CartEvent::OpenDrawer
//! ```
//!
//! Each trigger (product form, quick-add button, quantity control) has at most
//! one mutation in flight; a second submit while the first is pending is
//! dropped silently. Different triggers may race, in which case the snapshot
//! of whichever response lands last wins - the server is authoritative and
//! every response is a full snapshot.

mod error;
mod gateway;
mod store;
mod sync;
pub mod trigger;
mod types;

pub use error::{GatewayError, SyncError, ValidationError};
pub use gateway::{CartGateway, HttpCartGateway};
pub use store::{CartState, CartStore, UiState};
pub use sync::{CartEvent, CartSynchronizer, MutationOutcome, SyncOptions};
pub use trigger::{BundleForm, ProductForm, QuickAdd};
pub use types::{CartSnapshot, LineInput, LineItem, MutationRequest};

pub use theme_cart_core::{LineKey, Money, TriggerId, VariantId};
