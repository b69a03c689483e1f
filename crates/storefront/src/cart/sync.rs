//! Cart mutation synchronizer.
//!
//! Every cart change goes through [`CartSynchronizer::mutate`]:
//!
//! 1. A trigger that already has a mutation in flight is ignored.
//! 2. `loading` is set and the previous error cleared.
//! 3. The request is validated and dispatched to the gateway, bounded by the
//!    request timeout.
//! 4. On success the snapshot is applied and, if asked, the drawer is opened.
//! 5. On failure only the error message changes; the snapshot is untouched.
//! 6. `loading` and the in-flight mark are cleared on every exit path.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use theme_cart_core::{LineKey, TriggerId};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::error::{GatewayError, SyncError};
use super::gateway::CartGateway;
use super::store::CartStore;
use super::types::{CartSnapshot, MutationRequest};
use crate::config::CartConfig;

const EVENT_CAPACITY: usize = 16;

/// Timing knobs for the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound for a single gateway call.
    pub request_timeout: Duration,
    /// Delay before the drawer-open signal, letting bindings render first.
    pub drawer_delay: Duration,
    /// Initial fetch attempts (at least one is always made).
    pub hydrate_attempts: u32,
    /// Pause between hydration attempts.
    pub hydrate_backoff: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            drawer_delay: Duration::from_millis(50),
            hydrate_attempts: 3,
            hydrate_backoff: Duration::from_millis(250),
        }
    }
}

impl From<&CartConfig> for SyncOptions {
    fn from(config: &CartConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            drawer_delay: config.drawer_delay,
            hydrate_attempts: config.hydrate_attempts,
            hydrate_backoff: config.hydrate_backoff,
        }
    }
}

/// Notifications for UI collaborators outside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
    /// A mutation was applied; carries the new item count for badges.
    Updated { item_count: u32 },
    /// The cart drawer should be shown.
    OpenDrawer,
}

/// Result of a mutation attempt. Errors never escape; they land in the store.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server snapshot was applied.
    Applied,
    /// The trigger already had a mutation in flight; nothing was sent.
    Dropped,
    /// Nothing to do (e.g., decrement at quantity 1); nothing was sent.
    Skipped,
    /// The mutation failed with this message, now also in the store.
    Failed(String),
}

impl MutationOutcome {
    /// Whether a snapshot was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Single entry point for cart mutations.
pub struct CartSynchronizer<G> {
    gateway: G,
    store: Arc<CartStore>,
    in_flight: Mutex<HashSet<TriggerId>>,
    events: broadcast::Sender<CartEvent>,
    options: SyncOptions,
}

impl<G: CartGateway> CartSynchronizer<G> {
    /// Create a synchronizer writing into `store`.
    #[must_use]
    pub fn new(gateway: G, store: Arc<CartStore>, options: SyncOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            gateway,
            store,
            in_flight: Mutex::new(HashSet::new()),
            events,
            options,
        }
    }

    /// The store this synchronizer writes into.
    #[must_use]
    pub const fn store(&self) -> &Arc<CartStore> {
        &self.store
    }

    /// The underlying gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Subscribe to drawer and update notifications.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<CartEvent> {
        self.events.subscribe()
    }

    /// Whether `trigger` has a mutation in flight.
    #[must_use]
    pub fn is_in_flight(&self, trigger: &TriggerId) -> bool {
        self.lock_in_flight().contains(trigger)
    }

    /// Fetch the cart once at startup.
    ///
    /// Not a mutation: loading and in-flight flags are untouched. Retries up
    /// to `hydrate_attempts` times; on final failure the store keeps its
    /// empty default.
    ///
    /// # Errors
    ///
    /// Returns the last gateway error if every attempt failed.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<(), GatewayError> {
        let attempts = self.options.hydrate_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.timed(self.gateway.get_snapshot()).await {
                Ok(snapshot) => {
                    info!(item_count = snapshot.item_count, "Cart hydrated");
                    self.store.apply(snapshot);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "Cart hydration failed, retrying");
                    tokio::time::sleep(self.options.hydrate_backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Cart hydration failed, showing empty cart");
                    return Err(e);
                }
            }
        }
    }

    /// Run one mutation for `trigger`.
    ///
    /// With `open_drawer`, a successful mutation also emits
    /// [`CartEvent::OpenDrawer`] after the drawer delay, without blocking.
    #[instrument(skip(self, request), fields(trigger = %trigger, kind = request.kind()))]
    pub async fn mutate(
        &self,
        trigger: &TriggerId,
        request: MutationRequest,
        open_drawer: bool,
    ) -> MutationOutcome {
        let Some(_guard) = self.begin(trigger) else {
            debug!("Mutation already in flight for trigger, dropping");
            return MutationOutcome::Dropped;
        };

        self.store.set_error(None);
        self.store.set_loading(true);

        match self.dispatch(&request).await {
            Ok(snapshot) => {
                let item_count = snapshot.item_count;
                self.store.apply(snapshot);
                // No receivers just means no UI is listening
                let _ = self.events.send(CartEvent::Updated { item_count });
                if open_drawer {
                    self.signal_drawer();
                }
                MutationOutcome::Applied
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Cart mutation failed");
                self.store.set_error(Some(message.clone()));
                MutationOutcome::Failed(message)
            }
        }
    }

    /// Raise a line's quantity by one.
    pub async fn increment_quantity(&self, trigger: &TriggerId, key: &LineKey) -> MutationOutcome {
        let Some(line) = self.store.lookup(key) else {
            debug!(key = %key, "Increment for unknown line");
            return MutationOutcome::Skipped;
        };

        let request = MutationRequest::UpdateQuantity {
            key: key.clone(),
            quantity: line.quantity.saturating_add(1),
        };
        self.mutate(trigger, request, false).await
    }

    /// Lower a line's quantity by one. Never goes below 1; removal is explicit.
    pub async fn decrement_quantity(&self, trigger: &TriggerId, key: &LineKey) -> MutationOutcome {
        let Some(line) = self.store.lookup(key) else {
            debug!(key = %key, "Decrement for unknown line");
            return MutationOutcome::Skipped;
        };
        if line.quantity <= 1 {
            return MutationOutcome::Skipped;
        }

        let request = MutationRequest::UpdateQuantity {
            key: key.clone(),
            quantity: line.quantity - 1,
        };
        self.mutate(trigger, request, false).await
    }

    /// Remove a line.
    pub async fn remove(&self, trigger: &TriggerId, key: &LineKey) -> MutationOutcome {
        self.mutate(trigger, MutationRequest::Remove { key: key.clone() }, false)
            .await
    }

    async fn dispatch(&self, request: &MutationRequest) -> Result<CartSnapshot, SyncError> {
        request.validate()?;

        let call = async {
            match request {
                MutationRequest::AddOne(line) => self.gateway.add_one(line).await,
                MutationRequest::AddMany(lines) => self.gateway.add_many(lines).await,
                MutationRequest::UpdateQuantity { key, quantity } => {
                    self.gateway.update_quantity(key, *quantity).await
                }
                MutationRequest::Remove { key } => self.gateway.remove(key).await,
            }
        };

        Ok(self.timed(call).await?)
    }

    async fn timed<F>(&self, call: F) -> Result<CartSnapshot, GatewayError>
    where
        F: Future<Output = Result<CartSnapshot, GatewayError>>,
    {
        let limit = self.options.request_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| GatewayError::Timeout(limit))?
    }

    fn signal_drawer(&self) {
        let delay = self.options.drawer_delay;
        if delay.is_zero() {
            let _ = self.events.send(CartEvent::OpenDrawer);
            return;
        }

        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(CartEvent::OpenDrawer);
        });
    }

    /// Mark `trigger` in flight, or `None` if it already is.
    fn begin(&self, trigger: &TriggerId) -> Option<InFlightGuard<'_>> {
        if !self.lock_in_flight().insert(trigger.clone()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            store: &self.store,
            trigger: trigger.clone(),
        })
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<TriggerId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight mark and the loading flag when the attempt ends,
/// including when the mutation future is dropped mid-call.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<TriggerId>>,
    store: &'a CartStore,
    trigger: TriggerId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.store.set_loading(false);
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.trigger);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use theme_cart_core::{Money, VariantId};
    use tokio::sync::Notify;

    use super::*;
    use crate::cart::types::{LineInput, LineItem};

    /// Gateway that records calls and answers from a canned snapshot.
    #[derive(Default)]
    struct FakeGateway {
        calls: Mutex<Vec<String>>,
        snapshot: Mutex<CartSnapshot>,
        fail_with: Mutex<Option<(u16, String)>>,
        gate: Option<Arc<Notify>>,
        hang: bool,
        snapshot_failures: AtomicUsize,
    }

    impl FakeGateway {
        fn returning(snapshot: CartSnapshot) -> Self {
            Self {
                snapshot: Mutex::new(snapshot),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn answer(&self, call: String) -> Result<CartSnapshot, GatewayError> {
            self.calls.lock().unwrap().push(call);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            if let Some((status, message)) = self.fail_with.lock().unwrap().clone() {
                return Err(GatewayError::Status { status, message });
            }
            Ok(self.snapshot.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl CartGateway for FakeGateway {
        async fn add_one(&self, line: &LineInput) -> Result<CartSnapshot, GatewayError> {
            self.answer(format!("add_one:{}x{}", line.id, line.quantity))
                .await
        }

        async fn add_many(&self, lines: &[LineInput]) -> Result<CartSnapshot, GatewayError> {
            self.answer(format!("add_many:{}", lines.len())).await
        }

        async fn update_quantity(
            &self,
            key: &LineKey,
            quantity: u32,
        ) -> Result<CartSnapshot, GatewayError> {
            self.answer(format!("update:{key}={quantity}")).await
        }

        async fn get_snapshot(&self) -> Result<CartSnapshot, GatewayError> {
            if self
                .snapshot_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                self.calls.lock().unwrap().push("get_snapshot".to_string());
                return Err(GatewayError::from_response(503, ""));
            }
            self.answer("get_snapshot".to_string()).await
        }
    }

    fn line(key: &str, quantity: u32, price: i64) -> LineItem {
        LineItem {
            key: LineKey::from(key),
            id: VariantId::new(100),
            quantity,
            price: Money::from_minor(price),
            line_price: None,
            title: None,
            properties: BTreeMap::new(),
            available: true,
        }
    }

    fn cart(lines: Vec<LineItem>) -> CartSnapshot {
        let item_count = lines.iter().map(|l| l.quantity).sum();
        let total = lines
            .iter()
            .map(|l| l.price.minor_units() * i64::from(l.quantity))
            .sum();
        CartSnapshot {
            token: None,
            items: lines,
            item_count,
            total_price: Money::from_minor(total),
        }
    }

    fn options() -> SyncOptions {
        SyncOptions {
            request_timeout: Duration::from_secs(5),
            drawer_delay: Duration::ZERO,
            hydrate_attempts: 3,
            hydrate_backoff: Duration::from_millis(10),
        }
    }

    fn synchronizer(gateway: FakeGateway) -> CartSynchronizer<FakeGateway> {
        CartSynchronizer::new(gateway, Arc::new(CartStore::default()), options())
    }

    #[tokio::test]
    async fn test_update_applies_server_snapshot() {
        let sync = synchronizer(FakeGateway::returning(cart(vec![line("abc", 3, 999)])));

        let outcome = sync
            .mutate(
                &TriggerId::from("qty"),
                MutationRequest::UpdateQuantity {
                    key: LineKey::from("abc"),
                    quantity: 3,
                },
                false,
            )
            .await;

        assert_eq!(outcome, MutationOutcome::Applied);
        let state = sync.store().current();
        assert_eq!(state.snapshot.item_count, 3);
        assert_eq!(state.snapshot.total_price, Money::from_minor(2997));
        assert_eq!(state.formatted_total, "$29.97");
        assert_eq!(state.ui.error, None);
        assert!(!state.ui.loading);
        assert_eq!(sync.gateway().calls(), vec!["update:abc=3"]);
    }

    #[tokio::test]
    async fn test_duplicate_submit_is_dropped() {
        let gate = Arc::new(Notify::new());
        let sync = synchronizer(FakeGateway {
            gate: Some(Arc::clone(&gate)),
            ..FakeGateway::returning(cart(vec![line("a", 1, 100)]))
        });
        let trigger = TriggerId::from("product-form");
        let request = MutationRequest::AddOne(LineInput::new(VariantId::new(100), 1));

        let first = sync.mutate(&trigger, request.clone(), false);
        let second = async {
            // Let the first submit reach the gateway before submitting again
            tokio::task::yield_now().await;
            assert!(sync.is_in_flight(&trigger));
            assert!(sync.store().ui().loading);
            let outcome = sync.mutate(&trigger, request.clone(), false).await;
            gate.notify_one();
            outcome
        };

        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, MutationOutcome::Applied);
        assert_eq!(second, MutationOutcome::Dropped);
        assert_eq!(sync.gateway().calls().len(), 1);
        assert!(!sync.is_in_flight(&trigger));
    }

    #[tokio::test]
    async fn test_different_triggers_are_independent() {
        let gate = Arc::new(Notify::new());
        let sync = synchronizer(FakeGateway {
            gate: Some(Arc::clone(&gate)),
            ..FakeGateway::returning(cart(vec![line("a", 2, 100)]))
        });

        let (plus_a, plus_b) = (TriggerId::from("plus-a"), TriggerId::from("plus-b"));
        let a = sync.mutate(
            &plus_a,
            MutationRequest::UpdateQuantity {
                key: LineKey::from("a"),
                quantity: 2,
            },
            false,
        );
        let b = sync.mutate(
            &plus_b,
            MutationRequest::UpdateQuantity {
                key: LineKey::from("b"),
                quantity: 1,
            },
            false,
        );
        let release = async {
            tokio::task::yield_now().await;
            gate.notify_waiters();
        };

        let (a, b, ()) = tokio::join!(a, b, release);

        assert!(a.is_applied());
        assert!(b.is_applied());
        assert_eq!(sync.gateway().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_snapshot() {
        let gateway = FakeGateway::returning(cart(vec![line("a", 2, 500)]));
        let sync = synchronizer(gateway);
        sync.hydrate().await.unwrap();
        let before = sync.store().snapshot();

        *sync.gateway().fail_with.lock().unwrap() =
            Some((422, "All 2 Tee are in your cart.".to_string()));

        let outcome = sync
            .mutate(
                &TriggerId::from("plus"),
                MutationRequest::UpdateQuantity {
                    key: LineKey::from("a"),
                    quantity: 3,
                },
                false,
            )
            .await;

        assert_eq!(
            outcome,
            MutationOutcome::Failed("All 2 Tee are in your cart.".to_string())
        );
        let state = sync.store().current();
        assert_eq!(state.snapshot, before);
        assert_eq!(state.formatted_total, "$10.00");
        assert_eq!(state.ui.error.as_deref(), Some("All 2 Tee are in your cart."));
        assert!(!state.ui.loading);
    }

    #[tokio::test]
    async fn test_next_mutation_clears_error() {
        let sync = synchronizer(FakeGateway::returning(cart(vec![line("a", 1, 100)])));
        sync.store().set_error(Some("old".to_string()));

        let _ = sync
            .mutate(
                &TriggerId::from("t"),
                MutationRequest::Remove {
                    key: LineKey::from("a"),
                },
                false,
            )
            .await;

        assert_eq!(sync.store().ui().error, None);
        assert_eq!(sync.gateway().calls(), vec!["update:a=0"]);
    }

    #[tokio::test]
    async fn test_validation_error_skips_gateway() {
        let sync = synchronizer(FakeGateway::default());

        let outcome = sync
            .mutate(&TriggerId::from("bundle"), MutationRequest::AddMany(vec![]), true)
            .await;

        assert_eq!(outcome, MutationOutcome::Failed("No items to add".to_string()));
        assert!(sync.gateway().calls().is_empty());
        assert!(!sync.is_in_flight(&TriggerId::from("bundle")));
    }

    #[tokio::test]
    async fn test_decrement_floor() {
        let sync = synchronizer(FakeGateway::returning(cart(vec![line("a", 1, 100)])));
        sync.hydrate().await.unwrap();
        let calls_after_hydrate = sync.gateway().calls().len();
        let before = sync.store().current();

        let outcome = sync
            .decrement_quantity(&TriggerId::from("minus"), &LineKey::from("a"))
            .await;

        assert_eq!(outcome, MutationOutcome::Skipped);
        assert_eq!(sync.gateway().calls().len(), calls_after_hydrate);
        assert_eq!(sync.store().current(), before);
    }

    #[tokio::test]
    async fn test_increment_and_decrement_use_store_quantity() {
        let sync = synchronizer(FakeGateway::returning(cart(vec![line("a", 2, 100)])));
        sync.hydrate().await.unwrap();

        let _ = sync
            .increment_quantity(&TriggerId::from("plus"), &LineKey::from("a"))
            .await;
        let _ = sync
            .decrement_quantity(&TriggerId::from("minus"), &LineKey::from("a"))
            .await;

        assert_eq!(
            sync.gateway().calls(),
            vec!["get_snapshot", "update:a=3", "update:a=1"]
        );
    }

    #[tokio::test]
    async fn test_unknown_line_is_skipped() {
        let sync = synchronizer(FakeGateway::default());
        let outcome = sync
            .increment_quantity(&TriggerId::from("plus"), &LineKey::from("missing"))
            .await;
        assert_eq!(outcome, MutationOutcome::Skipped);
        assert!(sync.gateway().calls().is_empty());
    }

    #[tokio::test]
    async fn test_drawer_opens_after_add() {
        let sync = synchronizer(FakeGateway::returning(cart(vec![line("a", 1, 100)])));
        let mut events = sync.events();

        let _ = sync
            .mutate(
                &TriggerId::from("form"),
                MutationRequest::AddOne(LineInput::new(VariantId::new(100), 1)),
                true,
            )
            .await;

        assert_eq!(
            events.recv().await.unwrap(),
            CartEvent::Updated { item_count: 1 }
        );
        assert_eq!(events.recv().await.unwrap(), CartEvent::OpenDrawer);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drawer_signal_is_delayed() {
        let sync = CartSynchronizer::new(
            FakeGateway::returning(cart(vec![line("a", 1, 100)])),
            Arc::new(CartStore::default()),
            SyncOptions {
                drawer_delay: Duration::from_millis(50),
                ..options()
            },
        );
        let mut events = sync.events();

        let outcome = sync
            .mutate(
                &TriggerId::from("form"),
                MutationRequest::AddOne(LineInput::new(VariantId::new(100), 1)),
                true,
            )
            .await;
        assert!(outcome.is_applied());

        // The store already holds the new snapshot when the drawer opens
        assert_eq!(
            events.recv().await.unwrap(),
            CartEvent::Updated { item_count: 1 }
        );
        assert_eq!(events.recv().await.unwrap(), CartEvent::OpenDrawer);
        assert_eq!(sync.store().item_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_request_times_out_and_frees_trigger() {
        let sync = synchronizer(FakeGateway {
            hang: true,
            ..FakeGateway::default()
        });
        let trigger = TriggerId::from("form");

        let outcome = sync
            .mutate(
                &trigger,
                MutationRequest::AddOne(LineInput::new(VariantId::new(1), 1)),
                false,
            )
            .await;

        assert_eq!(
            outcome,
            MutationOutcome::Failed("Cart request timed out after 5000ms".to_string())
        );
        assert!(!sync.is_in_flight(&trigger));
        assert!(!sync.store().ui().loading);
    }

    #[tokio::test]
    async fn test_cancelled_mutation_releases_trigger() {
        let gate = Arc::new(Notify::new());
        let sync = synchronizer(FakeGateway {
            gate: Some(gate),
            ..FakeGateway::default()
        });
        let trigger = TriggerId::from("form");

        {
            let pending = sync.mutate(
                &trigger,
                MutationRequest::AddOne(LineInput::new(VariantId::new(1), 1)),
                false,
            );
            tokio::pin!(pending);
            let polled = futures_poll_once(pending.as_mut()).await;
            assert!(polled.is_none());
            assert!(sync.is_in_flight(&trigger));
        }

        assert!(!sync.is_in_flight(&trigger));
        assert!(!sync.store().ui().loading);
    }

    async fn futures_poll_once<F: Future + Unpin>(fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = fut => Some(out),
            () = std::future::ready(()) => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydrate_retries_then_succeeds() {
        let sync = synchronizer(FakeGateway {
            snapshot_failures: AtomicUsize::new(2),
            ..FakeGateway::returning(cart(vec![line("a", 1, 100)]))
        });

        sync.hydrate().await.unwrap();

        assert_eq!(sync.gateway().calls().len(), 3);
        assert_eq!(sync.store().item_count(), 1);
        assert!(!sync.store().ui().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hydrate_gives_up_and_leaves_empty_cart() {
        let sync = synchronizer(FakeGateway {
            snapshot_failures: AtomicUsize::new(10),
            ..FakeGateway::default()
        });

        let err = sync.hydrate().await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(sync.gateway().calls().len(), 3);
        assert_eq!(sync.store().snapshot(), CartSnapshot::default());
        assert_eq!(sync.store().ui().error, None);
    }
}
