//! Reactive query bindings.
//!
//! A [`LiveQueryHub`] multiplexes any number of view bindings onto at most one
//! data-service subscription per [`QueryKey`]. Each entry keeps the last
//! server-confirmed value plus an ordered overlay of optimistic patches; what
//! listeners see is always the confirmed value with the overlay folded over it.
//!
//! Changes and their fan-out are serialized through one reentrant delivery
//! lock, while the state lock is released before any listener runs, so
//! listeners may bind, unbind or submit mutations from inside a callback.
//! Every change stamps its entry with a new version and a listener is never
//! handed a version older than one it already saw. All listeners of one key
//! therefore settle on the hub's current rendered value, in registration order.

use futures::Stream;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Weak,
};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::ServiceError;
use crate::ports::{PushSink, QuerySource, SourceId};
use crate::query::{QueryKey, QueryResult};

/// Callback invoked with the rendered state of a bound query.
pub type Listener<T> = Arc<dyn Fn(&QueryResult<T>) + Send + Sync>;

/// Provisional transformation of a confirmed value, e.g. prepending a post.
pub type OptimisticPatch<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

// ----- Pending mutations ------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed,
}

/// Bookkeeping for one optimistic patch layered over a query.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub mutation_id: MutationId,
    pub submitted_at: Instant,
    pub state: MutationState,
}

struct Overlay<T> {
    record: PendingMutation,
    patch: OptimisticPatch<T>,
    /// `Entry::pushes` when the patch was applied.
    pushes_at_apply: u64,
}

// ----- Entries ----------------------------------------------------------------

struct ListenerSlot<T> {
    id: u64,
    target: Target<T>,
}

/// What a fan-out needs to reach one listener.
struct Target<T> {
    active: Arc<AtomicBool>,
    /// Highest entry version this listener has been handed.
    seen: Arc<AtomicU64>,
    callback: Listener<T>,
}

impl<T> Clone for Target<T> {
    fn clone(&self) -> Self {
        Self {
            active: self.active.clone(),
            seen: self.seen.clone(),
            callback: self.callback.clone(),
        }
    }
}

struct Entry<T> {
    /// Bumped whenever the underlying subscription is (re)opened; pushes
    /// tagged with an older generation are stale.
    generation: u64,
    /// Bumped on every change to what listeners see.
    version: u64,
    /// Authoritative values received on the current subscription.
    pushes: u64,
    source_id: Option<SourceId>,
    confirmed: QueryResult<T>,
    overlays: Vec<Overlay<T>>,
    listeners: Vec<ListenerSlot<T>>,
}

impl<T> Entry<T> {
    fn loading(generation: u64) -> Self {
        Self {
            generation,
            version: 0,
            pushes: 0,
            source_id: None,
            confirmed: QueryResult::Loading,
            overlays: Vec::new(),
            listeners: Vec::new(),
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self.confirmed, QueryResult::Error(_))
    }

    fn bump(&mut self) {
        self.version += 1;
    }
}

impl<T: Clone> Entry<T> {
    fn rendered(&self) -> QueryResult<T> {
        match &self.confirmed {
            QueryResult::Value(v) => QueryResult::Value(
                self.overlays
                    .iter()
                    .fold(v.clone(), |acc, overlay| (overlay.patch)(acc)),
            ),
            other => other.clone(),
        }
    }

    fn fanout(&self) -> Fanout<T> {
        Fanout {
            value: self.rendered(),
            version: self.version,
            targets: self.listeners.iter().map(|l| l.target.clone()).collect(),
        }
    }
}

/// A rendered value and the listeners that must all observe it, collected
/// under the state lock and delivered after it is released.
struct Fanout<T> {
    value: QueryResult<T>,
    version: u64,
    targets: Vec<Target<T>>,
}

impl<T> Fanout<T> {
    /// Must run under the hub's delivery lock.
    fn deliver(self) {
        for target in &self.targets {
            // A listener unbound earlier in this same pass gets nothing.
            if !target.active.load(Ordering::Acquire) {
                continue;
            }
            // A nested change already handed this listener something newer.
            if target.seen.fetch_max(self.version, Ordering::AcqRel) >= self.version {
                continue;
            }
            (target.callback)(&self.value);
        }
    }
}

// ----- Hub --------------------------------------------------------------------

struct HubState<T> {
    entries: HashMap<QueryKey, Entry<T>>,
    next_generation: u64,
}

struct HubInner<T> {
    source: Arc<dyn QuerySource<T>>,
    /// Held from a change until its fan-out completes. Reentrant so that
    /// listeners can change the hub from inside a callback.
    delivery: ReentrantMutex<()>,
    state: Mutex<HubState<T>>,
    next_listener: AtomicU64,
    next_mutation: AtomicU64,
}

/// Shared registry of live query bindings over one data-service source.
pub struct LiveQueryHub<T> {
    inner: Arc<HubInner<T>>,
}

impl<T> Clone for LiveQueryHub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> LiveQueryHub<T> {
    pub fn new(source: Arc<dyn QuerySource<T>>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                source,
                delivery: ReentrantMutex::new(()),
                state: Mutex::new(HubState {
                    entries: HashMap::new(),
                    next_generation: 0,
                }),
                next_listener: AtomicU64::new(1),
                next_mutation: AtomicU64::new(1),
            }),
        }
    }

    /// Bind `listener` to `key`.
    ///
    /// The listener is called synchronously, before this returns, with the
    /// current state: `Loading` for a query that is not subscribed yet, the
    /// latest rendered value otherwise. A key whose previous subscription
    /// ended in an error is reopened, which is how callers retry.
    pub fn bind<F>(&self, key: QueryKey, listener: F) -> LiveBinding<T>
    where
        F: Fn(&QueryResult<T>) + Send + Sync + 'static,
    {
        let listener_id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let target = Target {
            active: active.clone(),
            seen: Arc::new(AtomicU64::new(0)),
            callback: Arc::new(listener),
        };

        let pass = self.inner.delivery.lock();
        let (fanout, open_generation) = {
            let mut state = self.inner.state.lock();
            let reopen = state.entries.get(&key).map_or(true, Entry::is_terminal);
            let open_generation = if reopen {
                state.next_generation += 1;
                Some(state.next_generation)
            } else {
                None
            };

            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| Entry::loading(0));
            if let Some(generation) = open_generation {
                entry.generation = generation;
                entry.confirmed = QueryResult::Loading;
                entry.source_id = None;
                entry.pushes = 0;
                entry.overlays.clear();
                entry.bump();
            }
            entry.listeners.push(ListenerSlot {
                id: listener_id,
                target: target.clone(),
            });

            let fanout = if open_generation.is_some() {
                // Everyone on a reopened key goes back to Loading together.
                entry.fanout()
            } else {
                Fanout {
                    value: entry.rendered(),
                    version: entry.version,
                    targets: vec![target],
                }
            };
            (fanout, open_generation)
        };

        trace!(query = %key, listener_id, "bound");
        fanout.deliver();
        drop(pass);

        if let Some(generation) = open_generation {
            self.inner.open_source(&key, generation);
        }

        LiveBinding {
            hub: Arc::downgrade(&self.inner),
            key,
            listener_id,
            active,
        }
    }

    /// Bind `key` and expose the rendered states as a stream.
    pub fn watch(&self, key: QueryKey) -> LiveStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let binding = self.bind(key, move |state| {
            let _ = tx.send(state.clone());
        });
        LiveStream { binding, rx }
    }

    /// Current rendered state of `key`, if anything is bound to it.
    pub fn state(&self, key: &QueryKey) -> Option<QueryResult<T>> {
        self.inner.state.lock().entries.get(key).map(Entry::rendered)
    }

    pub fn listener_count(&self, key: &QueryKey) -> usize {
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .map_or(0, |e| e.listeners.len())
    }

    /// Number of keys with at least one binding.
    pub fn bound_queries(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Optimistic patches currently layered over `key`, oldest first.
    pub fn pending_mutations(&self, key: &QueryKey) -> Vec<PendingMutation> {
        self.inner.state.lock().entries.get(key).map_or_else(Vec::new, |e| {
            e.overlays.iter().map(|o| o.record.clone()).collect()
        })
    }

    pub(crate) fn next_mutation_id(&self) -> MutationId {
        MutationId(self.inner.next_mutation.fetch_add(1, Ordering::Relaxed))
    }

    /// Layer `patch` over every bound key in `affects` that already holds a
    /// value. Returns how many queries were patched.
    pub(crate) fn apply_patch(
        &self,
        mutation_id: MutationId,
        affects: &[QueryKey],
        patch: OptimisticPatch<T>,
    ) -> usize {
        let _pass = self.inner.delivery.lock();
        let fanouts = {
            let mut state = self.inner.state.lock();
            let mut fanouts = Vec::new();
            for key in affects {
                let Some(entry) = state.entries.get_mut(key) else {
                    continue;
                };
                if entry.confirmed.value().is_none() {
                    trace!(query = %key, %mutation_id, "query has no value yet; patch skipped");
                    continue;
                }
                if entry
                    .overlays
                    .iter()
                    .any(|o| o.record.mutation_id == mutation_id)
                {
                    continue;
                }
                entry.overlays.push(Overlay {
                    record: PendingMutation {
                        mutation_id,
                        submitted_at: Instant::now(),
                        state: MutationState::Pending,
                    },
                    patch: patch.clone(),
                    pushes_at_apply: entry.pushes,
                });
                entry.bump();
                fanouts.push(entry.fanout());
            }
            fanouts
        };

        let applied = fanouts.len();
        for fanout in fanouts {
            fanout.deliver();
        }
        applied
    }

    /// Mark the patches of a successful mutation as confirmed.
    ///
    /// A patch stays visible until an authoritative value received after the
    /// confirmation replaces it. When a push already arrived while the
    /// mutation was in flight, that value is taken to include the write and
    /// the patch is dropped now.
    pub(crate) fn confirm(&self, mutation_id: MutationId) {
        let _pass = self.inner.delivery.lock();
        let fanouts = {
            let mut state = self.inner.state.lock();
            let mut fanouts = Vec::new();
            for (key, entry) in state.entries.iter_mut() {
                let before = entry.overlays.len();
                let pushes = entry.pushes;
                entry.overlays.retain(|o| {
                    o.record.mutation_id != mutation_id || o.pushes_at_apply == pushes
                });
                for overlay in entry
                    .overlays
                    .iter_mut()
                    .filter(|o| o.record.mutation_id == mutation_id)
                {
                    overlay.record.state = MutationState::Confirmed;
                }
                if entry.overlays.len() != before {
                    debug!(query = %key, %mutation_id, "confirmed patch superseded by server value");
                    entry.bump();
                    fanouts.push(entry.fanout());
                }
            }
            fanouts
        };

        for fanout in fanouts {
            fanout.deliver();
        }
    }

    /// Drop the patches of a failed mutation and re-render affected queries
    /// from their confirmed values.
    pub(crate) fn rollback(&self, mutation_id: MutationId) -> usize {
        let _pass = self.inner.delivery.lock();
        let fanouts = {
            let mut state = self.inner.state.lock();
            let mut fanouts = Vec::new();
            for (key, entry) in state.entries.iter_mut() {
                let before = entry.overlays.len();
                entry
                    .overlays
                    .retain(|o| o.record.mutation_id != mutation_id);
                if entry.overlays.len() != before {
                    debug!(query = %key, %mutation_id, "optimistic patch rolled back");
                    entry.bump();
                    fanouts.push(entry.fanout());
                }
            }
            fanouts
        };

        let reverted = fanouts.len();
        for fanout in fanouts {
            fanout.deliver();
        }
        reverted
    }
}

impl<T: Clone + Send + Sync + 'static> HubInner<T> {
    fn sink_for(self: &Arc<Self>, key: QueryKey, generation: u64) -> PushSink<T> {
        let hub = Arc::downgrade(self);
        Arc::new(move |push| {
            if let Some(hub) = hub.upgrade() {
                hub.on_push(&key, generation, push);
            }
        })
    }

    fn open_source(self: &Arc<Self>, key: &QueryKey, generation: u64) {
        let sink = self.sink_for(key.clone(), generation);
        match self.source.open(key, sink) {
            Ok(source_id) => {
                let stored = {
                    let mut state = self.state.lock();
                    match state.entries.get_mut(key) {
                        Some(entry) if entry.generation == generation && !entry.is_terminal() => {
                            entry.source_id = Some(source_id);
                            true
                        }
                        _ => false,
                    }
                };
                if stored {
                    debug!(query = %key, %source_id, "live query opened");
                } else {
                    // Unbound or failed while the service was opening it.
                    self.source.close(source_id);
                }
            }
            Err(err) => self.on_push(key, generation, Err(err)),
        }
    }

    fn on_push(&self, key: &QueryKey, generation: u64, push: Result<T, ServiceError>) {
        let _pass = self.delivery.lock();
        let (fanout, to_close) = {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(key) else {
                trace!(query = %key, "push for unbound query dropped");
                return;
            };
            if entry.generation != generation || entry.is_terminal() {
                trace!(query = %key, generation, "stale push dropped");
                return;
            }
            match push {
                Ok(value) => {
                    // Confirmed patches give way to the server value; patches
                    // still in flight fold over it until they resolve.
                    let before = entry.overlays.len();
                    entry
                        .overlays
                        .retain(|o| o.record.state == MutationState::Pending);
                    if entry.overlays.len() != before {
                        debug!(
                            query = %key,
                            superseded = before - entry.overlays.len(),
                            "server value replaces optimistic patches"
                        );
                    }
                    entry.pushes += 1;
                    entry.confirmed = QueryResult::Value(value);
                    entry.bump();
                    (entry.fanout(), None)
                }
                Err(err) => {
                    warn!(query = %key, error = %err, "live query failed; rebind to retry");
                    entry.overlays.clear();
                    entry.confirmed = QueryResult::Error(err);
                    entry.bump();
                    (entry.fanout(), entry.source_id.take())
                }
            }
        };

        if let Some(source_id) = to_close {
            self.source.close(source_id);
        }
        trace!(query = %key, listeners = fanout.targets.len(), "push delivered");
        fanout.deliver();
    }
}

impl<T> HubInner<T> {
    fn unbind(&self, key: &QueryKey, listener_id: u64) {
        let to_close = {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(key) else {
                return;
            };
            entry.listeners.retain(|l| l.id != listener_id);
            if entry.listeners.is_empty() {
                state.entries.remove(key).and_then(|e| e.source_id)
            } else {
                None
            }
        };

        trace!(query = %key, listener_id, "unbound");
        if let Some(source_id) = to_close {
            debug!(query = %key, %source_id, "last binding gone; live query closed");
            self.source.close(source_id);
        }
    }
}

// ----- Binding handles --------------------------------------------------------

/// A view's subscription to one query. Dropping it unbinds.
#[must_use = "dropping a LiveBinding unbinds it immediately"]
pub struct LiveBinding<T> {
    hub: Weak<HubInner<T>>,
    key: QueryKey,
    listener_id: u64,
    active: Arc<AtomicBool>,
}

impl<T> LiveBinding<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_bound(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop receiving callbacks. Idempotent; takes effect immediately, even
    /// for a fan-out already in progress.
    pub fn unbind(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            if let Some(hub) = self.hub.upgrade() {
                hub.unbind(&self.key, self.listener_id);
            }
        }
    }
}

impl<T: Clone> LiveBinding<T> {
    /// The rendered state this binding would currently be shown.
    pub fn current(&self) -> Option<QueryResult<T>> {
        if !self.is_bound() {
            return None;
        }
        let hub = self.hub.upgrade()?;
        let state = hub.state.lock();
        state.entries.get(&self.key).map(Entry::rendered)
    }
}

impl<T> Drop for LiveBinding<T> {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl<T> fmt::Debug for LiveBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveBinding")
            .field("key", &self.key)
            .field("listener_id", &self.listener_id)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Stream of rendered states for one binding; ends never, unbinds on drop.
pub struct LiveStream<T> {
    binding: LiveBinding<T>,
    rx: mpsc::UnboundedReceiver<QueryResult<T>>,
}

impl<T> LiveStream<T> {
    pub fn binding(&self) -> &LiveBinding<T> {
        &self.binding
    }
}

impl<T> Stream for LiveStream<T> {
    type Item = QueryResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
