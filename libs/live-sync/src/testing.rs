//! Scripted data-service doubles for tests.
//!
//! Compiled for this crate's own tests and, through the `test-support`
//! feature, for dependent crates' tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::{oneshot, Notify};

use crate::error::ServiceError;
use crate::model::Identity;
use crate::ports::{MutationGateway, PushSink, QuerySource, SourceId, UserRegistry};
use crate::query::{MutationCall, QueryKey};

/// A query source whose pushes are driven by the test.
pub struct ScriptedSource<T> {
    open: Mutex<HashMap<SourceId, (QueryKey, PushSink<T>)>>,
    history: Mutex<Vec<QueryKey>>,
    fail_next_open: Mutex<Option<ServiceError>>,
    next_id: AtomicU64,
    closed: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> ScriptedSource<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            open: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            fail_next_open: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicUsize::new(0),
        })
    }

    /// Total number of successful `open` calls.
    pub fn opened(&self) -> usize {
        self.history.lock().len()
    }

    pub fn open_count(&self, key: &QueryKey) -> usize {
        self.history.lock().iter().filter(|k| *k == key).count()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_open(&self, key: &QueryKey) -> bool {
        self.open.lock().values().any(|(k, _)| k == key)
    }

    pub fn fail_next_open(&self, err: ServiceError) {
        *self.fail_next_open.lock() = Some(err);
    }

    /// Push `value` to every open subscription for `key`.
    pub fn push(&self, key: &QueryKey, value: T) {
        for sink in self.sinks(key) {
            sink(Ok(value.clone()));
        }
    }

    pub fn fail(&self, key: &QueryKey, err: ServiceError) {
        for sink in self.sinks(key) {
            sink(Err(err.clone()));
        }
    }

    fn sinks(&self, key: &QueryKey) -> Vec<PushSink<T>> {
        self.open
            .lock()
            .values()
            .filter(|(k, _)| k == key)
            .map(|(_, sink)| sink.clone())
            .collect()
    }
}

impl<T: Clone + Send + Sync + 'static> QuerySource<T> for ScriptedSource<T> {
    fn open(&self, key: &QueryKey, sink: PushSink<T>) -> Result<SourceId, ServiceError> {
        if let Some(err) = self.fail_next_open.lock().take() {
            return Err(err);
        }
        let id = SourceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.open.lock().insert(id, (key.clone(), sink));
        self.history.lock().push(key.clone());
        Ok(id)
    }

    fn close(&self, id: SourceId) {
        if self.open.lock().remove(&id).is_some() {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

type Parked = (MutationCall, oneshot::Sender<Result<Value, ServiceError>>);

/// A mutation gateway whose calls stay pending until the test resolves them.
pub struct ManualGateway {
    parked: Mutex<VecDeque<Parked>>,
    arrived: Notify,
    calls: Mutex<Vec<MutationCall>>,
}

impl ManualGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            parked: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<MutationCall> {
        self.calls.lock().clone()
    }

    /// Wait for the oldest pending call and resolve it.
    pub async fn resolve_next(&self, result: Result<Value, ServiceError>) -> MutationCall {
        self.resolve_where(|_| true, result).await
    }

    /// Wait for a pending call with this name and arguments and resolve it.
    pub async fn resolve_call(
        &self,
        name: &str,
        args: Value,
        result: Result<Value, ServiceError>,
    ) -> MutationCall {
        self.resolve_where(|c| c.name == name && c.args == args, result)
            .await
    }

    async fn resolve_where<F>(&self, pred: F, result: Result<Value, ServiceError>) -> MutationCall
    where
        F: Fn(&MutationCall) -> bool,
    {
        loop {
            let arrived = self.arrived.notified();
            let found = {
                let mut parked = self.parked.lock();
                parked
                    .iter()
                    .position(|(call, _)| pred(call))
                    .and_then(|pos| parked.remove(pos))
            };
            if let Some((call, reply)) = found {
                let _ = reply.send(result);
                return call;
            }
            arrived.await;
        }
    }
}

#[async_trait]
impl MutationGateway for ManualGateway {
    async fn mutate(&self, call: MutationCall) -> Result<Value, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.calls.lock().push(call.clone());
        self.parked.lock().push_back((call, tx));
        self.arrived.notify_one();
        rx.await
            .unwrap_or_else(|_| Err(ServiceError::unavailable("gateway dropped")))
    }
}

/// Records `store_user` calls; optionally fails them.
#[derive(Default)]
pub struct RecordingRegistry {
    stored: Mutex<Vec<Identity>>,
    fail_with: Mutex<Option<ServiceError>>,
    stored_signal: Notify,
}

impl RecordingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(err: ServiceError) -> Arc<Self> {
        let registry = Self::default();
        *registry.fail_with.lock() = Some(err);
        Arc::new(registry)
    }

    pub fn stored(&self) -> Vec<Identity> {
        self.stored.lock().clone()
    }

    /// Wait until at least `n` users have been stored (or attempted).
    pub async fn wait_for(&self, n: usize) {
        loop {
            let signal = self.stored_signal.notified();
            if self.stored.lock().len() >= n {
                return;
            }
            signal.await;
        }
    }
}

#[async_trait]
impl UserRegistry for RecordingRegistry {
    async fn store_user(&self, identity: &Identity) -> Result<(), ServiceError> {
        self.stored.lock().push(identity.clone());
        self.stored_signal.notify_one();
        match self.fail_with.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
