//! Optimistic mutation dispatch.
//!
//! `submit` layers the optimistic patch over the affected bindings before it
//! returns, then hands back a future for the network round trip. Success only
//! marks the patch confirmed: the next authoritative push replaces it. Failure
//! (or dropping the future before it resolves) removes the patch again.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

use crate::binding::{LiveQueryHub, MutationId, OptimisticPatch};
use crate::error::LiveSyncError;
use crate::ports::MutationGateway;
use crate::query::{MutationCall, QueryKey};

/// A mutation plus the bound queries its optimistic patch applies to.
pub struct MutationSpec<T> {
    pub call: MutationCall,
    pub affects: Vec<QueryKey>,
    pub patch: Option<OptimisticPatch<T>>,
}

impl<T> MutationSpec<T> {
    pub fn new(call: MutationCall) -> Self {
        Self {
            call,
            affects: Vec::new(),
            patch: None,
        }
    }

    pub fn affecting(mut self, key: QueryKey) -> Self {
        if !self.affects.contains(&key) {
            self.affects.push(key);
        }
        self
    }

    pub fn with_patch<F>(mut self, patch: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        self.patch = Some(Arc::new(patch));
        self
    }
}

pub struct MutationDispatcher<T> {
    hub: LiveQueryHub<T>,
    gateway: Arc<dyn MutationGateway>,
}

impl<T> Clone for MutationDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> MutationDispatcher<T> {
    pub fn new(hub: LiveQueryHub<T>, gateway: Arc<dyn MutationGateway>) -> Self {
        Self { hub, gateway }
    }

    pub fn hub(&self) -> &LiveQueryHub<T> {
        &self.hub
    }

    /// Apply the optimistic patch (if any) right away and return the pending
    /// network call. Errors from the data service are mapped into the
    /// core taxonomy; nothing is retried.
    pub fn submit(
        &self,
        spec: MutationSpec<T>,
    ) -> impl Future<Output = Result<Value, LiveSyncError>> + Send + 'static {
        let mutation_id = self.hub.next_mutation_id();
        let MutationSpec {
            call,
            affects,
            patch,
        } = spec;

        let patched = match patch {
            Some(patch) => self.hub.apply_patch(mutation_id, &affects, patch),
            None => 0,
        };
        debug!(mutation = %call.name, %mutation_id, patched, "mutation submitted");

        let span = tracing::debug_span!(
            "live_sync.dispatcher.submit",
            mutation = %call.name,
            %mutation_id
        );
        let mut guard = RollbackGuard {
            hub: self.hub.clone(),
            mutation_id,
            armed: patched > 0,
        };
        let gateway = self.gateway.clone();

        async move {
            let name = call.name.clone();
            match gateway.mutate(call).await {
                Ok(value) => {
                    guard.hub.confirm(mutation_id);
                    guard.armed = false;
                    debug!("mutation confirmed");
                    Ok(value)
                }
                Err(err) => {
                    // Guard drop re-derives the affected lists without the patch.
                    drop(guard);
                    warn!(mutation = %name, error = %err, "mutation failed");
                    Err(LiveSyncError::from(err))
                }
            }
        }
        .instrument(span)
    }

    /// `submit` followed by decoding the mutation's return value.
    pub fn submit_as<R>(
        &self,
        spec: MutationSpec<T>,
    ) -> impl Future<Output = Result<R, LiveSyncError>> + Send + 'static
    where
        R: DeserializeOwned,
    {
        let pending = self.submit(spec);
        async move { decode_result(pending.await?) }
    }
}

pub fn decode_result<R: DeserializeOwned>(value: Value) -> Result<R, LiveSyncError> {
    serde_json::from_value(value).map_err(|e| LiveSyncError::decode(e.to_string()))
}

/// Rolls back an applied patch unless the mutation was confirmed.
struct RollbackGuard<T: Clone + Send + Sync + 'static> {
    hub: LiveQueryHub<T>,
    mutation_id: MutationId,
    armed: bool,
}

impl<T: Clone + Send + Sync + 'static> Drop for RollbackGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            let reverted = self.hub.rollback(self.mutation_id);
            debug!(mutation_id = %self.mutation_id, reverted, "optimistic patch removed");
        }
    }
}
