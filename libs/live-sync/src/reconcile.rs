//! Placeholder/live list reconciliation.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::binding::{LiveBinding, LiveQueryHub};
use crate::model::{Post, PostId};
use crate::query::{QueryKey, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrigin {
    Placeholder,
    Live,
}

/// What a list view should render.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub items: Vec<T>,
    pub origin: ListOrigin,
    /// Set when the live query has failed and the items are not current.
    pub degraded: bool,
}

impl<T> Reconciled<T> {
    /// A confirmed empty live result, shown as an explicit empty state.
    pub fn is_empty_state(&self) -> bool {
        self.origin == ListOrigin::Live && self.items.is_empty()
    }
}

/// Stateful reconciler for one binding.
///
/// Until a non-empty live value has been seen, loading and empty results
/// show the placeholder. After that the placeholder never comes back: an
/// empty live value is an explicit empty state, and loading or a failure
/// keeps the last live list (flagged degraded on failure).
#[derive(Debug, Clone)]
pub struct PlaceholderReconciler<T> {
    placeholder: Vec<T>,
    last_live: Option<Vec<T>>,
}

impl<T: Clone> PlaceholderReconciler<T> {
    pub fn new(placeholder: Vec<T>) -> Self {
        Self {
            placeholder,
            last_live: None,
        }
    }

    /// Whether live data has ever replaced the placeholder.
    pub fn has_seen_live(&self) -> bool {
        self.last_live.is_some()
    }

    pub fn reconcile(&mut self, live: &QueryResult<Vec<T>>) -> Reconciled<T> {
        let degraded = match live {
            QueryResult::Value(items) if !items.is_empty() || self.has_seen_live() => {
                self.last_live = Some(items.clone());
                return self.live(items.clone(), false);
            }
            QueryResult::Value(_) | QueryResult::Loading => false,
            QueryResult::Error(_) => true,
        };
        match &self.last_live {
            Some(last) => self.live(last.clone(), degraded),
            None => self.placeholder(degraded),
        }
    }

    fn live(&self, items: Vec<T>, degraded: bool) -> Reconciled<T> {
        Reconciled {
            items,
            origin: ListOrigin::Live,
            degraded,
        }
    }

    fn placeholder(&self, degraded: bool) -> Reconciled<T> {
        Reconciled {
            items: self.placeholder.clone(),
            origin: ListOrigin::Placeholder,
            degraded,
        }
    }
}

/// Look a post up in the live list first, then among the placeholders.
pub fn find_post<'a>(live: Option<&'a [Post]>, placeholder: &'a [Post], id: &PostId) -> Option<&'a Post> {
    live.and_then(|posts| posts.iter().find(|p| &p.id == id))
        .or_else(|| placeholder.iter().find(|p| &p.id == id))
}

/// A bound list query run through a [`PlaceholderReconciler`].
///
/// Keeps the latest reconciled view and optionally forwards every re-render.
/// Unbinds when dropped.
pub struct ReconciledFeed<T> {
    binding: LiveBinding<Vec<T>>,
    view: Arc<Mutex<Reconciled<T>>>,
}

impl<T: Clone + Send + Sync + 'static> ReconciledFeed<T> {
    pub fn mount(hub: &LiveQueryHub<Vec<T>>, key: QueryKey, placeholder: Vec<T>) -> Self {
        Self::mount_with(hub, key, placeholder, |_| {})
    }

    pub fn mount_with<F>(
        hub: &LiveQueryHub<Vec<T>>,
        key: QueryKey,
        placeholder: Vec<T>,
        on_render: F,
    ) -> Self
    where
        F: Fn(&Reconciled<T>) + Send + Sync + 'static,
    {
        let mut reconciler = PlaceholderReconciler::new(placeholder);
        let view = Arc::new(Mutex::new(reconciler.reconcile(&QueryResult::Loading)));
        let reconciler = Mutex::new(reconciler);

        let slot = view.clone();
        let binding = hub.bind(key, move |live| {
            let rendered = reconciler.lock().reconcile(live);
            *slot.lock() = rendered.clone();
            on_render(&rendered);
        });

        Self { binding, view }
    }

    pub fn current(&self) -> Reconciled<T> {
        self.view.lock().clone()
    }

    pub fn binding(&self) -> &LiveBinding<Vec<T>> {
        &self.binding
    }
}
