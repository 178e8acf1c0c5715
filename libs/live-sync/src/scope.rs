//! Ownership-scoped views over a shared post list.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::binding::{LiveBinding, LiveQueryHub};
use crate::model::{Identity, Post};
use crate::query::{QueryKey, QueryResult};
use crate::session::{SessionCache, SessionWatch};

/// Posts in `list` authored by `identity`; nothing without an identity.
pub fn scope(list: &[Post], identity: Option<&Identity>) -> Vec<Post> {
    match identity {
        Some(identity) => list
            .iter()
            .filter(|p| p.is_owned_by(identity))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

type RenderFn = Arc<dyn Fn(&[Post]) + Send + Sync>;

struct ViewState {
    list: QueryResult<Vec<Post>>,
    identity: Option<Arc<Identity>>,
    scoped: Vec<Post>,
}

impl ViewState {
    fn rescope(&mut self) -> Vec<Post> {
        self.scoped = match &self.list {
            QueryResult::Value(list) => scope(list, self.identity.as_deref()),
            _ => Vec::new(),
        };
        self.scoped.clone()
    }
}

/// The signed-in user's posts, re-derived whenever the bound list or the
/// session changes. Logout empties it before `SessionCache::logout` returns.
pub struct OwnedPostsView {
    state: Arc<Mutex<ViewState>>,
    // Field order matters: stop watching before unbinding.
    _watch: SessionWatch,
    binding: LiveBinding<Vec<Post>>,
}

impl OwnedPostsView {
    pub fn mount(hub: &LiveQueryHub<Vec<Post>>, key: QueryKey, session: &Arc<SessionCache>) -> Self {
        Self::mount_with(hub, key, session, |_| {})
    }

    pub fn mount_with<F>(
        hub: &LiveQueryHub<Vec<Post>>,
        key: QueryKey,
        session: &Arc<SessionCache>,
        on_render: F,
    ) -> Self
    where
        F: Fn(&[Post]) + Send + Sync + 'static,
    {
        let on_render: RenderFn = Arc::new(on_render);
        let state = Arc::new(Mutex::new(ViewState {
            list: QueryResult::Loading,
            identity: session.identity(),
            scoped: Vec::new(),
        }));

        let watch = {
            let state = state.clone();
            let on_render = on_render.clone();
            session.watch(move |event| {
                let scoped = {
                    let mut state = state.lock();
                    state.identity = event.identity.clone();
                    state.rescope()
                };
                on_render(&scoped);
            })
        };

        let binding = {
            let state = state.clone();
            let session = Arc::downgrade(session);
            hub.bind(key, move |live| {
                let scoped = {
                    let mut state = state.lock();
                    state.list = live.clone();
                    // Identity is read fresh rather than trusted from the last event.
                    if let Some(session) = session.upgrade() {
                        state.identity = session.identity();
                    }
                    state.rescope()
                };
                on_render(&scoped);
            })
        };

        Self {
            state,
            _watch: watch,
            binding,
        }
    }

    pub fn posts(&self) -> Vec<Post> {
        self.state.lock().scoped.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().scoped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().list.is_loading()
    }

    pub fn identity(&self) -> Option<Arc<Identity>> {
        self.state.lock().identity.clone()
    }

    pub fn binding(&self) -> &LiveBinding<Vec<Post>> {
        &self.binding
    }
}
