//! Session identity cache.
//!
//! One injectable context object per session. Reads are synchronous and
//! lock-free; the rare views that must react to login/logout register a
//! watcher, which is notified synchronously on every transition.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tracing::{debug, info};

use crate::error::{LiveSyncError, SessionError};
use crate::model::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

/// Snapshot delivered to watchers after a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub phase: SessionPhase,
    pub identity: Option<Arc<Identity>>,
}

type Watcher = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

pub struct SessionCache {
    identity: ArcSwapOption<Identity>,
    phase: Mutex<SessionPhase>,
    watchers: Mutex<Vec<(u64, Watcher)>>,
    next_watcher: AtomicU64,
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            identity: ArcSwapOption::empty(),
            phase: Mutex::new(SessionPhase::LoggedOut),
            watchers: Mutex::new(Vec::new()),
            next_watcher: AtomicU64::new(1),
        }
    }

    /// A fresh logged-out session, ready to be shared between components.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ----- Reads -------------------------------------------------------------

    #[inline]
    pub fn identity(&self) -> Option<Arc<Identity>> {
        self.identity.load_full()
    }

    #[inline]
    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    #[inline]
    pub fn is_logged_in(&self) -> bool {
        self.identity.load().is_some()
    }

    /// The cached identity, or `IdentityMissing` for protected operations.
    pub fn require_identity(&self) -> Result<Arc<Identity>, LiveSyncError> {
        self.identity().ok_or(LiveSyncError::IdentityMissing)
    }

    // ----- Transitions -------------------------------------------------------

    /// Enter `LoggingIn`. Allowed from `LoggedIn` too (switching accounts);
    /// the current identity stays readable until the login completes.
    pub fn begin_login(&self) -> Result<(), SessionError> {
        let event = {
            let mut phase = self.phase.lock();
            if *phase == SessionPhase::LoggingIn {
                return Err(SessionError::LoginInProgress);
            }
            *phase = SessionPhase::LoggingIn;
            self.event(SessionPhase::LoggingIn)
        };
        debug!("login started");
        self.notify(&event);
        Ok(())
    }

    pub fn complete_login(&self, identity: Identity) -> Result<Arc<Identity>, SessionError> {
        let identity = Arc::new(identity);
        let event = {
            let mut phase = self.phase.lock();
            if *phase != SessionPhase::LoggingIn {
                return Err(SessionError::NotLoggingIn);
            }
            self.identity.store(Some(identity.clone()));
            *phase = SessionPhase::LoggedIn;
            self.event(SessionPhase::LoggedIn)
        };
        info!(user = %identity.id, "logged in");
        self.notify(&event);
        Ok(identity)
    }

    /// Leave `LoggingIn` without a new identity, back to whatever the
    /// session held before.
    pub fn abort_login(&self) {
        let event = {
            let mut phase = self.phase.lock();
            if *phase != SessionPhase::LoggingIn {
                return;
            }
            *phase = if self.identity.load().is_some() {
                SessionPhase::LoggedIn
            } else {
                SessionPhase::LoggedOut
            };
            self.event(*phase)
        };
        debug!(phase = ?event.phase, "login aborted");
        self.notify(&event);
    }

    /// Clear the identity. Watchers (and through them every owned-posts view)
    /// are notified before this returns.
    pub fn logout(&self) -> Option<Arc<Identity>> {
        let (previous, event) = {
            let mut phase = self.phase.lock();
            let previous = self.identity.swap(None);
            *phase = SessionPhase::LoggedOut;
            (previous, self.event(SessionPhase::LoggedOut))
        };
        if let Some(prev) = &previous {
            info!(user = %prev.id, "logged out");
        }
        self.notify(&event);
        previous
    }

    // ----- Watchers ----------------------------------------------------------

    /// Register `f` for every later transition. Dropping the returned handle
    /// unregisters it.
    #[must_use = "dropping a SessionWatch unregisters the watcher"]
    pub fn watch<F>(self: &Arc<Self>, f: F) -> SessionWatch
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.next_watcher.fetch_add(1, Ordering::Relaxed);
        self.watchers.lock().push((id, Arc::new(f)));
        SessionWatch {
            session: Arc::downgrade(self),
            id,
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    fn event(&self, phase: SessionPhase) -> SessionEvent {
        SessionEvent {
            phase,
            identity: self.identity.load_full(),
        }
    }

    fn notify(&self, event: &SessionEvent) {
        let watchers: Vec<Watcher> = self.watchers.lock().iter().map(|(_, w)| w.clone()).collect();
        for watcher in watchers {
            watcher(event);
        }
    }

    fn unwatch(&self, id: u64) {
        self.watchers.lock().retain(|(wid, _)| *wid != id);
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("phase", &self.phase())
            .field("identity", &self.identity())
            .finish()
    }
}

pub struct SessionWatch {
    session: Weak<SessionCache>,
    id: u64,
}

impl Drop for SessionWatch {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session.unwatch(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::new("a@x.com", "Alice")
    }

    #[test]
    fn login_logout_cycle() {
        let session = SessionCache::shared();
        assert_eq!(session.phase(), SessionPhase::LoggedOut);
        assert_eq!(session.require_identity(), Err(LiveSyncError::IdentityMissing));

        session.begin_login().unwrap();
        assert_eq!(session.phase(), SessionPhase::LoggingIn);
        assert_eq!(session.begin_login(), Err(SessionError::LoginInProgress));

        session.complete_login(alice()).unwrap();
        assert_eq!(session.phase(), SessionPhase::LoggedIn);
        assert_eq!(session.require_identity().unwrap().id, "a@x.com");

        let previous = session.logout().unwrap();
        assert_eq!(previous.id, "a@x.com");
        assert!(!session.is_logged_in());
        assert_eq!(session.phase(), SessionPhase::LoggedOut);
    }

    #[test]
    fn complete_without_begin_is_rejected() {
        let session = SessionCache::new();
        assert_eq!(session.complete_login(alice()), Err(SessionError::NotLoggingIn));
        assert!(session.identity().is_none());
    }

    #[test]
    fn abort_restores_previous_phase() {
        let session = SessionCache::new();
        session.begin_login().unwrap();
        session.abort_login();
        assert_eq!(session.phase(), SessionPhase::LoggedOut);

        session.begin_login().unwrap();
        session.complete_login(alice()).unwrap();
        session.begin_login().unwrap();
        // Still readable while switching accounts.
        assert!(session.is_logged_in());
        session.abort_login();
        assert_eq!(session.phase(), SessionPhase::LoggedIn);
    }

    #[test]
    fn watchers_see_every_transition_until_dropped() {
        let session = SessionCache::shared();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let watch = session.watch(move |e| sink.lock().push(e.phase));

        session.begin_login().unwrap();
        session.complete_login(alice()).unwrap();
        session.logout();
        assert_eq!(
            *seen.lock(),
            vec![
                SessionPhase::LoggingIn,
                SessionPhase::LoggedIn,
                SessionPhase::LoggedOut
            ]
        );

        drop(watch);
        assert_eq!(session.watcher_count(), 0);
        session.begin_login().unwrap();
        assert_eq!(seen.lock().len(), 3);
    }
}
