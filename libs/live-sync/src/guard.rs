//! Route guard: the one place that decides where a missing identity goes.

use std::fmt;
use std::sync::Arc;

use crate::model::{Identity, PostId};
use crate::session::SessionCache;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/`: forwards to the dashboard or the public home.
    Landing,
    PublicHome,
    Blogs,
    BlogDetail(PostId),
    Login,
    Dashboard,
    NewPost,
    EditPost(PostId),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Self::Landing => "/".to_string(),
            Self::PublicHome => "/public-home".to_string(),
            Self::Blogs => "/blogs".to_string(),
            Self::BlogDetail(id) => format!("/blog/{id}"),
            Self::Login => "/login".to_string(),
            Self::Dashboard => "/dashboard".to_string(),
            Self::NewPost => "/new-post".to_string(),
            Self::EditPost(id) => format!("/edit-post/{id}"),
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Dashboard | Self::NewPost | Self::EditPost(_))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    /// Render the route; protected routes always carry the identity.
    Granted(Option<Arc<Identity>>),
    Redirect(Route),
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: Arc<SessionCache>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionCache>) -> Self {
        Self { session }
    }

    pub fn check(&self, route: &Route) -> Access {
        let identity = self.session.identity();
        match (route, identity) {
            (Route::Landing, Some(_)) => Access::Redirect(Route::Dashboard),
            (Route::Landing, None) => Access::Redirect(Route::PublicHome),
            (r, None) if r.is_protected() => {
                tracing::debug!(route = %r, "no identity; redirecting to login");
                Access::Redirect(Route::Login)
            }
            (_, identity) => Access::Granted(identity),
        }
    }

    /// Follow redirects until a route is granted.
    pub fn resolve(&self, route: Route) -> (Route, Option<Arc<Identity>>) {
        let mut route = route;
        loop {
            match self.check(&route) {
                Access::Granted(identity) => return (route, identity),
                Access::Redirect(next) => route = next,
            }
        }
    }
}
