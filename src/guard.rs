use std::fmt;

use thiserror::Error;

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Signup,
    Home,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::Home => "/",
        }
    }

    pub fn is_protected(self) -> bool {
        self == Route::Home
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not logged in, redirecting to {to}")]
pub struct Redirect {
    pub to: Route,
}

/// Where a navigation to `route` lands given the current session.
/// Meant to be asked again before every render, not cached.
pub fn resolve(route: Route, session: &Session) -> Route {
    match require_auth(session) {
        Err(redirect) if route.is_protected() => redirect.to,
        _ => route,
    }
}

/// Access token for a protected view, or where to send the user instead.
pub fn require_auth(session: &Session) -> Result<&str, Redirect> {
    session.access_token().ok_or(Redirect { to: Route::Login })
}
