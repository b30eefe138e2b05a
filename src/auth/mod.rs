//! Session gate subsystem.
//!
//! The identity layer (login, callback, token verification) lives outside
//! this service. Request handlers consume only a boolean "is authenticated"
//! plus an opaque profile value, dispatched through the [`SessionGate`]
//! capability trait so the verification mechanism never leaks into the core.

pub mod registry;

use axum::http::{header, HeaderMap};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Capability interface onto the external identity layer.
pub trait SessionGate: Send + Sync {
    /// Whether the request carries an authenticated session.
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;

    /// Opaque profile handle for the session, if any. Never inspected by
    /// the core; surfaced for logging and downstream collaborators.
    fn profile(&self, headers: &HeaderMap) -> Option<serde_json::Value>;
}

// ---------------------------------------------------------------------------
// Cookie-backed gate
// ---------------------------------------------------------------------------

/// [`SessionGate`] that treats the presence of the session cookie minted by
/// the identity layer as the authentication evidence. The cookie value is an
/// opaque token; this gate never decodes it.
pub struct CookieSessionGate {
    cookie_name: String,
}

impl CookieSessionGate {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    fn session_value(&self, headers: &HeaderMap) -> Option<String> {
        for value in headers.get_all(header::COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            for pair in value.split(';') {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                if name.trim() == self.cookie_name && !value.trim().is_empty() {
                    return Some(value.trim().to_string());
                }
            }
        }
        None
    }
}

impl SessionGate for CookieSessionGate {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        self.session_value(headers).is_some()
    }

    fn profile(&self, headers: &HeaderMap) -> Option<serde_json::Value> {
        self.session_value(headers)
            .map(serde_json::Value::String)
    }
}
