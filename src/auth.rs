use actix_web::{dev::Payload, Error, FromRequest, HttpMessage, HttpRequest};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::models::Id;

/// Name of the cookie carrying the opaque session token.
pub const SESSION_COOKIE: &str = "filedrop_session";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Client,
    Ops,
}

impl Role {
    /// Parse the wire form (`CLIENT` / `OPS`). Anything else is not a role.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "CLIENT" => Some(Role::Client),
            "OPS" => Some(Role::Ops),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "CLIENT",
            Role::Ops => "OPS",
        }
    }
}

/// The authenticated identity bound to a session. Lives only in the
/// `SessionStore` and in request extensions; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Id,
    pub role: Role,
}

/// Server-side session map keyed by the client-held token. The token is the
/// only thing that leaves the process.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Principal>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Bind a principal to a fresh token and return the token.
    pub fn create(&self, principal: Principal) -> String {
        let token = new_token();
        self.sessions.insert(token.clone(), principal);
        token
    }

    pub fn get(&self, token: &str) -> Option<Principal> {
        self.sessions.get(token).map(|p| *p)
    }

    /// Returns whether a session existed. Destroying an absent session is
    /// fine; logout is idempotent.
    pub fn destroy(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }
}

fn new_token() -> String {
    let mut buf = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Extractor yielding the request's `Principal`, stashed in extensions by the
/// gateway middleware. Handlers behind the gateway can rely on it existing.
pub struct Auth(pub Principal);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        match req.extensions().get::<Principal>() {
            Some(p) => ready(Ok(Auth(*p))),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "Please login to access this endpoint",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_roundtrip_and_destroy() {
        let store = SessionStore::new();
        let token = store.create(Principal { user_id: 7, role: Role::Ops });
        assert_eq!(token.len(), 32);
        let p = store.get(&token).unwrap();
        assert_eq!(p.user_id, 7);
        assert_eq!(p.role, Role::Ops);
        assert!(store.destroy(&token));
        assert!(store.get(&token).is_none());
        // second destroy is a no-op, not an error
        assert!(!store.destroy(&token));
    }

    #[test]
    fn tokens_are_unique() {
        let store = SessionStore::new();
        let a = store.create(Principal { user_id: 1, role: Role::Client });
        let b = store.create(Principal { user_id: 1, role: Role::Client });
        assert_ne!(a, b);
    }

    #[test]
    fn role_parse_rejects_unknown_values() {
        assert_eq!(Role::parse("CLIENT"), Some(Role::Client));
        assert_eq!(Role::parse("OPS"), Some(Role::Ops));
        assert_eq!(Role::parse("ADMIN"), None);
        assert_eq!(Role::parse("client"), None);
        assert_eq!(Role::parse(""), None);
    }
}
