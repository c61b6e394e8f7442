//! Bearer-token sessions.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::security::Clock;
use crate::store::User;

/// The identity a request acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub expires_at_ms: u64,
}

/// Resolves the session a request carries, if any.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Session>;
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// In-process token table.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            ttl_ms: ttl_secs.saturating_mul(1000),
        }
    }

    /// Start a session for `user` and return its token.
    pub fn issue(&self, user: &User) -> (String, Session) {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            expires_at_ms: self.clock.now_ms() + self.ttl_ms,
        };
        self.sessions.insert(token.clone(), session.clone());
        (token, session)
    }

    pub fn lookup(&self, token: &str) -> Option<Session> {
        let now = self.clock.now_ms();
        let session = self.sessions.get(token).map(|s| s.clone())?;
        if now >= session.expires_at_ms {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    /// Returns whether the token was live.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// End every session of `user_id`. Returns how many were live.
    pub fn revoke_user(&self, user_id: i64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.user_id != user_id);
        before.saturating_sub(self.sessions.len())
    }

    /// Keep sessions of `user_id` in step with a changed profile.
    pub fn refresh_identity(&self, user: &User) {
        for mut session in self.sessions.iter_mut() {
            if session.user_id == user.id {
                session.email = user.email.clone();
                session.name = user.name.clone();
            }
        }
    }

    /// Drop every session past its expiry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| now < session.expires_at_ms);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionResolver for SessionStore {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Session> {
        self.lookup(bearer_token(headers)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ManualClock;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn user(id: i64, email: &str) -> User {
        User {
            id,
            name: "Ann".into(),
            email: email.into(),
            password_hash: String::new(),
            role: "user".into(),
            image: None,
            created_at: Utc::now(),
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&bearer("abc")), Some("abc"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&basic), None);
    }

    #[tokio::test]
    async fn test_issued_session_resolves() {
        let store = SessionStore::new(Arc::new(ManualClock::new(0)), 60);
        let (token, session) = store.issue(&user(1, "ann@example.com"));

        let resolved = store.resolve(&bearer(&token)).await;
        assert_eq!(resolved, Some(session));
        assert!(store.resolve(&bearer("unknown")).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let clock = Arc::new(ManualClock::new(0));
        let store = SessionStore::new(clock.clone(), 60);
        let (token, _) = store.issue(&user(1, "ann@example.com"));

        clock.advance(60_000);
        assert!(store.resolve(&bearer(&token)).await.is_none());
        assert!(store.is_empty(), "expired session should be removed");
    }

    #[tokio::test]
    async fn test_revoke_and_refresh() {
        let store = SessionStore::new(Arc::new(ManualClock::new(0)), 60);
        let (token, _) = store.issue(&user(1, "ann@example.com"));

        store.refresh_identity(&user(1, "new@example.com"));
        assert_eq!(store.lookup(&token).unwrap().email, "new@example.com");

        assert!(store.revoke(&token));
        assert!(!store.revoke(&token));
    }

    #[test]
    fn test_sweep_drops_only_expired_sessions() {
        let clock = Arc::new(ManualClock::new(0));
        let store = SessionStore::new(clock.clone(), 60);
        store.issue(&user(1, "ann@example.com"));
        clock.advance(30_000);
        let (live, _) = store.issue(&user(2, "bob@example.com"));

        clock.advance(30_000);
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.lookup(&live).is_some());
    }

    #[test]
    fn test_revoke_user_ends_all_their_sessions() {
        let store = SessionStore::new(Arc::new(ManualClock::new(0)), 60);
        store.issue(&user(1, "ann@example.com"));
        store.issue(&user(1, "ann@example.com"));
        let (other, _) = store.issue(&user(2, "bob@example.com"));

        assert_eq!(store.revoke_user(1), 2);
        assert!(store.lookup(&other).is_some());
    }
}
