// ABOUTME: Credential store contracts and the concurrent in-memory reference implementation
// ABOUTME: Consume operations are atomic single-use: exactly one of two racing callers wins
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use subtle::ConstantTimeEq;

use crate::models::{
    AccessTokenRecord, AuthorizationCode, Client, GrantType, RefreshToken, Scope,
};

/// Storage contract for registered clients.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Look up a client by id. `None` means unknown client.
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>>;

    /// Persist a client registration
    async fn store_client(&self, client: &Client) -> Result<()>;
}

/// Storage contract for scopes and the scope-finalization policy.
#[async_trait]
pub trait ScopeStore: Send + Sync {
    /// Look up a scope definition
    async fn get_scope(&self, scope_id: &str) -> Result<Option<Scope>>;

    /// Persist a scope definition
    async fn store_scope(&self, scope: &Scope) -> Result<()>;

    /// Decide the scopes actually granted for a request.
    ///
    /// Must return a subset of `requested` when `requested` is non-empty. An
    /// empty `requested` means no restriction was asked for and the policy
    /// decides the default grant.
    async fn finalize_scopes(
        &self,
        requested: &[String],
        client: &Client,
        grant_type: GrantType,
        subject_id: Option<&str>,
    ) -> Result<Vec<Scope>>;
}

/// Storage contract for single-use authorization codes.
#[async_trait]
pub trait AuthCodeStore: Send + Sync {
    /// Persist a freshly issued code
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Look up a code without consuming it
    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;

    /// Atomically validate and consume a code.
    ///
    /// Checks not-revoked, not-expired, client match, and byte-exact redirect
    /// URI match, and marks the code revoked, all in one step. Returns the
    /// code as it was before consumption, or `None` if any check failed.
    async fn consume_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>>;

    /// Mark a code revoked. Idempotent; unknown codes are a no-op.
    async fn revoke_code(&self, code: &str) -> Result<()>;
}

/// Storage contract for issued access-token records (revocation bookkeeping).
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Persist the record for a freshly minted token
    async fn store_token(&self, record: &AccessTokenRecord) -> Result<()>;

    /// Look up a record by `jti`
    async fn get_token(&self, jti: &str) -> Result<Option<AccessTokenRecord>>;

    /// Mark a token revoked. Idempotent; unknown ids are a no-op.
    async fn revoke_token(&self, jti: &str) -> Result<()>;
}

/// Storage contract for refresh tokens.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a freshly issued refresh token
    async fn store_token(&self, token: &RefreshToken) -> Result<()>;

    /// Look up a token without consuming it
    async fn get_token(&self, token: &str) -> Result<Option<RefreshToken>>;

    /// Atomically validate and consume a refresh token.
    ///
    /// Checks not-revoked, not-expired, and client match, and marks the token
    /// revoked, all in one step. Returns the token as it was before
    /// consumption, or `None` if any check failed.
    async fn consume_token(
        &self,
        token: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>>;

    /// Mark a token revoked. Idempotent; unknown tokens are a no-op.
    async fn revoke_token(&self, token: &str) -> Result<()>;

    /// Revoke every refresh token issued to this client+subject pair.
    ///
    /// Defensive response to a replayed (already-rotated) token: the whole
    /// family is burned so a stolen chain cannot be extended.
    async fn revoke_family(&self, client_id: &str, subject_id: Option<&str>) -> Result<()>;
}

/// Resource-owner credential verification, delegated outward to the host
/// application's login subsystem. Used by the password grant.
#[async_trait]
pub trait SubjectVerifier: Send + Sync {
    /// Verify a username/password pair. `Ok(Some(subject_id))` on success,
    /// `Ok(None)` on bad credentials, `Err` only for verifier-internal failures.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<String>>;
}

/// Concurrent in-memory implementation of all store contracts.
///
/// Consume operations rely on the map's per-entry locking (`get_mut` holds
/// the shard write lock) so the single-use invariant holds under concurrency.
/// Intended for tests and embedders that do not need durable storage.
#[derive(Default)]
pub struct MemoryStore {
    clients: DashMap<String, Client>,
    scopes: DashMap<String, Scope>,
    auth_codes: DashMap<String, AuthorizationCode>,
    access_tokens: DashMap<String, AccessTokenRecord>,
    refresh_tokens: DashMap<String, RefreshToken>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn store_client(&self, client: &Client) -> Result<()> {
        self.clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }
}

#[async_trait]
impl ScopeStore for MemoryStore {
    async fn get_scope(&self, scope_id: &str) -> Result<Option<Scope>> {
        Ok(self.scopes.get(scope_id).map(|s| s.clone()))
    }

    async fn store_scope(&self, scope: &Scope) -> Result<()> {
        self.scopes.insert(scope.id.clone(), scope.clone());
        Ok(())
    }

    async fn finalize_scopes(
        &self,
        requested: &[String],
        client: &Client,
        _grant_type: GrantType,
        _subject_id: Option<&str>,
    ) -> Result<Vec<Scope>> {
        // Empty request: the client gets its full allowed set. Otherwise the
        // grant is the intersection with the allowed set, in request order.
        let granted_ids: Vec<&String> = if requested.is_empty() {
            client.allowed_scopes.iter().collect()
        } else {
            requested
                .iter()
                .filter(|s| client.allowed_scopes.contains(s))
                .collect()
        };

        let mut granted = Vec::with_capacity(granted_ids.len());
        for id in granted_ids {
            let scope = self
                .scopes
                .get(id.as_str())
                .map_or_else(
                    || Scope {
                        id: id.clone(),
                        description: None,
                    },
                    |s| s.clone(),
                );
            granted.push(scope);
        }
        Ok(granted)
    }
}

#[async_trait]
impl AuthCodeStore for MemoryStore {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        self.auth_codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        Ok(self.auth_codes.get(code).map(|c| c.clone()))
    }

    async fn consume_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>> {
        // get_mut holds the entry lock for the whole check-and-mark, so two
        // racing consumers serialize and only the first sees revoked=false.
        let Some(mut entry) = self.auth_codes.get_mut(code) else {
            return Ok(None);
        };

        if !entry.is_usable(now)
            || entry.client_id != client_id
            || entry.redirect_uri != redirect_uri
        {
            return Ok(None);
        }

        let consumed = entry.clone();
        entry.revoked = true;
        Ok(Some(consumed))
    }

    async fn revoke_code(&self, code: &str) -> Result<()> {
        if let Some(mut entry) = self.auth_codes.get_mut(code) {
            entry.revoked = true;
        }
        Ok(())
    }
}

#[async_trait]
impl AccessTokenStore for MemoryStore {
    async fn store_token(&self, record: &AccessTokenRecord) -> Result<()> {
        self.access_tokens.insert(record.jti.clone(), record.clone());
        Ok(())
    }

    async fn get_token(&self, jti: &str) -> Result<Option<AccessTokenRecord>> {
        Ok(self.access_tokens.get(jti).map(|t| t.clone()))
    }

    async fn revoke_token(&self, jti: &str) -> Result<()> {
        if let Some(mut entry) = self.access_tokens.get_mut(jti) {
            entry.revoked = true;
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn store_token(&self, token: &RefreshToken) -> Result<()> {
        self.refresh_tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        Ok(self.refresh_tokens.get(token).map(|t| t.clone()))
    }

    async fn consume_token(
        &self,
        token: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        let Some(mut entry) = self.refresh_tokens.get_mut(token) else {
            return Ok(None);
        };

        if !entry.is_usable(now) || entry.client_id != client_id {
            return Ok(None);
        }

        let consumed = entry.clone();
        entry.revoked = true;
        Ok(Some(consumed))
    }

    async fn revoke_token(&self, token: &str) -> Result<()> {
        if let Some(mut entry) = self.refresh_tokens.get_mut(token) {
            entry.revoked = true;
        }
        Ok(())
    }

    async fn revoke_family(&self, client_id: &str, subject_id: Option<&str>) -> Result<()> {
        for mut entry in self.refresh_tokens.iter_mut() {
            if entry.client_id == client_id && entry.subject_id.as_deref() == subject_id {
                entry.revoked = true;
            }
        }
        Ok(())
    }
}

/// In-memory subject verifier with a fixed username/password table.
///
/// Stands in for the host application's login subsystem in tests and demos.
#[derive(Default)]
pub struct StaticSubjectVerifier {
    subjects: DashMap<String, (String, String)>,
}

impl StaticSubjectVerifier {
    /// Create an empty verifier
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a username/password pair resolving to `subject_id`
    pub fn add_subject(&self, username: &str, password: &str, subject_id: &str) {
        self.subjects.insert(
            username.to_owned(),
            (password.to_owned(), subject_id.to_owned()),
        );
    }
}

#[async_trait]
impl SubjectVerifier for StaticSubjectVerifier {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<String>> {
        let Some(entry) = self.subjects.get(username) else {
            return Ok(None);
        };
        let (stored_password, subject_id) = entry.value();

        if stored_password.as_bytes().ct_eq(password.as_bytes()).into() {
            Ok(Some(subject_id.clone()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn sample_code(now: DateTime<Utc>) -> AuthorizationCode {
        AuthorizationCode {
            code: "code-1".to_owned(),
            client_id: "client-a".to_owned(),
            subject_id: "user-1".to_owned(),
            redirect_uri: "https://app.example/cb".to_owned(),
            scopes: vec!["read".to_owned()],
            code_challenge: None,
            code_challenge_method: None,
            expires_at: now + Duration::minutes(10),
            created_at: now,
            revoked: false,
        }
    }

    fn sample_refresh(token: &str, now: DateTime<Utc>) -> RefreshToken {
        RefreshToken {
            token: token.to_owned(),
            access_token_jti: "jti-1".to_owned(),
            client_id: "client-a".to_owned(),
            subject_id: Some("user-1".to_owned()),
            scopes: vec!["read".to_owned()],
            expires_at: now + Duration::days(30),
            created_at: now,
            revoked: false,
        }
    }

    fn sample_client() -> Client {
        Client {
            client_id: "client-a".to_owned(),
            secret_hash: None,
            redirect_uris: vec!["https://app.example/cb".to_owned()],
            confidential: false,
            grant_types: vec![GrantType::AuthorizationCode],
            allowed_scopes: vec!["read".to_owned(), "write".to_owned()],
            client_name: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn consume_code_is_single_use() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.store_code(&sample_code(now)).await.unwrap();

        let first = store
            .consume_code("code-1", "client-a", "https://app.example/cb", now)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .consume_code("code-1", "client-a", "https://app.example/cb", now)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn consume_code_rejects_mismatched_client_and_uri() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.store_code(&sample_code(now)).await.unwrap();

        assert!(store
            .consume_code("code-1", "other-client", "https://app.example/cb", now)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .consume_code("code-1", "client-a", "https://app.example/cb/", now)
            .await
            .unwrap()
            .is_none());

        // failed attempts must not burn the code
        assert!(store
            .consume_code("code-1", "client-a", "https://app.example/cb", now)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn consume_code_rejects_expired() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.store_code(&sample_code(now)).await.unwrap();

        let later = now + Duration::minutes(11);
        assert!(store
            .consume_code("code-1", "client-a", "https://app.example/cb", later)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn concurrent_consumers_exactly_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store.store_code(&sample_code(now)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .consume_code("code-1", "client-a", "https://app.example/cb", now)
                    .await
                    .unwrap()
                    .is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn revoke_family_burns_all_subject_tokens() {
        let store = MemoryStore::new();
        let now = Utc::now();
        RefreshTokenStore::store_token(&store, &sample_refresh("rt-1", now))
            .await
            .unwrap();
        RefreshTokenStore::store_token(&store, &sample_refresh("rt-2", now))
            .await
            .unwrap();

        let mut other = sample_refresh("rt-other", now);
        other.subject_id = Some("user-2".to_owned());
        RefreshTokenStore::store_token(&store, &other).await.unwrap();

        RefreshTokenStore::revoke_family(&store, "client-a", Some("user-1"))
            .await
            .unwrap();

        assert!(RefreshTokenStore::get_token(&store, "rt-1")
            .await
            .unwrap()
            .unwrap()
            .revoked);
        assert!(RefreshTokenStore::get_token(&store, "rt-2")
            .await
            .unwrap()
            .unwrap()
            .revoked);
        assert!(!RefreshTokenStore::get_token(&store, "rt-other")
            .await
            .unwrap()
            .unwrap()
            .revoked);
    }

    #[tokio::test]
    async fn revocation_is_independent_of_expiry() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let record = AccessTokenRecord {
            jti: "jti-1".to_owned(),
            client_id: "client-a".to_owned(),
            subject_id: None,
            scopes: vec![],
            grant_type: GrantType::ClientCredentials,
            issued_at: now,
            expires_at: now + Duration::hours(1),
            revoked: false,
        };
        AccessTokenStore::store_token(&store, &record).await.unwrap();
        AccessTokenStore::revoke_token(&store, "jti-1").await.unwrap();

        let stored = AccessTokenStore::get_token(&store, "jti-1")
            .await
            .unwrap()
            .unwrap();
        // revoked, yet still within its expiry window
        assert!(stored.revoked);
        assert!(now < stored.expires_at);
        assert!(!stored.is_usable(now));
    }

    #[tokio::test]
    async fn finalize_scopes_intersects_with_allowed_set() {
        let store = MemoryStore::new();
        let client = sample_client();

        let granted = store
            .finalize_scopes(
                &["read".to_owned(), "admin".to_owned()],
                &client,
                GrantType::AuthorizationCode,
                Some("user-1"),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = granted.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["read"]);
    }

    #[tokio::test]
    async fn finalize_scopes_empty_request_grants_full_allowed_set() {
        let store = MemoryStore::new();
        let client = sample_client();

        let granted = store
            .finalize_scopes(&[], &client, GrantType::ClientCredentials, None)
            .await
            .unwrap();
        let ids: Vec<&str> = granted.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["read", "write"]);
    }

    #[tokio::test]
    async fn finalize_scopes_carries_stored_descriptions() {
        let store = MemoryStore::new();
        store
            .store_scope(&Scope {
                id: "read".to_owned(),
                description: Some("Read access".to_owned()),
            })
            .await
            .unwrap();
        assert!(store.get_scope("read").await.unwrap().is_some());

        let granted = store
            .finalize_scopes(&[], &sample_client(), GrantType::ClientCredentials, None)
            .await
            .unwrap();
        assert_eq!(
            granted[0].description.as_deref(),
            Some("Read access")
        );
        // scopes with no stored definition still finalize by id
        assert!(granted[1].description.is_none());
    }

    #[tokio::test]
    async fn static_verifier_checks_credentials() {
        let verifier = StaticSubjectVerifier::new();
        verifier.add_subject("alice", "hunter2", "user-1");

        assert_eq!(
            verifier.verify("alice", "hunter2").await.unwrap(),
            Some("user-1".to_owned())
        );
        assert_eq!(verifier.verify("alice", "wrong").await.unwrap(), None);
        assert_eq!(verifier.verify("bob", "hunter2").await.unwrap(), None);
    }
}
