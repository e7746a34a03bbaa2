// ABOUTME: Shared test fixtures: in-memory server setup and client registration helpers
// ABOUTME: Used by the grant flow, PKCE, and policy gate integration tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Once};

use grantgate::{
    client_auth, AuthorizationServer, Client, GrantType, MemoryStore, ServerConfig, ServerStores,
    StaticSubjectVerifier, TokenRequest,
};

pub const REDIRECT_URI: &str = "https://app.example/callback";

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN, // Default to WARN for quiet tests
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Build a server over a fresh in-memory store with every grant enabled.
///
/// The returned store and verifier handles allow tests to register clients
/// and subjects directly.
pub fn test_server() -> (
    Arc<MemoryStore>,
    Arc<StaticSubjectVerifier>,
    AuthorizationServer,
) {
    init_test_logging();
    let store = Arc::new(MemoryStore::new());
    let subjects = Arc::new(StaticSubjectVerifier::new());
    let server = AuthorizationServer::new(
        ServerStores::from_memory(store.clone()),
        subjects.clone(),
        ServerConfig::for_testing(),
    );
    (store, subjects, server)
}

pub async fn register_confidential_client(
    store: &MemoryStore,
    client_id: &str,
    secret: &str,
    grant_types: Vec<GrantType>,
    allowed_scopes: Vec<&str>,
) {
    let client = Client {
        client_id: client_id.to_owned(),
        secret_hash: Some(client_auth::hash_secret(secret).unwrap()),
        redirect_uris: vec![REDIRECT_URI.to_owned()],
        confidential: true,
        grant_types,
        allowed_scopes: allowed_scopes.into_iter().map(str::to_owned).collect(),
        client_name: Some("Test Client".to_owned()),
        created_at: Utc::now(),
    };
    grantgate::ClientStore::store_client(store, &client)
        .await
        .unwrap();
}

pub async fn register_public_client(
    store: &MemoryStore,
    client_id: &str,
    grant_types: Vec<GrantType>,
    allowed_scopes: Vec<&str>,
) {
    let client = Client {
        client_id: client_id.to_owned(),
        secret_hash: None,
        redirect_uris: vec![REDIRECT_URI.to_owned()],
        confidential: false,
        grant_types,
        allowed_scopes: allowed_scopes.into_iter().map(str::to_owned).collect(),
        client_name: Some("Test SPA".to_owned()),
        created_at: Utc::now(),
    };
    grantgate::ClientStore::store_client(store, &client)
        .await
        .unwrap();
}

/// Token request with every optional field unset
pub fn token_request(grant_type: &str, client_id: &str, secret: Option<&str>) -> TokenRequest {
    TokenRequest {
        grant_type: grant_type.to_owned(),
        client_id: client_id.to_owned(),
        client_secret: secret.map(str::to_owned),
        code: None,
        redirect_uri: None,
        code_verifier: None,
        refresh_token: None,
        username: None,
        password: None,
        scope: None,
    }
}

/// A valid RFC 7636 verifier and its S256 challenge
pub fn pkce_pair() -> (String, String) {
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_owned();
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());
    (verifier, challenge)
}
