// ABOUTME: OAuth2 authorization engine: grant handlers, token lifecycle, and request gating
// ABOUTME: Transport-agnostic core; HTTP routing and durable storage live in the embedder
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # grantgate
//!
//! An embeddable OAuth 2.0 authorization engine. It issues, validates, and
//! revokes access grants across five grant types (client credentials,
//! password, authorization code + PKCE, refresh token, implicit) and gates
//! inbound requests against route-scoped boolean policy expressions.
//!
//! The engine is deliberately transport-agnostic: it consumes parsed request
//! types and produces serializable responses, redirect URLs, and
//! [`http::StatusCode`]s, leaving routing and persistence to the embedder.
//! Storage is defined by the traits in [`store`]; a concurrent in-memory
//! implementation backs tests and lightweight embeddings.
//!
//! ```no_run
//! use std::sync::Arc;
//! use grantgate::{
//!     AuthorizationServer, MemoryStore, ServerConfig, ServerStores,
//!     StaticSubjectVerifier, TokenRequest,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let store = Arc::new(MemoryStore::new());
//! let server = AuthorizationServer::new(
//!     ServerStores::from_memory(store),
//!     Arc::new(StaticSubjectVerifier::new()),
//!     ServerConfig::from_env()?,
//! );
//!
//! let granted = server
//!     .token(TokenRequest {
//!         grant_type: "client_credentials".to_owned(),
//!         client_id: "service-a".to_owned(),
//!         client_secret: Some("secret".to_owned()),
//!         code: None,
//!         redirect_uri: None,
//!         code_verifier: None,
//!         refresh_token: None,
//!         username: None,
//!         password: None,
//!         scope: None,
//!     })
//!     .await?;
//! assert_eq!(granted.token_type, "bearer");
//! # Ok(())
//! # }
//! ```

pub mod client_auth;
pub mod config;
pub mod errors;
pub mod grants;
pub mod models;
pub mod policy;
pub mod server;
pub mod store;
pub mod token;

pub use config::ServerConfig;
pub use errors::{ErrorKind, OAuthError};
pub use models::{
    AccessTokenRecord, AuthorizationCode, AuthorizeOutcome, AuthorizeRequest, Client,
    ConsentDecision, GrantType, RefreshToken, Scope, TokenRequest, TokenResponse,
};
pub use policy::{Gate, GateDecision, OAuthFacts, RequestFacts, RouteAuthorization, SubjectFacts};
pub use server::{AuthorizationServer, ServerStores};
pub use store::{
    AccessTokenStore, AuthCodeStore, ClientStore, MemoryStore, RefreshTokenStore, ScopeStore,
    StaticSubjectVerifier, SubjectVerifier,
};
pub use token::{TokenClaims, TokenCodec, TokenValidationError};
