// ABOUTME: Core OAuth 2.0 data model: clients, scopes, codes, tokens, and wire types
// ABOUTME: Validity is always derived lazily as !revoked && now < expires_at
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grant types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow with PKCE (RFC 6749 Section 4.1, RFC 7636)
    AuthorizationCode,
    /// Client credentials flow for machine-to-machine access (Section 4.4)
    ClientCredentials,
    /// Resource owner password credentials flow (Section 4.3)
    Password,
    /// Refresh token exchange with rotation (Section 6)
    RefreshToken,
    /// Implicit browser flow, token in the redirect fragment (Section 4.2)
    Implicit,
}

impl GrantType {
    /// Parse the `grant_type` request parameter. `Implicit` has no token-endpoint
    /// identifier; it is selected by `response_type=token` on authorize.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "password" => Some(Self::Password),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    /// Wire identifier for this grant type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
            Self::Implicit => "implicit",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered OAuth 2.0 client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier
    pub client_id: String,
    /// Argon2 hash of the client secret; `None` for public clients
    pub secret_hash: Option<String>,
    /// Exact-match redirect URI allow-list
    pub redirect_uris: Vec<String>,
    /// Whether the client can keep a secret (confidential) or not (public)
    pub confidential: bool,
    /// Grant types this client is registered for
    pub grant_types: Vec<GrantType>,
    /// Scopes this client may be granted
    pub allowed_scopes: Vec<String>,
    /// Optional display name
    pub client_name: Option<String>,
    /// When the client was registered
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Whether the client is registered for the given grant type
    #[must_use]
    pub fn allows_grant(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }
}

/// A named scope a client can request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    /// Scope identifier as it appears in requests and token claims
    pub id: String,
    /// Human-readable description for consent screens
    pub description: Option<String>,
}

/// Single-use authorization code issued by the authorize endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Opaque code value
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Resource owner who approved the request
    pub subject_id: String,
    /// Redirect URI the code is bound to (byte-exact match on redemption)
    pub redirect_uri: String,
    /// Scopes finalized at authorization time
    pub scopes: Vec<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE challenge method; only "S256" is ever stored
    pub code_challenge_method: Option<String>,
    /// When the code expires
    pub expires_at: DateTime<Utc>,
    /// When the code was issued
    pub created_at: DateTime<Utc>,
    /// Set on consumption or explicit revocation
    pub revoked: bool,
}

impl AuthorizationCode {
    /// A code is usable only while unconsumed and unexpired
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Server-side record of an issued access token, keyed by `jti`.
///
/// The JWT itself is stateless; this record exists so revocation can be
/// checked without re-issuing anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    /// Token identifier, mirrored in the JWT `jti` claim
    pub jti: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Resource owner; `None` for client-credentials tokens
    pub subject_id: Option<String>,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Grant type that produced the token
    pub grant_type: GrantType,
    /// When the token was issued
    pub issued_at: DateTime<Utc>,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
    /// Set by explicit revocation (e.g. refresh rotation)
    pub revoked: bool,
}

impl AccessTokenRecord {
    /// A token is usable only while unrevoked and unexpired
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Opaque refresh token, linked to the access token it was issued alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Opaque token value
    pub token: String,
    /// `jti` of the paired access token, revoked together on rotation
    pub access_token_jti: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Resource owner; `None` when the original grant had no subject
    pub subject_id: Option<String>,
    /// Scopes carried forward on rotation
    pub scopes: Vec<String>,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
    /// When the token was issued
    pub created_at: DateTime<Utc>,
    /// Set on consumption (rotation) or defensive family revocation
    pub revoked: bool,
}

impl RefreshToken {
    /// A token is usable only while unrevoked and unexpired
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// OAuth 2.0 Token Request (POST /token body)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// Grant type identifier
    pub grant_type: String,
    /// Client ID
    pub client_id: String,
    /// Client secret; absent for public clients
    pub client_secret: Option<String>,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI (must match the one the code was issued for)
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (RFC 7636)
    pub code_verifier: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
    /// Resource owner username (for `password` grant)
    pub username: Option<String>,
    /// Resource owner password (for `password` grant)
    pub password: Option<String>,
    /// Requested scopes, space-delimited
    pub scope: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token (JWT)
    pub access_token: String,
    /// Token type (always "bearer")
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Granted scopes, space-delimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Refresh token, when the grant allows one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// OAuth 2.0 Authorization Request (GET /authorize query)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type: "code" or "token"
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// Requested scopes, space-delimited
    pub scope: Option<String>,
    /// State parameter for CSRF protection, echoed back unchanged
    pub state: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method; only "S256" is accepted
    pub code_challenge_method: Option<String>,
}

/// Resource owner's decision on an authorization request.
#[derive(Debug, Clone)]
pub enum ConsentDecision {
    /// The authenticated resource owner approved the request
    Approved {
        /// Identifier of the approving subject
        subject_id: String,
    },
    /// The request was denied (by the owner or because none is logged in)
    Denied,
}

/// Outcome of an authorization request.
///
/// Once the redirect URI has been validated against the client's allow-list,
/// every failure travels back as a `Redirect` carrying error parameters; a
/// direct `Error` is only produced before that point, so the engine never
/// redirects to an unvalidated URI.
#[derive(Debug, Clone)]
pub enum AuthorizeOutcome {
    /// Redirect the user agent to this absolute URL
    Redirect {
        /// Fully assembled redirect target
        location: String,
    },
    /// Respond directly with this error; no redirect may be performed
    Error(crate::errors::OAuthError),
}
