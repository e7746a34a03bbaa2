// ABOUTME: Authorization server facade: grant dispatch, authorize redirects, token validation
// ABOUTME: Explicitly constructed and immutable; every failure maps to the OAuth error taxonomy
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::Utc;
use std::sync::Arc;
use url::Url;

use crate::config::ServerConfig;
use crate::errors::OAuthError;
use crate::grants;
use crate::models::{
    AuthorizationCode, AuthorizeOutcome, AuthorizeRequest, Client, ConsentDecision, GrantType,
    TokenRequest, TokenResponse,
};
use crate::store::{
    AccessTokenStore, AuthCodeStore, ClientStore, MemoryStore, RefreshTokenStore, ScopeStore,
    SubjectVerifier,
};
use crate::token::{self, TokenClaims, TokenCodec, TokenValidationError};

/// The store backends an [`AuthorizationServer`] runs on.
pub struct ServerStores {
    /// Registered clients
    pub clients: Arc<dyn ClientStore>,
    /// Scopes and the finalization policy
    pub scopes: Arc<dyn ScopeStore>,
    /// Single-use authorization codes
    pub auth_codes: Arc<dyn AuthCodeStore>,
    /// Access-token revocation records
    pub access_tokens: Arc<dyn AccessTokenStore>,
    /// Refresh tokens
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl ServerStores {
    /// Back every contract with one shared in-memory store
    #[must_use]
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            clients: store.clone(),
            scopes: store.clone(),
            auth_codes: store.clone(),
            access_tokens: store.clone(),
            refresh_tokens: store,
        }
    }
}

/// OAuth 2.0 authorization server.
///
/// Holds its stores, codec, and configuration behind `Arc`s; construct once
/// and share freely. There is no global state.
pub struct AuthorizationServer {
    pub(crate) clients: Arc<dyn ClientStore>,
    pub(crate) scopes: Arc<dyn ScopeStore>,
    pub(crate) auth_codes: Arc<dyn AuthCodeStore>,
    pub(crate) access_tokens: Arc<dyn AccessTokenStore>,
    pub(crate) refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub(crate) subjects: Arc<dyn SubjectVerifier>,
    pub(crate) codec: TokenCodec,
    pub(crate) config: ServerConfig,
}

impl AuthorizationServer {
    /// Build a server over the given stores, subject verifier, and config
    #[must_use]
    pub fn new(
        stores: ServerStores,
        subjects: Arc<dyn SubjectVerifier>,
        config: ServerConfig,
    ) -> Self {
        let codec = TokenCodec::new(&config.signing_key, &config.issuer);
        Self {
            clients: stores.clients,
            scopes: stores.scopes,
            auth_codes: stores.auth_codes,
            access_tokens: stores.access_tokens,
            refresh_tokens: stores.refresh_tokens,
            subjects,
            codec,
            config,
        }
    }

    /// Handle a token request (POST /token).
    ///
    /// Dispatches on `grant_type` over the enabled grant set; unknown and
    /// disabled grants are both `unsupported_grant_type`.
    ///
    /// # Errors
    /// Returns the RFC 6749 error for every failure mode
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let Some(grant_type) = GrantType::from_wire(&request.grant_type) else {
            tracing::warn!(grant_type = %request.grant_type, "Unknown grant type requested");
            return Err(OAuthError::unsupported_grant_type());
        };
        if !self.config.grant_enabled(grant_type) {
            tracing::warn!(grant_type = %grant_type, "Disabled grant type requested");
            return Err(OAuthError::unsupported_grant_type());
        }

        tracing::debug!(
            grant_type = %grant_type,
            client_id = %request.client_id,
            "Token request received"
        );

        match grant_type {
            GrantType::AuthorizationCode => grants::authorization_code::handle(self, request).await,
            GrantType::ClientCredentials => grants::client_credentials::handle(self, request).await,
            GrantType::Password => grants::password::handle(self, request).await,
            GrantType::RefreshToken => grants::refresh::handle(self, request).await,
            // implicit never appears here: from_wire has no mapping for it
            GrantType::Implicit => Err(OAuthError::unsupported_grant_type()),
        }
    }

    /// Handle an authorization request (GET /authorize) plus the resource
    /// owner's consent decision.
    ///
    /// Before the redirect URI is validated against the client's allow-list a
    /// direct error is returned; after that point every failure becomes a
    /// redirect carrying error parameters.
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        consent: ConsentDecision,
    ) -> AuthorizeOutcome {
        let client = match self.clients.get_client(&request.client_id).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                tracing::warn!(client_id = %request.client_id, "Authorize request for unknown client");
                return AuthorizeOutcome::Error(OAuthError::invalid_client());
            }
            Err(e) => {
                tracing::error!(client_id = %request.client_id, error = %e, "Client lookup failed");
                return AuthorizeOutcome::Error(OAuthError::server_error());
            }
        };

        // Exact-match allow-list check; never redirect to an unvalidated URI
        if !client.redirect_uris.contains(&request.redirect_uri) {
            tracing::warn!(
                client_id = %client.client_id,
                redirect_uri = %request.redirect_uri,
                "Authorize request with unregistered redirect_uri"
            );
            return AuthorizeOutcome::Error(OAuthError::invalid_request("Invalid redirect_uri"));
        }

        let in_fragment = request.response_type == "token";
        match self.authorize_validated(&client, &request, consent).await {
            Ok(outcome) => outcome,
            Err(err) => Self::error_redirect(&request, &err, in_fragment),
        }
    }

    /// Everything past redirect-URI validation; errors become redirects.
    async fn authorize_validated(
        &self,
        client: &Client,
        request: &AuthorizeRequest,
        consent: ConsentDecision,
    ) -> Result<AuthorizeOutcome, OAuthError> {
        let grant_type = match request.response_type.as_str() {
            "code" => GrantType::AuthorizationCode,
            "token" => GrantType::Implicit,
            other => {
                tracing::warn!(response_type = %other, "Unsupported response_type");
                return Err(OAuthError::invalid_request(
                    "response_type must be 'code' or 'token'",
                ));
            }
        };

        if !self.config.grant_enabled(grant_type) {
            return Err(OAuthError::unauthorized_client(
                "The requested response type is not enabled on this server",
            ));
        }
        grants::require_grant_registered(client, grant_type)?;

        if grant_type == GrantType::AuthorizationCode {
            Self::validate_pkce_params(client, request)?;
        }

        let ConsentDecision::Approved { subject_id } = consent else {
            tracing::debug!(client_id = %client.client_id, "Authorization denied by resource owner");
            return Err(OAuthError::access_denied(
                "The resource owner denied the request",
            ));
        };

        let requested = grants::parse_scope_param(request.scope.as_deref());
        let scopes =
            grants::finalize_scopes(self, client, &requested, grant_type, Some(&subject_id))
                .await?;

        let now = Utc::now();
        if grant_type == GrantType::Implicit {
            let location = grants::implicit::issue_redirect(
                self,
                &client.client_id,
                &subject_id,
                &scopes,
                &request.redirect_uri,
                request.state.as_deref(),
                now,
            )
            .await?;
            return Ok(AuthorizeOutcome::Redirect { location });
        }

        let code_value = token::generate_opaque().map_err(|e| {
            tracing::error!(error = %e, "Failed to generate authorization code");
            OAuthError::server_error()
        })?;

        let auth_code = AuthorizationCode {
            code: code_value.clone(),
            client_id: client.client_id.clone(),
            subject_id,
            redirect_uri: request.redirect_uri.clone(),
            scopes,
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request
                .code_challenge
                .as_ref()
                .map(|_| "S256".to_owned()),
            expires_at: now + self.config.auth_code_ttl,
            created_at: now,
            revoked: false,
        };
        self.auth_codes.store_code(&auth_code).await.map_err(|e| {
            tracing::error!(client_id = %client.client_id, error = %e, "Failed to store authorization code");
            OAuthError::server_error()
        })?;

        tracing::debug!(client_id = %client.client_id, "Authorization code issued");

        let mut params = vec![("code", code_value)];
        if let Some(state) = &request.state {
            params.push(("state", state.clone()));
        }
        let location = Self::redirect_with_query(&request.redirect_uri, &params)?;
        Ok(AuthorizeOutcome::Redirect { location })
    }

    /// PKCE parameter validation at authorization time (RFC 7636).
    ///
    /// Public clients must supply a challenge; the method, when given, must
    /// be S256. The plain method is not supported.
    fn validate_pkce_params(client: &Client, request: &AuthorizeRequest) -> Result<(), OAuthError> {
        match request.code_challenge.as_deref() {
            Some(challenge) => {
                if challenge.len() < 43 || challenge.len() > 128 {
                    return Err(OAuthError::invalid_request(
                        "code_challenge must be between 43 and 128 characters",
                    ));
                }
                let method = request.code_challenge_method.as_deref().unwrap_or("S256");
                if method != "S256" {
                    return Err(OAuthError::invalid_request(
                        "code_challenge_method must be 'S256'",
                    ));
                }
                Ok(())
            }
            None if !client.confidential => Err(OAuthError::invalid_request(
                "code_challenge is required for public clients (PKCE)",
            )),
            None => Ok(()),
        }
    }

    /// Build the error redirect for a validated redirect URI.
    ///
    /// Code-flow errors travel in the query string, implicit-flow errors in
    /// the fragment, both echoing `state` unchanged.
    fn error_redirect(
        request: &AuthorizeRequest,
        err: &OAuthError,
        in_fragment: bool,
    ) -> AuthorizeOutcome {
        let description = err
            .error_description
            .clone()
            .unwrap_or_else(|| "Authorization failed".to_owned());

        if in_fragment {
            let mut fragment = format!(
                "error={}&error_description={}",
                err.error.as_str(),
                urlencoding::encode(&description)
            );
            if let Some(state) = &request.state {
                fragment.push_str("&state=");
                fragment.push_str(&urlencoding::encode(state));
            }
            return AuthorizeOutcome::Redirect {
                location: format!("{}#{fragment}", request.redirect_uri),
            };
        }

        let mut params = vec![
            ("error", err.error.as_str().to_owned()),
            ("error_description", description),
        ];
        if let Some(state) = &request.state {
            params.push(("state", state.clone()));
        }
        match Self::redirect_with_query(&request.redirect_uri, &params) {
            Ok(location) => AuthorizeOutcome::Redirect { location },
            // the URI passed the allow-list but failed to parse; fall back to
            // a direct error rather than emitting a broken redirect
            Err(e) => AuthorizeOutcome::Error(e),
        }
    }

    fn redirect_with_query<S: AsRef<str>>(
        base: &str,
        params: &[(&str, S)],
    ) -> Result<String, OAuthError> {
        let mut url = Url::parse(base).map_err(|e| {
            tracing::error!(redirect_uri = %base, error = %e, "Registered redirect_uri is unparseable");
            OAuthError::server_error()
        })?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_ref())));
        Ok(url.into())
    }

    /// Validate a presented access token for the resource layer and the
    /// request gate: signature, expiry, then the revocation record.
    ///
    /// # Errors
    /// Returns `access_denied` for every rejection; detail stays in the logs
    pub async fn validate_access_token(&self, token: &str) -> Result<TokenClaims, OAuthError> {
        let now = Utc::now();
        let claims = self.codec.verify(token, now).map_err(|e| {
            match &e {
                TokenValidationError::TokenExpired { expired_at } => {
                    tracing::debug!(expired_at = %expired_at, "Access token expired");
                }
                TokenValidationError::TokenInvalid { reason } => {
                    tracing::warn!(reason = %reason, "Access token failed validation");
                }
                TokenValidationError::TokenMalformed { details } => {
                    tracing::warn!(details = %details, "Malformed access token presented");
                }
            }
            OAuthError::access_denied("Invalid access token")
        })?;

        let record = self
            .access_tokens
            .get_token(&claims.jti)
            .await
            .map_err(|e| {
                tracing::error!(jti = %claims.jti, error = %e, "Token record lookup failed");
                OAuthError::server_error()
            })?
            .ok_or_else(|| {
                tracing::warn!(jti = %claims.jti, "Token verifies but has no issuance record");
                OAuthError::access_denied("Invalid access token")
            })?;

        if record.revoked {
            tracing::debug!(jti = %claims.jti, "Revoked access token presented");
            return Err(OAuthError::access_denied("Invalid access token"));
        }

        Ok(claims)
    }
}
