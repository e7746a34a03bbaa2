// ABOUTME: Grant-type handlers and the shared issuance pipeline they run through
// ABOUTME: Parse, authenticate client, grant-specific checks, finalize scopes, mint tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0

pub(crate) mod authorization_code;
pub(crate) mod client_credentials;
pub(crate) mod implicit;
pub(crate) mod password;
pub(crate) mod refresh;

use chrono::{DateTime, Utc};

use crate::errors::OAuthError;
use crate::models::{
    AccessTokenRecord, Client, GrantType, RefreshToken, TokenResponse,
};
use crate::server::AuthorizationServer;
use crate::token::{self, MintParams};

/// Split a space-delimited scope parameter into scope ids
pub(crate) fn parse_scope_param(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or("")
        .split_whitespace()
        .map(std::string::ToString::to_string)
        .collect()
}

/// Look up the requesting client; unknown clients fail as `invalid_client`
/// so the wire does not distinguish missing from wrong-secret.
pub(crate) async fn load_client(
    server: &AuthorizationServer,
    client_id: &str,
) -> Result<Client, OAuthError> {
    server
        .clients
        .get_client(client_id)
        .await
        .map_err(|e| {
            tracing::error!(client_id = %client_id, error = %e, "Client lookup failed");
            OAuthError::server_error()
        })?
        .ok_or_else(|| {
            tracing::warn!(client_id = %client_id, "Unknown client");
            OAuthError::invalid_client()
        })
}

/// Refuse clients not registered for the grant before any grant-specific work
pub(crate) fn require_grant_registered(
    client: &Client,
    grant_type: GrantType,
) -> Result<(), OAuthError> {
    if client.allows_grant(grant_type) {
        Ok(())
    } else {
        tracing::warn!(
            client_id = %client.client_id,
            grant_type = %grant_type,
            "Client not registered for grant type"
        );
        Err(OAuthError::unauthorized_client(
            "Client is not registered for this grant type",
        ))
    }
}

/// Finalize requested scopes through the scope store.
///
/// A non-empty request that finalizes to nothing is `invalid_scope`: the
/// client asked only for scopes it cannot have.
pub(crate) async fn finalize_scopes(
    server: &AuthorizationServer,
    client: &Client,
    requested: &[String],
    grant_type: GrantType,
    subject_id: Option<&str>,
) -> Result<Vec<String>, OAuthError> {
    let granted = server
        .scopes
        .finalize_scopes(requested, client, grant_type, subject_id)
        .await
        .map_err(|e| {
            tracing::error!(client_id = %client.client_id, error = %e, "Scope finalization failed");
            OAuthError::server_error()
        })?;

    if granted.is_empty() && !requested.is_empty() {
        tracing::warn!(
            client_id = %client.client_id,
            requested = ?requested,
            "Requested scopes are outside the client's allowed set"
        );
        return Err(OAuthError::invalid_scope(
            "Requested scope is not available to this client",
        ));
    }

    Ok(granted.into_iter().map(|s| s.id).collect())
}

/// Mint an access token (and optionally a refresh token), record both, and
/// assemble the token response. The tail of every successful grant.
pub(crate) async fn issue_tokens(
    server: &AuthorizationServer,
    client_id: &str,
    subject_id: Option<&str>,
    scopes: &[String],
    grant_type: GrantType,
    with_refresh: bool,
    now: DateTime<Utc>,
) -> Result<TokenResponse, OAuthError> {
    let minted = server
        .codec
        .mint(
            &MintParams {
                client_id,
                subject_id,
                scopes,
                grant_type,
                ttl: server.config.access_token_ttl,
            },
            now,
        )
        .map_err(|e| {
            tracing::error!(client_id = %client_id, error = %e, "Access token minting failed");
            OAuthError::server_error()
        })?;

    let record = AccessTokenRecord {
        jti: minted.jti.clone(),
        client_id: client_id.to_owned(),
        subject_id: subject_id.map(std::string::ToString::to_string),
        scopes: scopes.to_vec(),
        grant_type,
        issued_at: now,
        expires_at: minted.expires_at,
        revoked: false,
    };
    server.access_tokens.store_token(&record).await.map_err(|e| {
        tracing::error!(client_id = %client_id, error = %e, "Failed to store access token record");
        OAuthError::server_error()
    })?;

    let refresh_token = if with_refresh {
        let value = token::generate_opaque().map_err(|e| {
            tracing::error!(error = %e, "Failed to generate refresh token");
            OAuthError::server_error()
        })?;

        let refresh = RefreshToken {
            token: value.clone(),
            access_token_jti: minted.jti.clone(),
            client_id: client_id.to_owned(),
            subject_id: subject_id.map(std::string::ToString::to_string),
            scopes: scopes.to_vec(),
            expires_at: now + server.config.refresh_token_ttl,
            created_at: now,
            revoked: false,
        };
        server.refresh_tokens.store_token(&refresh).await.map_err(|e| {
            tracing::error!(client_id = %client_id, error = %e, "Failed to store refresh token");
            OAuthError::server_error()
        })?;

        Some(value)
    } else {
        None
    };

    tracing::debug!(
        client_id = %client_id,
        grant_type = %grant_type,
        jti = %minted.jti,
        with_refresh,
        "Issued access token"
    );

    Ok(TokenResponse {
        access_token: minted.token,
        token_type: "bearer".to_owned(),
        expires_in: server.config.access_token_ttl.num_seconds(),
        scope: if scopes.is_empty() {
            None
        } else {
            Some(scopes.join(" "))
        },
        refresh_token,
    })
}
