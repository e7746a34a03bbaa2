// ABOUTME: Refresh token grant with rotation (RFC 6749 Section 6)
// ABOUTME: Replay of a rotated token defensively revokes the whole token family
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::Utc;

use crate::client_auth;
use crate::errors::OAuthError;
use crate::models::{GrantType, TokenRequest, TokenResponse};
use crate::server::AuthorizationServer;

pub(crate) async fn handle(
    server: &AuthorizationServer,
    request: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let client = super::load_client(server, &request.client_id).await?;
    super::require_grant_registered(&client, GrantType::RefreshToken)?;
    client_auth::authenticate(&client, request.client_secret.as_deref())?;

    let token_value = request
        .refresh_token
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("Missing refresh_token"))?;

    let now = Utc::now();
    let consumed = server
        .refresh_tokens
        .consume_token(token_value, &client.client_id, now)
        .await
        .map_err(|e| {
            tracing::error!(client_id = %client.client_id, error = %e, "Refresh token consumption failed");
            OAuthError::server_error()
        })?;

    let Some(old_token) = consumed else {
        handle_rejected_token(server, &client.client_id, token_value).await;
        return Err(OAuthError::invalid_grant("Invalid or expired refresh token"));
    };

    // Rotation: the old pair dies together before the new one is issued
    server
        .access_tokens
        .revoke_token(&old_token.access_token_jti)
        .await
        .map_err(|e| {
            tracing::error!(client_id = %client.client_id, error = %e, "Failed to revoke rotated access token");
            OAuthError::server_error()
        })?;

    tracing::debug!(
        client_id = %client.client_id,
        subject_id = ?old_token.subject_id,
        "Refresh token rotated"
    );

    super::issue_tokens(
        server,
        &client.client_id,
        old_token.subject_id.as_deref(),
        &old_token.scopes,
        GrantType::RefreshToken,
        true,
        now,
    )
    .await
}

/// Distinguish replay of a rotated token from a plain bad token.
///
/// A token that exists but is already revoked for the same client means the
/// rotation chain leaked: burn every refresh token in that client+subject
/// family. Lookup failures are swallowed; the caller already rejects the
/// request either way.
async fn handle_rejected_token(server: &AuthorizationServer, client_id: &str, token_value: &str) {
    let looked_up = match server.refresh_tokens.get_token(token_value).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(client_id = %client_id, error = %e, "Refresh token lookup failed");
            return;
        }
    };

    if let Some(existing) = looked_up {
        if existing.revoked && existing.client_id == client_id {
            tracing::warn!(
                client_id = %client_id,
                subject_id = ?existing.subject_id,
                "Rotated refresh token replayed; revoking token family"
            );
            if let Err(e) = server
                .refresh_tokens
                .revoke_family(client_id, existing.subject_id.as_deref())
                .await
            {
                tracing::error!(client_id = %client_id, error = %e, "Family revocation failed");
            }
        }
    }
}
