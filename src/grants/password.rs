// ABOUTME: Resource owner password credentials grant (RFC 6749 Section 4.3)
// ABOUTME: Credential checking is delegated to the host application's SubjectVerifier
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
    super::require_grant_registered(&client, GrantType::Password)?;
    client_auth::authenticate(&client, request.client_secret.as_deref())?;

    let username = request
        .username
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("Missing username"))?;
    let password = request
        .password
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("Missing password"))?;

    let subject_id = server
        .subjects
        .verify(username, password)
        .await
        .map_err(|e| {
            tracing::error!(client_id = %client.client_id, error = %e, "Subject verifier failed");
            OAuthError::server_error()
        })?
        .ok_or_else(|| {
            // username never logged: it may itself be sensitive
            tracing::warn!(client_id = %client.client_id, "Resource owner credential check failed");
            OAuthError::invalid_grant("Invalid resource owner credentials")
        })?;

    let requested = super::parse_scope_param(request.scope.as_deref());
    let scopes = super::finalize_scopes(
        server,
        &client,
        &requested,
        GrantType::Password,
        Some(&subject_id),
    )
    .await?;

    super::issue_tokens(
        server,
        &client.client_id,
        Some(&subject_id),
        &scopes,
        GrantType::Password,
        true,
        Utc::now(),
    )
    .await
}
