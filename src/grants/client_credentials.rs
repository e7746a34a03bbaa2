// ABOUTME: Client credentials grant: machine-to-machine tokens, no resource owner
// ABOUTME: Confidential clients only; never issues a refresh token
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
    super::require_grant_registered(&client, GrantType::ClientCredentials)?;

    // RFC 6749 Section 4.4: only confidential clients may use this grant
    if !client.confidential {
        tracing::warn!(client_id = %client.client_id, "Public client attempted client_credentials");
        return Err(OAuthError::unauthorized_client(
            "The client_credentials grant requires a confidential client",
        ));
    }
    client_auth::authenticate(&client, request.client_secret.as_deref())?;

    let requested = super::parse_scope_param(request.scope.as_deref());
    let scopes = super::finalize_scopes(
        server,
        &client,
        &requested,
        GrantType::ClientCredentials,
        None,
    )
    .await?;

    super::issue_tokens(
        server,
        &client.client_id,
        None,
        &scopes,
        GrantType::ClientCredentials,
        false, // no refresh token: the client can always re-authenticate
        Utc::now(),
    )
    .await
}
