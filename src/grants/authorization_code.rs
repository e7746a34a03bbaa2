// ABOUTME: Authorization code redemption with PKCE verification (RFC 6749 4.1, RFC 7636)
// ABOUTME: Codes are consumed atomically before PKCE so a failed verifier still burns the code
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::client_auth;
use crate::errors::OAuthError;
use crate::models::{AuthorizationCode, Client, GrantType, TokenRequest, TokenResponse};
use crate::server::AuthorizationServer;

pub(crate) async fn handle(
    server: &AuthorizationServer,
    request: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let client = super::load_client(server, &request.client_id).await?;
    super::require_grant_registered(&client, GrantType::AuthorizationCode)?;
    client_auth::authenticate(&client, request.client_secret.as_deref())?;

    let code = request
        .code
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("Missing authorization code"))?;
    let redirect_uri = request
        .redirect_uri
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("Missing redirect_uri"))?;

    // Atomic consumption validates expiry, client, and byte-exact redirect
    // URI, and marks the code used, in one step.
    let auth_code = server
        .auth_codes
        .consume_code(code, &client.client_id, redirect_uri, Utc::now())
        .await
        .map_err(|e| {
            tracing::error!(client_id = %client.client_id, error = %e, "Auth code consumption failed");
            OAuthError::server_error()
        })?
        .ok_or_else(|| {
            tracing::warn!(
                client_id = %client.client_id,
                "Authorization code rejected: not found, already used, expired, or mismatched"
            );
            OAuthError::invalid_grant("Invalid or expired authorization code")
        })?;

    verify_pkce(&client, &auth_code, request.code_verifier.as_deref())?;

    super::issue_tokens(
        server,
        &client.client_id,
        Some(&auth_code.subject_id),
        &auth_code.scopes,
        GrantType::AuthorizationCode,
        true,
        Utc::now(),
    )
    .await
}

/// Verify the PKCE code verifier against the challenge stored with the code.
///
/// Runs after consumption: a failed verifier must not leave the code
/// redeemable for another attempt.
fn verify_pkce(
    client: &Client,
    auth_code: &AuthorizationCode,
    code_verifier: Option<&str>,
) -> Result<(), OAuthError> {
    let Some(stored_challenge) = auth_code.code_challenge.as_deref() else {
        if code_verifier.is_some() {
            return Err(OAuthError::invalid_grant(
                "code_verifier provided but no code_challenge was issued",
            ));
        }
        if !client.confidential {
            // Authorize enforces this too; a code without a challenge for a
            // public client means stored state was tampered with.
            tracing::warn!(client_id = %client.client_id, "Public client code carries no PKCE challenge");
            return Err(OAuthError::invalid_grant("PKCE is required for public clients"));
        }
        return Ok(());
    };

    let verifier =
        code_verifier.ok_or_else(|| OAuthError::invalid_grant("code_verifier is required"))?;

    // RFC 7636 Section 4.1: 43-128 characters from the unreserved set
    if verifier.len() < 43 || verifier.len() > 128 {
        return Err(OAuthError::invalid_grant(
            "code_verifier must be between 43 and 128 characters",
        ));
    }
    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err(OAuthError::invalid_grant(
            "code_verifier contains invalid characters",
        ));
    }

    let method = auth_code.code_challenge_method.as_deref().unwrap_or("S256");
    if method != "S256" {
        return Err(OAuthError::invalid_grant(
            "Only the S256 code_challenge_method is supported",
        ));
    }

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let computed = general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());

    // constant-time comparison
    if computed.as_bytes().ct_eq(stored_challenge.as_bytes()).into() {
        tracing::debug!(client_id = %client.client_id, "PKCE verification successful");
        Ok(())
    } else {
        tracing::warn!(client_id = %client.client_id, "PKCE verification failed");
        Err(OAuthError::invalid_grant("Invalid code_verifier"))
    }
}
