// ABOUTME: Implicit grant (RFC 6749 Section 4.2): token delivered in the redirect fragment
// ABOUTME: Browser flow for legacy public clients; no client authentication, no refresh token
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};

use crate::errors::OAuthError;
use crate::models::GrantType;
use crate::server::AuthorizationServer;

/// Issue an access token for an approved implicit-flow request and build the
/// fragment-carrying redirect URL.
///
/// The fragment (not the query) carries the token so it never reaches the
/// redirect target's server logs.
pub(crate) async fn issue_redirect(
    server: &AuthorizationServer,
    client_id: &str,
    subject_id: &str,
    scopes: &[String],
    redirect_uri: &str,
    state: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, OAuthError> {
    let response = super::issue_tokens(
        server,
        client_id,
        Some(subject_id),
        scopes,
        GrantType::Implicit,
        false, // RFC 6749 Section 4.2.2: no refresh token in the implicit flow
        now,
    )
    .await?;

    let mut fragment = format!(
        "access_token={}&token_type={}&expires_in={}",
        urlencoding::encode(&response.access_token),
        response.token_type,
        response.expires_in,
    );
    if let Some(scope) = &response.scope {
        fragment.push_str("&scope=");
        fragment.push_str(&urlencoding::encode(scope));
    }
    if let Some(state) = state {
        fragment.push_str("&state=");
        fragment.push_str(&urlencoding::encode(state));
    }

    Ok(format!("{redirect_uri}#{fragment}"))
}
