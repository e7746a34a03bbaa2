// ABOUTME: Integration tests for the authorize endpoint, code redemption, PKCE, and implicit flow
// ABOUTME: Covers single-use codes, redirect URI binding, consent denial, and fragment tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{
    pkce_pair, register_confidential_client, register_public_client, test_server, token_request,
    REDIRECT_URI,
};
use grantgate::{
    AuthorizeOutcome, AuthorizeRequest, ConsentDecision, ErrorKind, GrantType, TokenRequest,
};
use url::Url;

fn authorize_request(client_id: &str, challenge: Option<&str>) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_owned(),
        client_id: client_id.to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        scope: Some("read".to_owned()),
        state: Some("xyz-state".to_owned()),
        code_challenge: challenge.map(str::to_owned),
        code_challenge_method: challenge.map(|_| "S256".to_owned()),
    }
}

fn approved() -> ConsentDecision {
    ConsentDecision::Approved {
        subject_id: "user-1".to_owned(),
    }
}

/// Extract a query parameter from a redirect location
fn query_param(location: &str, name: &str) -> Option<String> {
    let url = Url::parse(location).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn redemption(client_id: &str, code: &str, verifier: Option<&str>) -> TokenRequest {
    let mut request = token_request("authorization_code", client_id, None);
    request.code = Some(code.to_owned());
    request.redirect_uri = Some(REDIRECT_URI.to_owned());
    request.code_verifier = verifier.map(str::to_owned);
    request
}

// =============================================================================
// Authorization Code Flow (public client + PKCE)
// =============================================================================

#[tokio::test]
async fn full_code_flow_with_pkce() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec!["read"]).await;
    let (verifier, challenge) = pkce_pair();

    let outcome = server
        .authorize(authorize_request("spa", Some(&challenge)), approved())
        .await;
    let AuthorizeOutcome::Redirect { location } = outcome else {
        panic!("expected redirect, got {outcome:?}");
    };

    assert!(location.starts_with(REDIRECT_URI));
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz-state"));
    let code = query_param(&location, "code").unwrap();

    let response = server
        .token(redemption("spa", &code, Some(&verifier)))
        .await
        .unwrap();
    assert!(response.refresh_token.is_some());
    assert_eq!(response.scope.as_deref(), Some("read"));

    let claims = server
        .validate_access_token(&response.access_token)
        .await
        .unwrap();
    assert_eq!(claims.sub, "user-1");
    assert_eq!(claims.grant, "authorization_code");
}

#[tokio::test]
async fn authorization_code_is_single_use() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec![]).await;
    let (verifier, challenge) = pkce_pair();

    let AuthorizeOutcome::Redirect { location } = server
        .authorize(authorize_request("spa", Some(&challenge)), approved())
        .await
    else {
        panic!("expected redirect");
    };
    let code = query_param(&location, "code").unwrap();

    server
        .token(redemption("spa", &code, Some(&verifier)))
        .await
        .unwrap();

    let err = server
        .token(redemption("spa", &code, Some(&verifier)))
        .await
        .unwrap_err();
    assert_eq!(err.error, ErrorKind::InvalidGrant);
}

#[tokio::test]
async fn wrong_pkce_verifier_burns_the_code() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec![]).await;
    let (verifier, challenge) = pkce_pair();

    let AuthorizeOutcome::Redirect { location } = server
        .authorize(authorize_request("spa", Some(&challenge)), approved())
        .await
    else {
        panic!("expected redirect");
    };
    let code = query_param(&location, "code").unwrap();

    let wrong = "f".repeat(43);
    let err = server
        .token(redemption("spa", &code, Some(&wrong)))
        .await
        .unwrap_err();
    assert_eq!(err.error, ErrorKind::InvalidGrant);

    // the failed attempt consumed the code: the right verifier is too late
    let err = server
        .token(redemption("spa", &code, Some(&verifier)))
        .await
        .unwrap_err();
    assert_eq!(err.error, ErrorKind::InvalidGrant);
}

#[tokio::test]
async fn public_client_must_send_code_challenge() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec![]).await;

    let outcome = server.authorize(authorize_request("spa", None), approved()).await;
    let AuthorizeOutcome::Redirect { location } = outcome else {
        panic!("expected error redirect");
    };
    assert_eq!(
        query_param(&location, "error").as_deref(),
        Some("invalid_request")
    );
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz-state"));
}

#[tokio::test]
async fn plain_challenge_method_is_rejected() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec![]).await;
    let (_, challenge) = pkce_pair();

    let mut request = authorize_request("spa", Some(&challenge));
    request.code_challenge_method = Some("plain".to_owned());

    let AuthorizeOutcome::Redirect { location } = server.authorize(request, approved()).await
    else {
        panic!("expected error redirect");
    };
    assert_eq!(
        query_param(&location, "error").as_deref(),
        Some("invalid_request")
    );
}

// =============================================================================
// Redirect URI binding
// =============================================================================

#[tokio::test]
async fn unregistered_redirect_uri_is_a_direct_error() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec![]).await;
    let (_, challenge) = pkce_pair();

    let mut request = authorize_request("spa", Some(&challenge));
    request.redirect_uri = "https://evil.example/cb".to_owned();

    let outcome = server.authorize(request, approved()).await;
    let AuthorizeOutcome::Error(err) = outcome else {
        panic!("must not redirect to an unvalidated URI, got {outcome:?}");
    };
    assert_eq!(err.error, ErrorKind::InvalidRequest);
}

#[tokio::test]
async fn redemption_requires_byte_exact_redirect_uri() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec![]).await;
    let (verifier, challenge) = pkce_pair();

    let AuthorizeOutcome::Redirect { location } = server
        .authorize(authorize_request("spa", Some(&challenge)), approved())
        .await
    else {
        panic!("expected redirect");
    };
    let code = query_param(&location, "code").unwrap();

    let mut request = redemption("spa", &code, Some(&verifier));
    // trailing slash: not byte-exact
    request.redirect_uri = Some(format!("{REDIRECT_URI}/"));
    let err = server.token(request).await.unwrap_err();
    assert_eq!(err.error, ErrorKind::InvalidGrant);
}

// =============================================================================
// Consent
// =============================================================================

#[tokio::test]
async fn denied_consent_redirects_with_access_denied() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec![]).await;
    let (_, challenge) = pkce_pair();

    let AuthorizeOutcome::Redirect { location } = server
        .authorize(authorize_request("spa", Some(&challenge)), ConsentDecision::Denied)
        .await
    else {
        panic!("expected error redirect");
    };
    assert_eq!(
        query_param(&location, "error").as_deref(),
        Some("access_denied")
    );
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz-state"));
    assert!(query_param(&location, "code").is_none());
}

// =============================================================================
// Confidential clients on the code flow
// =============================================================================

#[tokio::test]
async fn confidential_client_redeems_with_secret_and_no_pkce() {
    let (store, _, server) = test_server();
    register_confidential_client(
        &store,
        "webapp",
        "web-secret",
        vec![GrantType::AuthorizationCode],
        vec!["read"],
    )
    .await;

    let AuthorizeOutcome::Redirect { location } = server
        .authorize(authorize_request("webapp", None), approved())
        .await
    else {
        panic!("expected redirect");
    };
    let code = query_param(&location, "code").unwrap();

    let mut request = redemption("webapp", &code, None);
    request.client_secret = Some("web-secret".to_owned());
    let response = server.token(request).await.unwrap();
    assert!(response.refresh_token.is_some());
}

// =============================================================================
// Implicit Flow
// =============================================================================

#[tokio::test]
async fn implicit_flow_returns_token_in_fragment() {
    let (store, _, server) = test_server();
    register_public_client(&store, "legacy-spa", vec![GrantType::Implicit], vec!["read"]).await;

    let request = AuthorizeRequest {
        response_type: "token".to_owned(),
        client_id: "legacy-spa".to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        scope: Some("read".to_owned()),
        state: Some("imp-state".to_owned()),
        code_challenge: None,
        code_challenge_method: None,
    };

    let AuthorizeOutcome::Redirect { location } = server.authorize(request, approved()).await
    else {
        panic!("expected redirect");
    };

    let (base, fragment) = location.split_once('#').unwrap();
    assert_eq!(base, REDIRECT_URI);
    assert!(fragment.contains("access_token="));
    assert!(fragment.contains("token_type=bearer"));
    assert!(fragment.contains("expires_in=3600"));
    assert!(fragment.contains("state=imp-state"));
    // no refresh token in the implicit flow, ever
    assert!(!fragment.contains("refresh_token"));

    let token = fragment
        .split('&')
        .find_map(|pair| pair.strip_prefix("access_token="))
        .unwrap();
    let token = urlencoding::decode(token).unwrap();
    let claims = server.validate_access_token(&token).await.unwrap();
    assert_eq!(claims.grant, "implicit");
    assert_eq!(claims.sub, "user-1");
}

#[tokio::test]
async fn implicit_errors_travel_in_the_fragment() {
    let (store, _, server) = test_server();
    register_public_client(&store, "legacy-spa", vec![GrantType::Implicit], vec![]).await;

    let request = AuthorizeRequest {
        response_type: "token".to_owned(),
        client_id: "legacy-spa".to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        scope: None,
        state: None,
        code_challenge: None,
        code_challenge_method: None,
    };

    let AuthorizeOutcome::Redirect { location } =
        server.authorize(request, ConsentDecision::Denied).await
    else {
        panic!("expected error redirect");
    };
    let (_, fragment) = location.split_once('#').unwrap();
    assert!(fragment.contains("error=access_denied"));
}

#[tokio::test]
async fn unknown_response_type_redirects_with_invalid_request() {
    let (store, _, server) = test_server();
    register_public_client(&store, "spa", vec![GrantType::AuthorizationCode], vec![]).await;

    let mut request = authorize_request("spa", None);
    request.response_type = "id_token".to_owned();

    let AuthorizeOutcome::Redirect { location } = server.authorize(request, approved()).await
    else {
        panic!("expected error redirect");
    };
    assert_eq!(
        query_param(&location, "error").as_deref(),
        Some("invalid_request")
    );
}
