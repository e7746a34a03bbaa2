// ABOUTME: OAuth 2.0 error taxonomy with RFC 6749 wire shape and HTTP status mapping
// ABOUTME: Every failure surfaced by the engine is one of these; internal detail never leaks
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// RFC 6749 error codes emitted by the token and authorization endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request is missing a parameter or is otherwise malformed
    InvalidRequest,
    /// Client authentication failed
    InvalidClient,
    /// The grant (code, refresh token, credentials) is invalid, expired, or revoked
    InvalidGrant,
    /// The client is not registered for the requested grant or response type
    UnauthorizedClient,
    /// The grant type is unknown or not enabled on this server
    UnsupportedGrantType,
    /// The requested scope is invalid or exceeds what the client may request
    InvalidScope,
    /// The resource owner or the authorization policy denied the request
    AccessDenied,
    /// An internal failure; no detail is exposed on the wire
    ServerError,
}

impl ErrorKind {
    /// Wire identifier for the error code (RFC 6749 Section 5.2)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::AccessDenied => "access_denied",
            Self::ServerError => "server_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth 2.0 error response, serializable to the RFC 6749 JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{error}: {}", error_description.as_deref().unwrap_or("no description"))]
pub struct OAuthError {
    /// Error code
    pub error: ErrorKind,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI for error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuthError {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: ErrorKind::InvalidRequest,
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_client` error
    ///
    /// The description is deliberately uniform: callers must not reveal whether
    /// the client exists, is expired, or presented a wrong secret.
    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: ErrorKind::InvalidClient,
            error_description: Some("Client authentication failed".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: ErrorKind::InvalidGrant,
            error_description: Some(description.to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unauthorized_client` error
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self {
            error: ErrorKind::UnauthorizedClient,
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: ErrorKind::UnsupportedGrantType,
            error_description: Some("Grant type not supported".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: ErrorKind::InvalidScope,
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `access_denied` error
    #[must_use]
    pub fn access_denied(description: &str) -> Self {
        Self {
            error: ErrorKind::AccessDenied,
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create a `server_error` error, hiding the internal cause from the wire
    #[must_use]
    pub fn server_error() -> Self {
        Self {
            error: ErrorKind::ServerError,
            error_description: Some("Internal server error".to_owned()),
            error_uri: None,
        }
    }

    /// HTTP status for this error per RFC 6749 Section 5.2
    #[must_use]
    pub fn http_status(&self) -> http::StatusCode {
        match self.error {
            ErrorKind::InvalidClient => http::StatusCode::UNAUTHORIZED,
            ErrorKind::AccessDenied => http::StatusCode::FORBIDDEN,
            ErrorKind::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
            _ => http::StatusCode::BAD_REQUEST,
        }
    }
}
