// ABOUTME: Token codec: JWT access token mint/verify plus CSPRNG opaque identifiers
// ABOUTME: HS256 over configured key material; expiry is checked manually for typed errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::models::GrantType;

/// Claims carried by every access token this server mints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the resource owner, or `client:{client_id}` for machine tokens
    pub sub: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes, space-delimited
    pub scope: String,
    /// Grant type that produced the token
    pub grant: String,
    /// Issuer string from server configuration
    pub iss: String,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Token identifier, also the revocation-store key
    pub jti: String,
}

impl TokenClaims {
    /// Granted scopes as a list
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .split_whitespace()
            .map(std::string::ToString::to_string)
            .collect()
    }

    /// Resource owner id, `None` for client-credentials tokens
    #[must_use]
    pub fn subject_id(&self) -> Option<&str> {
        if self.sub.starts_with("client:") {
            None
        } else {
            Some(&self.sub)
        }
    }
}

/// Typed JWT validation failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenValidationError {
    /// Token signature verified but the token is past its expiry
    #[error("Token expired at {expired_at}")]
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
    },
    /// Token failed signature or algorithm validation
    #[error("Token invalid: {reason}")]
    TokenInvalid {
        /// What check failed
        reason: String,
    },
    /// Token could not be parsed at all
    #[error("Token malformed: {details}")]
    TokenMalformed {
        /// Parse failure detail
        details: String,
    },
}

/// Parameters for minting an access token.
#[derive(Debug)]
pub struct MintParams<'a> {
    /// Client the token is issued to
    pub client_id: &'a str,
    /// Resource owner, `None` for client-credentials tokens
    pub subject_id: Option<&'a str>,
    /// Finalized scopes
    pub scopes: &'a [String],
    /// Grant type producing the token
    pub grant_type: GrantType,
    /// Token lifetime
    pub ttl: Duration,
}

/// A freshly minted access token with its bookkeeping handles.
#[derive(Debug)]
pub struct MintedToken {
    /// The signed JWT
    pub token: String,
    /// The token identifier (`jti` claim), used as the revocation key
    pub jti: String,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies access tokens with a single symmetric key.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenCodec {
    /// Create a codec over the configured signing key
    #[must_use]
    pub fn new(signing_key: &[u8], issuer: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            issuer: issuer.to_owned(),
        }
    }

    /// Mint a signed access token.
    ///
    /// The `sub` claim carries the resource owner id, or `client:{client_id}`
    /// when the grant has no resource owner.
    ///
    /// # Errors
    /// Returns an error if the RNG or JWT encoding fails
    pub fn mint(&self, params: &MintParams<'_>, now: DateTime<Utc>) -> Result<MintedToken> {
        let jti = generate_opaque()?;
        let expires_at = now + params.ttl;

        let sub = params.subject_id.map_or_else(
            || format!("client:{}", params.client_id),
            std::string::ToString::to_string,
        );

        let claims = TokenClaims {
            sub,
            client_id: params.client_id.to_owned(),
            scope: params.scopes.join(" "),
            grant: params.grant_type.as_str().to_owned(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: jti.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(MintedToken {
            token,
            jti,
            expires_at,
        })
    }

    /// Verify a token's signature and expiry, returning its claims.
    ///
    /// Expiry is checked manually after signature validation so an expired
    /// token is reported as `TokenExpired` rather than a generic failure.
    ///
    /// # Errors
    /// Returns the typed validation failure: expired, invalid, or malformed
    pub fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);

        let token_data =
            decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidAlgorithm
                    | ErrorKind::InvalidIssuer
                    | ErrorKind::ImmatureSignature => TokenValidationError::TokenInvalid {
                        reason: e.to_string(),
                    },
                    _ => TokenValidationError::TokenMalformed {
                        details: e.to_string(),
                    },
                }
            })?;

        let claims = token_data.claims;
        if claims.exp <= now.timestamp() {
            let expired_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or(now);
            return Err(TokenValidationError::TokenExpired { expired_at });
        }

        Ok(claims)
    }
}

/// Generate an opaque identifier: 32 bytes (256 bits) from the system CSPRNG,
/// URL-safe base64 without padding. Used for authorization codes, refresh
/// tokens, and `jti` values.
///
/// # Errors
/// Returns an error if the system RNG fails; the server cannot operate
/// securely without a working RNG
pub fn generate_opaque() -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!("CRITICAL: SystemRandom failed - cannot generate secure random bytes: {e:?}");
        anyhow!("System RNG failure")
    })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}
