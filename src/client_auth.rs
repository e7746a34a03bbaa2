// ABOUTME: Client authentication: Argon2 secret hashing and confidential/public checks
// ABOUTME: Confidential clients must present a valid secret; public clients must present none
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::errors::OAuthError;
use crate::models::Client;

/// Hash a client secret for storage using Argon2id.
///
/// # Errors
/// Returns an error if Argon2 hashing fails
pub fn hash_secret(secret: &str) -> Result<String, OAuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2.hash_password(secret.as_bytes(), &salt).map_err(|e| {
        tracing::error!(error = %e, "Argon2 secret hashing failed");
        OAuthError::server_error()
    })?;

    Ok(hash.to_string())
}

/// Verify a presented client secret against its stored Argon2 hash.
///
/// Argon2 verification is constant-time by construction, so a wrong secret
/// and a right secret take the same time to reject or accept.
///
/// # Errors
/// Returns `invalid_client` on any mismatch or on an unparseable stored hash
pub fn verify_secret(
    client_id: &str,
    presented: &str,
    secret_hash: &str,
) -> Result<(), OAuthError> {
    let parsed_hash = PasswordHash::new(secret_hash).map_err(|e| {
        tracing::error!(client_id = %client_id, error = %e, "Stored client secret hash is unparseable");
        OAuthError::invalid_client()
    })?;

    let argon2 = Argon2::default();
    if argon2
        .verify_password(presented.as_bytes(), &parsed_hash)
        .is_err()
    {
        tracing::warn!(client_id = %client_id, "Client secret validation failed");
        return Err(OAuthError::invalid_client());
    }

    Ok(())
}

/// Authenticate a client for a token-endpoint request.
///
/// Confidential clients must present their secret and it must verify.
/// Public clients must NOT present a secret; one showing up suggests a
/// misconfigured caller or credential leakage, and is rejected outright.
///
/// # Errors
/// Returns `invalid_client` on every failure mode, uniformly
pub fn authenticate(client: &Client, presented_secret: Option<&str>) -> Result<(), OAuthError> {
    if client.confidential {
        let secret_hash = client.secret_hash.as_deref().ok_or_else(|| {
            tracing::error!(client_id = %client.client_id, "Confidential client has no stored secret hash");
            OAuthError::invalid_client()
        })?;
        let presented = presented_secret.ok_or_else(|| {
            tracing::warn!(client_id = %client.client_id, "Confidential client sent no secret");
            OAuthError::invalid_client()
        })?;
        verify_secret(&client.client_id, presented, secret_hash)
    } else {
        if presented_secret.is_some() {
            tracing::warn!(client_id = %client.client_id, "Public client presented a secret");
            return Err(OAuthError::invalid_client());
        }
        Ok(())
    }
}
