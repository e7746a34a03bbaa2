// ABOUTME: Server configuration loaded from environment variables with validated defaults
// ABOUTME: TTLs, enabled grants, signing key, issuer, and the default gate policy
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::{bail, Context, Result};
use chrono::Duration;
use std::collections::HashSet;
use std::env;

use crate::models::GrantType;

/// Default access token lifetime: one hour
const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;
/// Default refresh token lifetime: thirty days
const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;
/// Default authorization code lifetime: ten minutes
const DEFAULT_AUTH_CODE_TTL_SECS: i64 = 600;
/// Minimum signing key length in bytes (256 bits for HS256)
const MIN_SIGNING_KEY_BYTES: usize = 32;
/// Gate policy applied to protected routes that declare no expressions
const DEFAULT_GATE_POLICY: &str = "oauth.authorized == true";

/// Authorization server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Grant types this deployment will serve
    pub enabled_grants: HashSet<GrantType>,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Authorization code lifetime
    pub auth_code_ttl: Duration,
    /// HS256 signing key material
    pub signing_key: Vec<u8>,
    /// Issuer string stamped into token claims
    pub issuer: String,
    /// Default gate policy expression
    pub default_policy: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// `GRANTGATE_SIGNING_KEY` is required and must be at least 32 bytes.
    /// Everything else has a default:
    /// - `GRANTGATE_ENABLED_GRANTS`: comma list, default
    ///   `authorization_code,client_credentials,password,refresh_token`
    /// - `GRANTGATE_IMPLICIT_ENABLED`: default `false`; when `true` the
    ///   implicit flow is added to the enabled set
    /// - `GRANTGATE_ACCESS_TOKEN_TTL_SECS` (3600),
    ///   `GRANTGATE_REFRESH_TOKEN_TTL_SECS` (2592000),
    ///   `GRANTGATE_AUTH_CODE_TTL_SECS` (600)
    /// - `GRANTGATE_ISSUER` (`grantgate`)
    /// - `GRANTGATE_DEFAULT_POLICY` (`oauth.authorized == true`)
    ///
    /// # Errors
    /// Returns an error if the signing key is missing or too short, a grant
    /// name is unknown, or a TTL is not a positive integer
    pub fn from_env() -> Result<Self> {
        let signing_key = env::var("GRANTGATE_SIGNING_KEY")
            .context("GRANTGATE_SIGNING_KEY must be set")?
            .into_bytes();

        let enabled_grants = Self::parse_enabled_grants(
            &env::var("GRANTGATE_ENABLED_GRANTS").unwrap_or_else(|_| {
                "authorization_code,client_credentials,password,refresh_token".to_owned()
            }),
            Self::env_flag("GRANTGATE_IMPLICIT_ENABLED"),
        )?;

        let config = Self {
            enabled_grants,
            access_token_ttl: Duration::seconds(Self::env_ttl(
                "GRANTGATE_ACCESS_TOKEN_TTL_SECS",
                DEFAULT_ACCESS_TOKEN_TTL_SECS,
            )?),
            refresh_token_ttl: Duration::seconds(Self::env_ttl(
                "GRANTGATE_REFRESH_TOKEN_TTL_SECS",
                DEFAULT_REFRESH_TOKEN_TTL_SECS,
            )?),
            auth_code_ttl: Duration::seconds(Self::env_ttl(
                "GRANTGATE_AUTH_CODE_TTL_SECS",
                DEFAULT_AUTH_CODE_TTL_SECS,
            )?),
            signing_key,
            issuer: env::var("GRANTGATE_ISSUER").unwrap_or_else(|_| "grantgate".to_owned()),
            default_policy: env::var("GRANTGATE_DEFAULT_POLICY")
                .unwrap_or_else(|_| DEFAULT_GATE_POLICY.to_owned()),
        };

        config.validate()?;

        tracing::info!(
            enabled_grants = ?config.enabled_grants,
            access_token_ttl_secs = config.access_token_ttl.num_seconds(),
            refresh_token_ttl_secs = config.refresh_token_ttl.num_seconds(),
            auth_code_ttl_secs = config.auth_code_ttl.num_seconds(),
            issuer = %config.issuer,
            "Authorization server configuration loaded"
        );

        Ok(config)
    }

    /// Fixed configuration for tests: all grants enabled, default TTLs.
    #[must_use]
    pub fn for_testing() -> Self {
        let mut enabled_grants: HashSet<GrantType> = [
            GrantType::AuthorizationCode,
            GrantType::ClientCredentials,
            GrantType::Password,
            GrantType::RefreshToken,
        ]
        .into_iter()
        .collect();
        enabled_grants.insert(GrantType::Implicit);

        Self {
            enabled_grants,
            access_token_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            auth_code_ttl: Duration::seconds(DEFAULT_AUTH_CODE_TTL_SECS),
            signing_key: b"test-only-signing-key-0123456789abcdef".to_vec(),
            issuer: "grantgate-test".to_owned(),
            default_policy: DEFAULT_GATE_POLICY.to_owned(),
        }
    }

    /// Whether a grant type is enabled in this deployment
    #[must_use]
    pub fn grant_enabled(&self, grant_type: GrantType) -> bool {
        self.enabled_grants.contains(&grant_type)
    }

    fn parse_enabled_grants(
        list: &str,
        implicit_enabled: bool,
    ) -> Result<HashSet<GrantType>> {
        let mut grants = HashSet::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some(grant) = GrantType::from_wire(name) else {
                bail!("Unknown grant type in GRANTGATE_ENABLED_GRANTS: {name}");
            };
            grants.insert(grant);
        }
        if implicit_enabled {
            grants.insert(GrantType::Implicit);
        }
        Ok(grants)
    }

    fn env_flag(name: &str) -> bool {
        env::var(name)
            .ok()
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                v == "true" || v == "1" || v == "yes"
            })
            .unwrap_or(false)
    }

    fn env_ttl(name: &str, default: i64) -> Result<i64> {
        match env::var(name) {
            Ok(value) => {
                let secs: i64 = value
                    .parse()
                    .with_context(|| format!("{name} must be an integer number of seconds"))?;
                if secs <= 0 {
                    bail!("{name} must be positive, got {secs}");
                }
                Ok(secs)
            }
            Err(_) => Ok(default),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.signing_key.len() < MIN_SIGNING_KEY_BYTES {
            bail!(
                "GRANTGATE_SIGNING_KEY must be at least {MIN_SIGNING_KEY_BYTES} bytes, got {}",
                self.signing_key.len()
            );
        }
        if self.enabled_grants.is_empty() {
            bail!("GRANTGATE_ENABLED_GRANTS must enable at least one grant type");
        }
        Ok(())
    }
}
