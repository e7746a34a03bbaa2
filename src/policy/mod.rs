// ABOUTME: Request authorization gate: evaluates route policies over per-request facts
// ABOUTME: Pass-through without route config; expressions AND together and fail closed
//
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod expr;

use crate::errors::OAuthError;
use crate::token::TokenClaims;

/// Authorization metadata attached to a route by the host application.
///
/// Attaching this marks the route as protected. With no expressions the
/// gate's configured default policy applies; with expressions, all of them
/// must hold.
#[derive(Debug, Clone, Default)]
pub struct RouteAuthorization {
    /// Policy expressions, evaluated in declared order and ANDed
    pub expressions: Vec<String>,
}

impl RouteAuthorization {
    /// Protected route falling back to the default policy
    #[must_use]
    pub fn protected() -> Self {
        Self::default()
    }

    /// Protected route with explicit policy expressions
    #[must_use]
    pub fn with_expressions<I, S>(expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expressions: expressions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Facts about the current subject (the host application's logged-in user).
#[derive(Debug, Clone, Default)]
pub struct SubjectFacts {
    /// Whether a subject is logged in at all
    pub logged_in: bool,
    /// Subject identifier, when logged in
    pub id: Option<String>,
    /// Group memberships
    pub groups: Vec<String>,
}

/// Facts derived from OAuth token validation for this request.
#[derive(Debug, Clone, Default)]
pub struct OAuthFacts {
    /// Whether a valid, unrevoked access token was presented
    pub authorized: bool,
    /// Grant type that produced the token
    pub grant: Option<String>,
    /// Scopes granted to the token
    pub scopes: Vec<String>,
}

/// The complete fact sheet a policy expression can read. Built fresh per
/// request; nothing else is visible to the expression language.
#[derive(Debug, Clone, Default)]
pub struct RequestFacts {
    /// Subject facts from the host's session layer
    pub subject: SubjectFacts,
    /// OAuth facts from token validation
    pub oauth: OAuthFacts,
}

impl RequestFacts {
    /// Facts for a request with no session and no token
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Facts for a request bearing a validated access token.
    ///
    /// Claims must come from
    /// [`validate_access_token`](crate::server::AuthorizationServer::validate_access_token);
    /// the gate does not re-verify them.
    #[must_use]
    pub fn from_validated_claims(claims: &TokenClaims) -> Self {
        Self {
            subject: SubjectFacts {
                logged_in: claims.subject_id().is_some(),
                id: claims.subject_id().map(std::string::ToString::to_string),
                groups: Vec::new(),
            },
            oauth: OAuthFacts {
                authorized: true,
                grant: Some(claims.grant.clone()),
                scopes: claims.scopes(),
            },
        }
    }
}

/// Gate decision for one request.
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// No route authorization attached; the gate does not apply
    PassThrough,
    /// Every policy expression held
    Allow,
    /// A policy expression was falsy or failed to evaluate
    Deny(OAuthError),
}

impl GateDecision {
    /// Whether the request may proceed (allow or pass-through)
    #[must_use]
    pub const fn permits(&self) -> bool {
        matches!(self, Self::PassThrough | Self::Allow)
    }
}

/// Evaluates route authorization policies against per-request facts.
pub struct Gate {
    default_policy: String,
}

impl Gate {
    /// Create a gate with the configured default policy expression
    #[must_use]
    pub fn new(default_policy: impl Into<String>) -> Self {
        Self {
            default_policy: default_policy.into(),
        }
    }

    /// Check a request against its route's authorization config.
    ///
    /// `None` means the route is not marked protected: pass-through. A
    /// protected route with no expressions uses the default policy.
    /// Expressions are evaluated in declared order, ANDed, and short-circuit
    /// on the first falsy or erroring one. Evaluation errors deny, never
    /// pass through.
    #[must_use]
    pub fn check(&self, route: Option<&RouteAuthorization>, facts: &RequestFacts) -> GateDecision {
        let Some(route) = route else {
            return GateDecision::PassThrough;
        };

        let default_expressions;
        let expressions: &[String] = if route.expressions.is_empty() {
            default_expressions = [self.default_policy.clone()];
            &default_expressions
        } else {
            &route.expressions
        };

        for expression in expressions {
            match expr::evaluate(expression, facts) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(expression = %expression, "Policy expression denied request");
                    return GateDecision::Deny(OAuthError::access_denied(
                        "Request does not satisfy the route's authorization policy",
                    ));
                }
                Err(e) => {
                    tracing::warn!(expression = %expression, error = %e, "Policy expression failed to evaluate");
                    return GateDecision::Deny(OAuthError::access_denied(
                        "Request does not satisfy the route's authorization policy",
                    ));
                }
            }
        }

        GateDecision::Allow
    }
}
