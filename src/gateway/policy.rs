/// Access decision for a matched route
///
/// Pure function of the route, the request line and the `Authorization`
/// header. The guard middleware turns the decision into a response.

use std::sync::Arc;

use actix_web::http::Method;

use crate::auth::{Claims, TokenVerifier};
use crate::error::{AppError, AuthError, TokenError};
use crate::gateway::route::RouteEntry;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthFailure {
    MissingToken,
    InvalidToken(TokenError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    /// Matched a public rule; no token inspected
    Public,
    Authenticated(Claims),
    Unauthenticated(AuthFailure),
    Forbidden {
        subject: String,
        required_scope: String,
    },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Public | AccessDecision::Authenticated(_))
    }

    /// The error to respond with, if the request is refused
    pub fn into_error(self) -> Option<AppError> {
        match self {
            AccessDecision::Public | AccessDecision::Authenticated(_) => None,
            AccessDecision::Unauthenticated(AuthFailure::MissingToken) => {
                Some(AuthError::MissingToken.into())
            }
            AccessDecision::Unauthenticated(AuthFailure::InvalidToken(e)) => Some(e.into()),
            AccessDecision::Forbidden { required_scope, .. } => {
                Some(AuthError::Forbidden(required_scope).into())
            }
        }
    }
}

pub struct AccessPolicy {
    verifier: Arc<TokenVerifier>,
}

impl AccessPolicy {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    pub fn decide(
        &self,
        route: &RouteEntry,
        method: &Method,
        path: &str,
        authorization: Option<&str>,
    ) -> AccessDecision {
        if route.is_public(method, path) {
            return AccessDecision::Public;
        }

        let header = match authorization {
            Some(header) => header,
            None => return AccessDecision::Unauthenticated(AuthFailure::MissingToken),
        };

        let token = match bearer_token(header) {
            Some(token) => token,
            None => {
                return AccessDecision::Unauthenticated(AuthFailure::InvalidToken(
                    TokenError::Malformed,
                ))
            }
        };

        let claims = match self.verifier.verify(token) {
            Ok(claims) => claims,
            Err(e) => return AccessDecision::Unauthenticated(AuthFailure::InvalidToken(e)),
        };

        if let Some(required_scope) = &route.required_scope {
            if !claims.has_scope(required_scope) {
                return AccessDecision::Forbidden {
                    subject: claims.sub,
                    required_scope: required_scope.clone(),
                };
            }
        }

        AccessDecision::Authenticated(claims)
    }
}

/// `Bearer <token>`, scheme matched case-insensitively
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
