use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::warn;

use atlas_types::models::{Identity, UserId};

use crate::auth::AppState;
use crate::error::{ApiError, AuthError};
use crate::policy::{self, Action, Resource};

/// Who is making the request, as far as the bearer header can tell.
///
/// Extraction never rejects: the outcome is only consulted when the policy
/// says the action needs an identity, so a stale or broken token does not
/// get in the way of public reads.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    Verified(Identity),
    Rejected(AuthError),
}

impl Caller {
    pub fn identity(&self) -> Result<&Identity, AuthError> {
        match self {
            Self::Verified(identity) => Ok(identity),
            Self::Anonymous => Err(AuthError::MissingToken),
            Self::Rejected(e) => Err(*e),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.identity().ok().map(|identity| identity.id)
    }

    /// Runs the request through the policy.
    ///
    /// Public actions are authorized without looking at the credential and
    /// yield `None`. Otherwise a missing or unverifiable token is a 401 and
    /// a verified identity the policy refuses is a 403.
    pub fn authorize(&self, action: Action, resource: &Resource) -> Result<Option<&Identity>, ApiError> {
        if policy::is_public(action, resource) {
            return Ok(None);
        }

        let identity = self.identity()?;
        if policy::allow(Some(identity), action, resource) {
            Ok(Some(identity))
        } else {
            warn!(
                "{} ({}, {}) denied {:?} on {:?}",
                identity.username, identity.id, identity.role, action, resource
            );
            Err(ApiError::Forbidden)
        }
    }

    /// Like [`authorize`](Self::authorize) for actions that always need an
    /// identity.
    pub fn require(&self, action: Action, resource: &Resource) -> Result<&Identity, ApiError> {
        self.authorize(action, resource)?
            .ok_or(ApiError::Unauthenticated(AuthError::MissingToken))
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await;

        let caller = match header {
            Ok(TypedHeader(Authorization(bearer))) => match state.verify_token(bearer.token()) {
                Ok(identity) => Self::Verified(identity),
                Err(e) => Self::Rejected(e),
            },
            Err(rejection) if rejection.is_missing() => Self::Anonymous,
            // Present but not a bearer credential
            Err(_) => Self::Rejected(AuthError::MissingToken),
        };

        Ok(caller)
    }
}
