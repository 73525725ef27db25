use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use bizhub_auth::RbacError;
use bizhub_infra::{PrincipalResolver, RbacStore};

use crate::app::errors::ApiError;
use crate::context::Caller;

pub struct AuthState<S> {
    pub principals: PrincipalResolver<S>,
}

impl<S> Clone for AuthState<S> {
    fn clone(&self) -> Self {
        Self {
            principals: self.principals.clone(),
        }
    }
}

/// Resolve the bearer credential, if any, and attach a [`Caller`].
///
/// A missing header yields an anonymous caller; a header that fails
/// verification is rejected here with 401.
pub async fn auth_middleware<S: RbacStore>(
    State(state): State<AuthState<S>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let caller = match extract_bearer(req.headers()) {
        Ok(None) => Caller::anonymous(),
        Ok(Some(token)) => match state.principals.resolve(token).await {
            Ok(principal) => Caller::authenticated(principal),
            Err(err) => {
                debug!(error = %err, "bearer credential rejected");
                return ApiError::from(RbacError::from(err)).into_response();
            }
        },
        Err(err) => return ApiError::from(err).into_response(),
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, RbacError> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header.to_str().map_err(|_| RbacError::InvalidCredential)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(RbacError::InvalidCredential)?
        .trim();
    if token.is_empty() {
        return Err(RbacError::InvalidCredential);
    }

    Ok(Some(token))
}
