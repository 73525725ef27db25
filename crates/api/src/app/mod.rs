//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: `RbacError` to HTTP status + structured denial body

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use bizhub_infra::{RbacServices, RbacStore};

use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router over an already-wired service bundle.
pub fn build_app<S: RbacStore>(services: RbacServices<S>) -> Router {
    let auth_state = AuthState {
        principals: services.principals().clone(),
    };

    let api = routes::router::<S>()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware::<S>,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(api)
        .layer(ServiceBuilder::new())
}
