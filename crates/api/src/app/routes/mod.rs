use axum::{routing::get, Router};

use bizhub_infra::RbacStore;

pub mod rbac;
pub mod system;
pub mod users;

/// Router for every endpoint behind the bearer middleware.
pub fn router<S: RbacStore>() -> Router {
    Router::new()
        .route("/me", get(system::me::<S>))
        .route("/me/permissions", get(system::my_permissions::<S>))
        .nest("/companies/:company_id/rbac", rbac::router::<S>().merge(users::router::<S>()))
}
