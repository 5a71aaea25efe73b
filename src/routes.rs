use axum::{Router, routing};
use rearch::Container;

use crate::{api, web};

/// Every route of the service, with `container` as the shared state.
pub fn app(container: Container) -> Router {
    Router::new()
        .route("/", routing::get(web::dashboard))
        .route("/code/{code}", routing::get(web::stats))
        .route("/healthz", routing::get(api::health))
        .route("/api/links", routing::get(api::list_links).post(api::create_link))
        .route(
            "/api/links/{code}",
            routing::get(api::get_link).delete(api::delete_link),
        )
        .route("/{code}", routing::get(api::follow_link))
        .with_state(container)
}
