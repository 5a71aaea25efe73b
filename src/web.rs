//! Server-rendered pages: the dashboard and per-link stats.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rearch::Container;
use serde::Deserialize;
use tracing::{error, instrument};

use crate::link_service::{GetLinkError, LinkDetails, ListLinksError, link_service_capsule};

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub q: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub links: Vec<LinkDetails>,
    pub query: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "stats.html")]
pub struct StatsTemplate {
    pub link: LinkDetails,
}

#[derive(Template, WebTemplate)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub code: String,
}

/// Case-insensitive substring match on code or target URL.
fn matches_query(link: &LinkDetails, query: &str) -> bool {
    let query = query.to_lowercase();
    link.code.to_lowercase().contains(&query) || link.target_url.to_lowercase().contains(&query)
}

#[instrument(skip(container))]
pub async fn dashboard(
    State(container): State<Container>,
    Query(DashboardQuery { q }): Query<DashboardQuery>,
) -> Response {
    let query = q.unwrap_or_default().trim().to_owned();
    match container.read(link_service_capsule).list_links().await {
        Ok(links) => DashboardTemplate {
            links: links
                .into_iter()
                .filter(|link| matches_query(link, &query))
                .collect(),
            query,
        }
        .into_response(),
        Err(ListLinksError::Internal(err)) => {
            error!(?err, "Failed to render dashboard");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

#[instrument(skip(container))]
pub async fn stats(State(container): State<Container>, Path(code): Path<String>) -> Response {
    match container.read(link_service_capsule).get_link(&code).await {
        Ok(link) => StatsTemplate { link }.into_response(),
        Err(GetLinkError::NotFound) => {
            (StatusCode::NOT_FOUND, NotFoundTemplate { code }).into_response()
        }
        Err(GetLinkError::Internal(err)) => {
            error!(?err, "Failed to render stats page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}
