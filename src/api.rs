use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rearch::Container;
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    config::started_at_capsule,
    link_service::{
        CreateLinkError, CreateLinkPayload, DeleteLinkError, FollowLinkError, GetLinkError,
        ListLinksError, Redirect, link_service_capsule,
    },
};

#[derive(Serialize)]
pub struct Error {
    error: String,
    error_id: String,
}

#[derive(Serialize)]
pub struct Deleted {
    ok: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    ok: bool,
    version: &'static str,
    uptime_seconds: u64,
}

/// Error response for something the caller got wrong.
fn client_error(status: StatusCode, error: &(dyn std::error::Error + 'static)) -> Response {
    let err_uuid = Uuid::new_v4();
    info!(?err_uuid, ?error, "User submitted a bad request");
    (
        status,
        Json(Error {
            error: error.to_string(),
            error_id: err_uuid.to_string(),
        }),
    )
        .into_response()
}

/// Error response for something that went wrong on our side.
/// Only `public_message` reaches the caller.
fn internal_error(error: &anyhow::Error, public_message: &str) -> Response {
    let err_uuid = Uuid::new_v4();
    error!(?err_uuid, ?error, "Encountered an error during a request");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Error {
            error: public_message.to_owned(),
            error_id: err_uuid.to_string(),
        }),
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(Error {
            error: "Not found".to_owned(),
            error_id: Uuid::new_v4().to_string(),
        }),
    )
        .into_response()
}

#[instrument(skip(container))]
pub async fn list_links(State(container): State<Container>) -> Response {
    match container.read(link_service_capsule).list_links().await {
        Ok(links) => Json(links).into_response(),
        Err(ListLinksError::Internal(err)) => internal_error(&err, "Internal server error"),
    }
}

#[instrument(skip(container, payload))]
pub async fn create_link(
    State(container): State<Container>,
    payload: Result<Json<CreateLinkPayload>, JsonRejection>,
) -> Response {
    let Json(CreateLinkPayload { url, code }) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let err_uuid = Uuid::new_v4();
            info!(?err_uuid, rejection = rejection.body_text(), "Rejected request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(Error {
                    error: "Invalid JSON body".to_owned(),
                    error_id: err_uuid.to_string(),
                }),
            )
                .into_response();
        }
    };

    match container
        .read(link_service_capsule)
        .create_link(url.as_deref().unwrap_or_default(), code.as_deref())
        .await
    {
        Ok(link) => (StatusCode::CREATED, Json(link)).into_response(),
        Err(
            error @ (CreateLinkError::MissingUrl
            | CreateLinkError::InvalidUrl(_)
            | CreateLinkError::InvalidCode(_)),
        ) => client_error(StatusCode::BAD_REQUEST, &error),
        Err(error @ CreateLinkError::CodeAlreadyTaken) => client_error(StatusCode::CONFLICT, &error),
        Err(CreateLinkError::GenerationExhausted) => internal_error(
            &anyhow::anyhow!("Exhausted code generation attempts"),
            "Failed to generate unique code",
        ),
        Err(CreateLinkError::Internal(err)) => internal_error(&err, "Internal server error"),
    }
}

#[instrument(skip(container))]
pub async fn get_link(State(container): State<Container>, Path(code): Path<String>) -> Response {
    match container.read(link_service_capsule).get_link(&code).await {
        Ok(link) => Json(link).into_response(),
        Err(GetLinkError::NotFound) => not_found(),
        Err(GetLinkError::Internal(err)) => internal_error(&err, "Internal server error"),
    }
}

#[instrument(skip(container))]
pub async fn delete_link(State(container): State<Container>, Path(code): Path<String>) -> Response {
    match container.read(link_service_capsule).delete_link(&code).await {
        Ok(()) => Json(Deleted { ok: true }).into_response(),
        Err(DeleteLinkError::NotFound) => not_found(),
        Err(DeleteLinkError::Internal(err)) => internal_error(&err, "Internal server error"),
    }
}

/// Sends the visitor on with a `302 Found`, counting the click.
#[instrument(skip(container))]
pub async fn follow_link(State(container): State<Container>, Path(code): Path<String>) -> Response {
    match container.read(link_service_capsule).follow_link(&code).await {
        Ok(Redirect { url }) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
        Err(FollowLinkError::NotFound) => not_found(),
        Err(FollowLinkError::Internal(err)) => internal_error(&err, "Internal server error"),
    }
}

pub async fn health(State(container): State<Container>) -> Json<Health> {
    Json(Health {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: container.read(started_at_capsule).elapsed().as_secs(),
    })
}
