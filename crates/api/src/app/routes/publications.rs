use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};

use devbook_auth::Action;
use devbook_core::{Publication, PublicationId, PublicationPayload, UserId};

use crate::app::errors::ApiError;
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::authz::authorize_on;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/publications", post(create_publication).get(feed))
        .route(
            "/publications/:id",
            get(get_publication)
                .put(update_publication)
                .delete(delete_publication),
        )
        .route("/publications/:id/like", post(like_publication))
        .route("/publications/:id/unlike", post(unlike_publication))
        .route("/users/:id/publications", get(list_by_author))
}

async fn load(services: &AppServices, raw_id: &str) -> Result<Publication, ApiError> {
    let id: PublicationId = parse_id(raw_id)?;
    services
        .publications
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("publication"))
}

pub async fn create_publication(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<PublicationPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Publication>), ApiError> {
    let Json(payload) = body?;
    let draft = payload.prepare(actor.user_id())?;

    let publication = services.publications.create(draft).await?;
    tracing::info!(
        publication_id = %publication.id,
        author_id = %publication.author_id,
        "publication created"
    );

    Ok((StatusCode::CREATED, Json(publication)))
}

/// Own publications plus those of followed users, newest first.
pub async fn feed(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
) -> Result<Json<Vec<Publication>>, ApiError> {
    Ok(Json(services.publications.feed(actor.user_id()).await?))
}

pub async fn get_publication(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<Publication>, ApiError> {
    Ok(Json(load(&services, &id).await?))
}

pub async fn update_publication(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<PublicationPayload>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let publication = load(&services, &id).await?;
    authorize_on(&actor, &publication, Action::UpdatePublication)?;

    let Json(payload) = body?;
    let edit = payload.prepare_edit()?;
    services.publications.update(publication.id, &edit).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_publication(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let publication = load(&services, &id).await?;
    authorize_on(&actor, &publication, Action::DeletePublication)?;

    services.publications.delete(publication.id).await?;
    tracing::info!(publication_id = %publication.id, "publication deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_by_author(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Publication>>, ApiError> {
    let author: UserId = parse_id(&id)?;
    Ok(Json(services.publications.by_author(author).await?))
}

pub async fn like_publication(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let publication = load(&services, &id).await?;
    authorize_on(&actor, &publication, Action::Like)?;

    services.publications.like(publication.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unlike_publication(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let publication = load(&services, &id).await?;
    authorize_on(&actor, &publication, Action::Unlike)?;

    services.publications.unlike(publication.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
