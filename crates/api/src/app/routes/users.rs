use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    routing::{get, post},
};

use devbook_auth::Action;
use devbook_core::{PasswordChange, User, UserId, UserPayload};

use crate::app::dto::UserSearchQuery;
use crate::app::errors::ApiError;
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::authz::authorize_action;
use crate::context::ActorContext;

/// Authenticated user routes. Registration lives on the public router.
pub fn router() -> Router {
    Router::new()
        .route("/users", get(search_users))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/users/:id/follow", post(follow_user))
        .route("/users/:id/unfollow", post(unfollow_user))
        .route("/users/:id/followers", get(list_followers))
        .route("/users/:id/following", get(list_following))
        .route("/users/:id/update-password", post(update_password))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<UserPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(payload) = body?;
    let record = payload
        .prepare_registration()?
        .into_record(|plain| services.credentials.hash(plain))?;

    let user = services.users.create(record).await?;
    tracing::info!(user_id = %user.id, "user registered");

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn search_users(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<UserSearchQuery>, QueryRejection>,
) -> Result<Json<Vec<User>>, ApiError> {
    let Query(query) = query?;
    let filter = query.user.unwrap_or_default();
    let users = services.users.search(filter.trim()).await?;
    Ok(Json(users))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let id: UserId = parse_id(&id)?;
    let user = services
        .users
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;
    Ok(Json(user))
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<UserPayload>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id: UserId = parse_id(&id)?;
    authorize_action(&actor, id, Action::UpdateUser)?;

    let Json(payload) = body?;
    let profile = payload.prepare_update()?;
    services.users.update(id, &profile).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: UserId = parse_id(&id)?;
    authorize_action(&actor, id, Action::DeleteUser)?;

    services.users.delete(id).await?;
    tracing::info!(user_id = %id, "user deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn follow_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let followee: UserId = parse_id(&id)?;
    authorize_action(&actor, followee, Action::Follow)?;

    services
        .users
        .follow(followee, actor.user_id())
        .await
        .map_err(|e| match e {
            devbook_infra::StoreError::NotFound => ApiError::not_found("user"),
            other => other.into(),
        })?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let followee: UserId = parse_id(&id)?;
    authorize_action(&actor, followee, Action::Unfollow)?;

    services.users.unfollow(followee, actor.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_followers(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<User>>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(services.users.followers(id).await?))
}

pub async fn list_following(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<User>>, ApiError> {
    let id: UserId = parse_id(&id)?;
    Ok(Json(services.users.following(id).await?))
}

pub async fn update_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<PasswordChange>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id: UserId = parse_id(&id)?;
    authorize_action(&actor, id, Action::UpdatePassword)?;

    let Json(change) = body?;
    change.validate()?;

    let current = services
        .users
        .password_digest(id)
        .await?
        .ok_or_else(|| ApiError::not_found("user"))?;

    if !services.credentials.verify(&current, &change.current) {
        tracing::warn!(user_id = %id, "password change rejected: current password mismatch");
        return Err(ApiError::unauthenticated("current password is incorrect"));
    }

    let digest = services.credentials.hash(&change.new)?;
    services.users.update_password(id, &digest).await?;
    tracing::info!(user_id = %id, "password updated");

    Ok(StatusCode::OK)
}
