use axum::{Extension, Json, http::StatusCode};

use crate::app::dto::WhoAmIResponse;
use crate::context::ActorContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(actor): Extension<ActorContext>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        user_id: actor.user_id(),
    })
}
