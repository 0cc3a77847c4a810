use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
};
use chrono::Utc;

use crate::app::dto::{LoginRequest, LoginResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

const BAD_CREDENTIALS: &str = "invalid email or password";

/// Exchange email + password for a bearer token.
///
/// Unknown email and wrong password get the same response, and both pay for
/// one password verification.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = body?;
    request.validate()?;

    let Some((user_id, digest)) = services
        .users
        .find_credentials_by_email(request.email.trim())
        .await?
    else {
        services.verify_login(None, &request.password);
        tracing::info!("login rejected: unknown email");
        return Err(ApiError::unauthenticated(BAD_CREDENTIALS));
    };

    if !services.verify_login(Some(&digest), &request.password) {
        tracing::info!(user_id = %user_id, "login rejected: wrong password");
        return Err(ApiError::unauthenticated(BAD_CREDENTIALS));
    }

    let token = services.tokens.issue(user_id, Utc::now())?;
    tracing::info!(user_id = %user_id, "login succeeded");

    Ok(Json(LoginResponse { id: user_id, token }))
}
