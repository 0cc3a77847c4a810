use std::str::FromStr;

use axum::{
    Router,
    routing::{get, post},
};

use devbook_core::DomainError;

use crate::app::errors::ApiError;

pub mod login;
pub mod publications;
pub mod system;
pub mod users;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/users", post(users::create_user))
        .route("/login", post(login::login))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(users::router())
        .merge(publications::router())
}

/// Parse a numeric path id; anything else is a 400.
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(ApiError::from)
}
