use serde::{Deserialize, Serialize};

use devbook_core::{DomainError, DomainResult, UserId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.email.trim().is_empty() {
            return Err(DomainError::blank("email"));
        }
        if self.password.is_empty() {
            return Err(DomainError::blank("password"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `GET /users?user=<filter>`
#[derive(Debug, Default, Deserialize)]
pub struct UserSearchQuery {
    pub user: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: UserId,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub user_id: UserId,
}
