use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use devbook_core::UserId;

/// How long an issued token stays valid.
pub const TOKEN_LIFETIME_HOURS: i64 = 6;

/// JWT claims carried by every bearer token.
///
/// Fixed schema: a token that does not decode into this shape is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity of the user the token was issued to.
    pub user_id: UserId,

    /// Expiration, unix seconds.
    pub exp: i64,

    /// Set on every token issued at login.
    pub authorized: bool,
}

impl Claims {
    /// Claims for a freshly authenticated user, expiring after
    /// [`TOKEN_LIFETIME_HOURS`].
    pub fn for_user(user_id: UserId, issued_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            exp: (issued_at + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
            authorized: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token uses an unexpected signing algorithm")]
    UnexpectedAlgorithm,

    #[error("token has expired")]
    Expired,

    #[error("token is not authorized")]
    NotAuthorized,
}

/// Deterministically validate decoded claims against `now`.
///
/// Signature verification happens before this, in the token service.
pub fn validate_claims(claims: &Claims, now: DateTime<Utc>) -> Result<(), AuthError> {
    if !claims.authorized {
        return Err(AuthError::NotAuthorized);
    }
    if now.timestamp() >= claims.exp {
        return Err(AuthError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_claims_expire_after_six_hours() {
        let now = Utc::now();
        let claims = Claims::for_user(UserId::new(1), now);

        assert!(claims.authorized);
        assert_eq!(claims.exp - now.timestamp(), 6 * 3600);
    }

    #[test]
    fn valid_until_expiry_then_expired() {
        let now = Utc::now();
        let claims = Claims::for_user(UserId::new(1), now);

        assert_eq!(validate_claims(&claims, now), Ok(()));
        assert_eq!(
            validate_claims(&claims, now + Duration::hours(6) - Duration::seconds(1)),
            Ok(())
        );
        assert_eq!(
            validate_claims(&claims, now + Duration::hours(6)),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn unauthorized_flag_rejected() {
        let mut claims = Claims::for_user(UserId::new(1), Utc::now());
        claims.authorized = false;
        assert_eq!(validate_claims(&claims, Utc::now()), Err(AuthError::NotAuthorized));
    }
}
