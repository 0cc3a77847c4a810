//! HS256 bearer token issuance and verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use devbook_core::UserId;

use crate::claims::{AuthError, Claims, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("token signing key is not configured")]
    MissingKey,

    #[error("failed to encode token: {0}")]
    Encode(String),
}

/// Verifies bearer tokens. Object-safe so the HTTP layer can hold it as
/// `Arc<dyn JwtValidator>`.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError>;

    /// Validate and return only the authenticated user id.
    fn extract_user_id(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, AuthError> {
        self.validate(token, now).map(|claims| claims.user_id)
    }
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, SigningError>;
}

/// Symmetric HMAC-SHA256 token service built from the process secret.
#[derive(Clone)]
pub struct Hs256TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    has_key: bool,
}

impl Hs256TokenService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            has_key: !secret.is_empty(),
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `validate_claims`.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;
        validation
    }
}

impl std::fmt::Debug for Hs256TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hs256TokenService")
            .field("has_key", &self.has_key)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer for Hs256TokenService {
    fn issue(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, SigningError> {
        if !self.has_key {
            return Err(SigningError::MissingKey);
        }
        let claims = Claims::for_user(user_id, now);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SigningError::Encode(e.to_string()))
    }
}

impl JwtValidator for Hs256TokenService {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Malformed);
        }

        let data = decode::<Claims>(token, &self.decoding, &Self::validation()).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidAlgorithm => AuthError::UnexpectedAlgorithm,
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Malformed,
            }
        })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

/// Pull the token out of an `Authorization` header value.
///
/// The value must be exactly two space-separated parts, the first being
/// `Bearer`. Anything else yields an empty token, which never validates.
pub fn bearer_token(header: Option<&str>) -> &str {
    let Some(value) = header else {
        return "";
    };
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => token,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret";

    fn service() -> Hs256TokenService {
        Hs256TokenService::new(SECRET)
    }

    #[test]
    fn issued_token_round_trips() {
        let svc = service();
        let now = Utc::now();
        let token = svc.issue(UserId::new(7), now).unwrap();

        let claims = svc.validate(&token, now).unwrap();
        assert_eq!(claims.user_id, UserId::new(7));
        assert!(claims.authorized);
        assert_eq!(svc.extract_user_id(&token, now).unwrap(), UserId::new(7));
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let now = Utc::now();
        let token = Hs256TokenService::new(b"other").issue(UserId::new(1), now).unwrap();
        assert_eq!(service().validate(&token, now), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn non_hs256_token_is_rejected() {
        let now = Utc::now();
        let claims = Claims::for_user(UserId::new(1), now);
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(service().validate(&token, now), Err(AuthError::UnexpectedAlgorithm));
    }

    #[test]
    fn token_expires_six_hours_after_issue() {
        let svc = service();
        let now = Utc::now();
        let token = svc.issue(UserId::new(1), now).unwrap();

        assert!(svc.validate(&token, now + Duration::hours(5)).is_ok());
        assert_eq!(
            svc.validate(&token, now + Duration::hours(6)),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn garbage_and_empty_tokens_are_malformed() {
        let now = Utc::now();
        assert_eq!(service().validate("", now), Err(AuthError::Malformed));
        assert_eq!(service().validate("not-a-jwt", now), Err(AuthError::Malformed));
    }

    #[test]
    fn missing_key_cannot_sign() {
        let svc = Hs256TokenService::new(b"");
        assert_eq!(svc.issue(UserId::new(1), Utc::now()), Err(SigningError::MissingKey));
    }

    #[test]
    fn non_numeric_user_id_is_malformed() {
        let now = Utc::now();
        let body = json!({ "user_id": "abc", "exp": now.timestamp() + 60, "authorized": true });
        let token = encode(&Header::default(), &body, &EncodingKey::from_secret(SECRET)).unwrap();

        assert_eq!(service().validate(&token, now), Err(AuthError::Malformed));
    }

    #[test]
    fn unauthorized_claims_are_rejected() {
        let now = Utc::now();
        let body = json!({ "user_id": 1, "exp": now.timestamp() + 60, "authorized": false });
        let token = encode(&Header::default(), &body, &EncodingKey::from_secret(SECRET)).unwrap();

        assert_eq!(service().validate(&token, now), Err(AuthError::NotAuthorized));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), "abc.def.ghi");
        assert_eq!(bearer_token(None), "");
        assert_eq!(bearer_token(Some("abc.def.ghi")), "");
        assert_eq!(bearer_token(Some("Basic abc")), "");
        assert_eq!(bearer_token(Some("Bearer a b")), "");
    }
}
