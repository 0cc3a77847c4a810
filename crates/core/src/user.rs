//! User entity and the validation/normalization rules applied to user input.
//!
//! Input flows through two stages:
//! - [`UserPayload`] is the raw request body (anything may be blank).
//! - [`UserProfile`] / [`UserRegistration`] are validated and trimmed.
//!
//! A registration only becomes a [`NewUserRecord`] (what the store accepts)
//! by hashing its password, so a plaintext password cannot reach persistence.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Owned};
use crate::error::{DomainError, DomainResult};
use crate::id::UserId;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is valid")
});

/// A stored user, as returned to clients. Carries no password material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub nick: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for User {
    fn owner(&self) -> UserId {
        self.id
    }
}

/// One-way password digest (PHC string). Never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PasswordDigest(..)")
    }
}

/// Raw user body as sent by clients on create and update.
///
/// Missing fields deserialize as empty strings and are rejected by validation.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserPayload {
    pub name: String,
    pub nick: String,
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for UserPayload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserPayload")
            .field("name", &self.name)
            .field("nick", &self.nick)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl UserPayload {
    /// Validate and normalize a body for account creation (password required).
    pub fn prepare_registration(self) -> DomainResult<UserRegistration> {
        let profile = UserProfile::parse(&self.name, &self.nick, &self.email)?;
        if self.password.trim().is_empty() {
            return Err(DomainError::blank("password"));
        }
        Ok(UserRegistration {
            profile,
            password: self.password,
        })
    }

    /// Validate and normalize a body for a profile update.
    ///
    /// The password field is not required and is ignored if present.
    pub fn prepare_update(self) -> DomainResult<UserProfile> {
        UserProfile::parse(&self.name, &self.nick, &self.email)
    }
}

/// Validated, trimmed name/nick/email triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    name: String,
    nick: String,
    email: String,
}

impl UserProfile {
    pub fn parse(name: &str, nick: &str, email: &str) -> DomainResult<Self> {
        let name = name.trim();
        let nick = nick.trim();
        let email = email.trim();

        if name.is_empty() {
            return Err(DomainError::blank("name"));
        }
        if nick.is_empty() {
            return Err(DomainError::blank("nick"));
        }
        if email.is_empty() {
            return Err(DomainError::blank("email"));
        }
        if !EMAIL_RE.is_match(email) {
            return Err(DomainError::validation(format!("email '{email}' is not a valid address")));
        }

        Ok(Self {
            name: name.to_string(),
            nick: nick.to_string(),
            email: email.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// A validated registration that still holds the plaintext password.
#[derive(Clone)]
pub struct UserRegistration {
    profile: UserProfile,
    password: String,
}

impl UserRegistration {
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Replace the plaintext password with its digest, consuming the
    /// registration. The hash function is invoked exactly once.
    pub fn into_record<E>(
        self,
        hash: impl FnOnce(&str) -> Result<PasswordDigest, E>,
    ) -> Result<NewUserRecord, E> {
        let password_hash = hash(&self.password)?;
        Ok(NewUserRecord {
            profile: self.profile,
            password_hash,
        })
    }
}

impl core::fmt::Debug for UserRegistration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserRegistration")
            .field("profile", &self.profile)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What the user store persists on creation.
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub profile: UserProfile,
    pub password_hash: PasswordDigest,
}

/// Body of a password change request.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasswordChange {
    pub current: String,
    pub new: String,
}

impl PasswordChange {
    pub fn validate(&self) -> DomainResult<()> {
        if self.current.is_empty() {
            return Err(DomainError::blank("current"));
        }
        if self.new.trim().is_empty() {
            return Err(DomainError::blank("new"));
        }
        Ok(())
    }
}

impl core::fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}
