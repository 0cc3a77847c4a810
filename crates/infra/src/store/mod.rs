//! Persistence gateway for users, follow edges and publications.
//!
//! Handlers depend on the [`UserStore`] / [`PublicationStore`] traits only.
//! Two implementations exist:
//! - [`InMemoryStore`]: process-local, for tests and development.
//! - [`PgStore`]: PostgreSQL through a `sqlx` connection pool.
//!
//! ## Contract shared by both implementations
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Single lookup of an absent row | `Ok(None)` |
//! | Mutation of an absent row | `StoreError::NotFound` |
//! | Duplicate nick or email | `StoreError::Conflict` |
//! | Follow an absent user | `StoreError::NotFound` |
//! | Follow twice | `Ok(())`, one edge |
//! | Unlike at zero likes | `Ok(())`, stays zero |
//! | Delete a user | removes their publications and follow edges |
//!
//! Lists of users are ordered by id; lists of publications newest first.

use async_trait::async_trait;
use thiserror::Error;

use devbook_core::{
    NewUserRecord, PasswordDigest, Publication, PublicationDraft, PublicationEdit, PublicationId,
    User, UserId, UserProfile,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user; id and `created_at` are assigned here.
    async fn create(&self, record: NewUserRecord) -> StoreResult<User>;

    /// Case-insensitive substring match on name or nick. Empty filter lists all.
    async fn search(&self, filter: &str) -> StoreResult<Vec<User>>;

    async fn get(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn update(&self, id: UserId, profile: &UserProfile) -> StoreResult<()>;

    async fn delete(&self, id: UserId) -> StoreResult<()>;

    /// Id and stored digest for a login attempt.
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<(UserId, PasswordDigest)>>;

    async fn password_digest(&self, id: UserId) -> StoreResult<Option<PasswordDigest>>;

    async fn update_password(&self, id: UserId, digest: &PasswordDigest) -> StoreResult<()>;

    /// Record that `follower` follows `followee`. Idempotent.
    async fn follow(&self, followee: UserId, follower: UserId) -> StoreResult<()>;

    /// Remove the edge if present. Idempotent.
    async fn unfollow(&self, followee: UserId, follower: UserId) -> StoreResult<()>;

    /// Users following `id`.
    async fn followers(&self, id: UserId) -> StoreResult<Vec<User>>;

    /// Users `id` follows.
    async fn following(&self, id: UserId) -> StoreResult<Vec<User>>;
}

#[async_trait]
pub trait PublicationStore: Send + Sync {
    /// Insert with zero likes; the author must exist.
    async fn create(&self, draft: PublicationDraft) -> StoreResult<Publication>;

    async fn get(&self, id: PublicationId) -> StoreResult<Option<Publication>>;

    /// Publications by `user` and by everyone `user` follows.
    async fn feed(&self, user: UserId) -> StoreResult<Vec<Publication>>;

    async fn by_author(&self, author: UserId) -> StoreResult<Vec<Publication>>;

    async fn update(&self, id: PublicationId, edit: &PublicationEdit) -> StoreResult<()>;

    async fn delete(&self, id: PublicationId) -> StoreResult<()>;

    async fn like(&self, id: PublicationId) -> StoreResult<()>;

    /// Decrement likes, never below zero.
    async fn unlike(&self, id: PublicationId) -> StoreResult<()>;
}
