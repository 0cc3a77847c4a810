//! `devbook-core` — domain foundation: identifiers, entities and their
//! validation rules.
//!
//! This crate contains **pure domain** code (no HTTP, no storage, no crypto).

pub mod entity;
pub mod error;
pub mod id;
pub mod publication;
pub mod user;

pub use entity::{Entity, Owned};
pub use error::{DomainError, DomainResult};
pub use id::{PublicationId, UserId};
pub use publication::{Publication, PublicationDraft, PublicationEdit, PublicationPayload};
pub use user::{
    NewUserRecord, PasswordChange, PasswordDigest, User, UserPayload, UserProfile,
    UserRegistration,
};
