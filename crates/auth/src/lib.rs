//! `devbook-auth` — pure authentication/authorization boundary.
//!
//! This crate is decoupled from HTTP and storage: it issues and verifies
//! bearer tokens, hashes passwords, and decides who may act on what.

pub mod claims;
pub mod credentials;
pub mod policy;
pub mod token;

pub use claims::{AuthError, Claims, TOKEN_LIFETIME_HOURS, validate_claims};
pub use credentials::{Argon2Credentials, CredentialError, Credentials};
pub use policy::{Action, AuthzError, Decision, authorize, authorize_resource, enforce};
pub use token::{Hs256TokenService, JwtValidator, SigningError, TokenIssuer, bearer_token};
