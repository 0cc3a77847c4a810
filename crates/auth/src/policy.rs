use serde::Serialize;
use thiserror::Error;

use devbook_core::{Owned, UserId};

/// Every mutating action a caller can attempt on someone's resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    UpdateUser,
    DeleteUser,
    UpdatePassword,
    UpdatePublication,
    DeletePublication,
    Follow,
    Unfollow,
    Like,
    Unlike,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::UpdateUser => "update_user",
            Action::DeleteUser => "delete_user",
            Action::UpdatePassword => "update_password",
            Action::UpdatePublication => "update_publication",
            Action::DeletePublication => "delete_publication",
            Action::Follow => "follow",
            Action::Unfollow => "unfollow",
            Action::Like => "like",
            Action::Unlike => "unlike",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: cannot {action}: {reason}")]
    Forbidden { action: Action, reason: &'static str },
}

/// Decide whether `actor` may perform `action` on a resource owned by `owner`.
///
/// - No IO
/// - No panics
/// - Existence of the resource is checked by the caller, not here
pub fn authorize(actor: UserId, owner: UserId, action: Action) -> Decision {
    let allowed = match action {
        Action::UpdateUser
        | Action::DeleteUser
        | Action::UpdatePassword
        | Action::UpdatePublication
        | Action::DeletePublication => actor == owner,
        Action::Follow | Action::Unfollow => actor != owner,
        Action::Like | Action::Unlike => true,
    };

    if allowed { Decision::Allow } else { Decision::Deny }
}

/// [`authorize`], turned into a `Result` with a human-readable reason.
pub fn enforce(actor: UserId, owner: UserId, action: Action) -> Result<(), AuthzError> {
    match authorize(actor, owner, action) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(AuthzError::Forbidden {
            action,
            reason: deny_reason(action),
        }),
    }
}

/// Enforce `action` against a loaded resource.
pub fn authorize_resource<R: Owned>(
    actor: UserId,
    resource: &R,
    action: Action,
) -> Result<(), AuthzError> {
    enforce(actor, resource.owner(), action)
}

fn deny_reason(action: Action) -> &'static str {
    match action {
        Action::UpdateUser | Action::DeleteUser | Action::UpdatePassword => {
            "users may only modify their own account"
        }
        Action::UpdatePublication | Action::DeletePublication => {
            "publications may only be modified by their author"
        }
        Action::Follow | Action::Unfollow => "users cannot follow or unfollow themselves",
        Action::Like | Action::Unlike => "not permitted",
    }
}
