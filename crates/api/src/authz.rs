//! API-side ownership guard.
//!
//! Handlers call these before any mutation, after the target has been
//! resolved, so an absent resource is reported as 404 rather than 403.

use devbook_auth::{Action, AuthzError, authorize_resource, enforce};
use devbook_core::{Entity, Owned, UserId};

use crate::context::ActorContext;

/// Check `action` against a resource whose owner is known by id.
pub fn authorize_action(
    actor: &ActorContext,
    owner: UserId,
    action: Action,
) -> Result<(), AuthzError> {
    enforce(actor.user_id(), owner, action).inspect_err(|e| {
        tracing::warn!(
            actor = %actor.user_id(),
            owner = %owner,
            action = %action,
            error = %e,
            "policy denied request"
        );
    })
}

/// Check `action` against a loaded resource.
pub fn authorize_on<R>(actor: &ActorContext, resource: &R, action: Action) -> Result<(), AuthzError>
where
    R: Owned + Entity,
{
    authorize_resource(actor.user_id(), resource, action).inspect_err(|e| {
        tracing::warn!(
            actor = %actor.user_id(),
            owner = %resource.owner(),
            resource_id = ?resource.id(),
            action = %action,
            error = %e,
            "policy denied request"
        );
    })
}
