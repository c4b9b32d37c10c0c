//! Upstream authoriser: defence-in-depth re-check of binding/upstream/user
//! ownership at request time (spec.md §4.9). No teacher equivalent — an
//! APISIX-style upstream carries no per-request ownership relationship.

use yapi_core::context::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeError {
    BindingMismatch,
    OwnershipMismatch,
    ApiKeyNotAuthorizedForUser,
}

impl AuthorizeError {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthorizeError::BindingMismatch => "binding mismatch",
            AuthorizeError::OwnershipMismatch => "ownership mismatch",
            AuthorizeError::ApiKeyNotAuthorizedForUser => "api key not authorized for user",
        }
    }
}

/// When both a Binding and UpstreamInfo are present, re-verify that
/// `upstream.id == binding.upstream_id`, `upstream.user_id ==
/// binding.user_id`, and (if a user is in context) `user.id ==
/// binding.user_id`. A context with no binding or no upstream info is
/// vacuously authorised — this check only guards against drift once both
/// are resolved.
pub fn authorize(ctx: &RequestContext) -> Result<(), AuthorizeError> {
    let (Some(binding), Some(upstream)) = (&ctx.binding, &ctx.upstream_info) else {
        return Ok(());
    };

    if upstream.credential.id != binding.upstream_credential_id {
        return Err(AuthorizeError::BindingMismatch);
    }
    if upstream.credential.user_id != binding.user_id {
        return Err(AuthorizeError::OwnershipMismatch);
    }
    if let Some(user) = &ctx.user {
        if user.id != binding.user_id {
            return Err(AuthorizeError::ApiKeyNotAuthorizedForUser);
        }
    }
    Ok(())
}
