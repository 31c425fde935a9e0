use tracing::warn;

use crate::{
    auth::{
        repo::PermissionStore,
        repo_types::{Identity, User},
    },
    error::ApiError,
};

/// Rejects anonymous and unactivated identities.
pub fn require_activated(identity: &Identity) -> Result<&User, ApiError> {
    match identity.user() {
        Some(user) if user.activated => Ok(user),
        Some(user) => {
            warn!(user_id = %user.id, "inactive account");
            Err(ApiError::InactiveAccount)
        }
        None => Err(ApiError::InactiveAccount),
    }
}

/// Activation first, then grant membership. A storage failure while loading
/// grants is a server error, never a denial.
pub async fn require_permission<'a>(
    identity: &'a Identity,
    code: &str,
    permissions: &dyn PermissionStore,
) -> Result<&'a User, ApiError> {
    let user = require_activated(identity)?;
    let granted = permissions
        .get_all_for_user(user.id)
        .await
        .map_err(ApiError::internal)?;
    if !granted.includes(code) {
        warn!(user_id = %user.id, permission = code, "permission denied");
        return Err(ApiError::NotPermitted);
    }
    Ok(user)
}
