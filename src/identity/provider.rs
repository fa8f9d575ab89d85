//! First-login provisioning of users coming from the external identity provider.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Principal, PrincipalSource};
use crate::error::{AppError, AppResult};
use crate::model::{UserRecord, ROLE_PLAYER};
use crate::storage::SharedStore;

/// Profile the client forwards from the provider after sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provisioned {
    pub user: UserRecord,
    pub created: bool,
}

/// Create the user row for a federated principal on first sight.
///
/// The profile id must be the principal's own subject. A new user gets the
/// principal's role as primary role. The groups claim behind that role is not
/// signature-checked, so the only membership written is the default `player`
/// role; anything else must be granted by an admin. An existing row is
/// returned untouched.
pub fn provision_federated_user(store: &SharedStore, principal: &Principal, profile: &FederatedProfile) -> AppResult<Provisioned> {
    if principal.source != PrincipalSource::Federated {
        return Err(AppError::validation("not_federated", "provisioning requires a federated credential"));
    }
    if profile.id != principal.user_id {
        return Err(AppError::validation("principal_mismatch", "profile id does not match the authenticated user"));
    }
    if profile.email.trim().is_empty() {
        return Err(AppError::validation("missing_email", "email is required"));
    }

    let out = store.transaction(|t| {
        if let Some(existing) = t.user(&profile.id) {
            return Ok(Provisioned { user: existing.clone(), created: false });
        }
        if t.user_by_email(&profile.email).is_some() {
            return Err(AppError::conflict("email_taken", "email already belongs to another user"));
        }
        let user = UserRecord {
            id: profile.id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            primary_role: principal.role.clone(),
            avatar_url: profile.picture.clone().filter(|p| !p.is_empty()),
            created_at: Utc::now(),
        };
        t.insert_user(user.clone());
        if principal.role == ROLE_PLAYER {
            if let Some(role_id) = t.role_by_name(ROLE_PLAYER).map(|r| r.id.clone()) {
                t.add_user_role(&user.id, &role_id);
            }
        }
        Ok(Provisioned { user, created: true })
    })?;
    if out.created {
        info!(target: "courtbook::identity", "provisioned federated user={} role={}", out.user.id, out.user.primary_role);
    }
    Ok(out)
}
