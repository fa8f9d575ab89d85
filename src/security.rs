//! Permission catalog, role seeding and role membership changes.
//!
//! Permission names are flat `<verb>_<resource>` strings. The catalog is closed:
//! it is seeded once at startup and a check against a name outside it is a
//! configuration error.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::identity::AccessGuard;
use crate::model::{KNOWN_ROLES, ROLE_ADMIN, ROLE_PLAYER};
use crate::storage::SharedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    ListUsers,
    EditUsers,
    DeleteUsers,
    CreateUsers,
    ListGroups,
    CreateGroups,
    EditGroups,
    DeleteGroups,
    AddGroupPlayer,
    ListCourts,
    CreateCourts,
    EditCourts,
    DeleteCourts,
    ListSessions,
    CreateSessions,
    DeleteSessions,
    EditSessions,
}

impl Permission {
    pub const ALL: [Permission; 17] = [
        Permission::ListUsers,
        Permission::EditUsers,
        Permission::DeleteUsers,
        Permission::CreateUsers,
        Permission::ListGroups,
        Permission::CreateGroups,
        Permission::EditGroups,
        Permission::DeleteGroups,
        Permission::AddGroupPlayer,
        Permission::ListCourts,
        Permission::CreateCourts,
        Permission::EditCourts,
        Permission::DeleteCourts,
        Permission::ListSessions,
        Permission::CreateSessions,
        Permission::DeleteSessions,
        Permission::EditSessions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ListUsers => "list_users",
            Permission::EditUsers => "edit_users",
            Permission::DeleteUsers => "delete_users",
            Permission::CreateUsers => "create_users",
            Permission::ListGroups => "list_groups",
            Permission::CreateGroups => "create_groups",
            Permission::EditGroups => "edit_groups",
            Permission::DeleteGroups => "delete_groups",
            Permission::AddGroupPlayer => "add_group_player",
            Permission::ListCourts => "list_courts",
            Permission::CreateCourts => "create_courts",
            Permission::EditCourts => "edit_courts",
            Permission::DeleteCourts => "delete_courts",
            Permission::ListSessions => "list_sessions",
            Permission::CreateSessions => "create_sessions",
            Permission::DeleteSessions => "delete_sessions",
            Permission::EditSessions => "edit_sessions",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AppError::internal("unknown_permission", format!("permission '{}' is not in the catalog", s)))
    }
}

/// Default grants per role.
pub fn default_grants(role: &str) -> &'static [Permission] {
    const PLAYER: [Permission; 6] = [
        Permission::ListGroups,
        Permission::ListCourts,
        Permission::ListSessions,
        Permission::CreateSessions,
        Permission::EditSessions,
        Permission::DeleteSessions,
    ];
    match role {
        ROLE_ADMIN => &Permission::ALL,
        ROLE_PLAYER => &PLAYER,
        _ => &[],
    }
}

/// Seed roles, the permission catalog and default grants. Idempotent; runs as one
/// transaction so a failure leaves the catalog untouched.
pub fn seed_roles_and_permissions(store: &SharedStore) -> AppResult<()> {
    store.transaction(|t| {
        for perm in Permission::ALL {
            t.ensure_permission(perm.as_str());
        }
        for role in KNOWN_ROLES {
            let role_id = t.ensure_role(role);
            for perm in default_grants(role) {
                let perm_id = t.ensure_permission(perm.as_str());
                t.grant(&role_id, &perm_id);
            }
        }
        Ok::<_, AppError>(())
    })?;
    info!(target: "courtbook::security", "roles and permissions seeded");
    Ok(())
}

/// Add `user_id` to `role` (no-op when already a member). The role must exist.
pub fn assign_role(store: &SharedStore, user_id: &str, role: &str) -> AppResult<()> {
    store.transaction(|t| {
        let role_id = t
            .role_by_name(role)
            .map(|r| r.id.clone())
            .ok_or_else(|| AppError::not_found("role_not_found", format!("role '{}' does not exist", role)))?;
        t.add_user_role(user_id, &role_id);
        Ok(())
    })
}

/// Replace the user's role memberships. Admin only.
///
/// Every listed role must exist; old memberships are cleared, the new ones
/// inserted and the user's denormalized primary role refreshed to the first
/// listed role, all in one transaction.
pub fn reassign_roles(guard: &AccessGuard, actor: &str, user_id: &str, roles: &[String]) -> AppResult<()> {
    if !guard.is_admin(actor)? {
        return Err(AppError::authorization("admin_required", "only admins can change roles"));
    }
    let Some(primary) = roles.first() else {
        return Err(AppError::validation("empty_roles", "at least one role is required"));
    };
    guard.store().transaction(|t| {
        if t.user(user_id).is_none() {
            return Err(AppError::not_found("user_not_found", format!("user '{}' does not exist", user_id)));
        }
        let mut role_ids = Vec::with_capacity(roles.len());
        for name in roles {
            let id = t
                .role_by_name(name)
                .map(|r| r.id.clone())
                .ok_or_else(|| AppError::not_found("role_not_found", format!("role '{}' does not exist", name)))?;
            role_ids.push(id);
        }
        t.clear_user_roles(user_id);
        for id in &role_ids {
            t.add_user_role(user_id, id);
        }
        t.set_primary_role(user_id, primary);
        Ok(())
    })?;
    debug!(target: "courtbook::security", "roles reassigned user={} roles={:?} by={}", user_id, roles, actor);
    Ok(())
}

/// Role names held by the user (authoritative membership table).
pub fn roles_of(store: &SharedStore, user_id: &str) -> AppResult<Vec<String>> {
    Ok(store.read(|t| t.role_names_of(user_id))?)
}

/// Permission names granted to the user through any role.
pub fn permissions_of(store: &SharedStore, user_id: &str) -> AppResult<Vec<String>> {
    Ok(store.read(|t| t.permission_names_of(user_id).into_iter().collect())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ROLE_GROUP_OWNER;

    #[test]
    fn catalog_names_round_trip_and_reject_unknown() {
        for p in Permission::ALL {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), p);
        }
        let err = "launch_rockets".parse::<Permission>().unwrap_err();
        assert_eq!(err.code_str(), "unknown_permission");
    }

    #[test]
    fn seeding_is_idempotent() {
        let store = SharedStore::in_memory();
        seed_roles_and_permissions(&store).unwrap();
        seed_roles_and_permissions(&store).unwrap();
        store
            .read(|t| {
                assert!(t.role_by_name(ROLE_GROUP_OWNER).is_some());
                for p in Permission::ALL {
                    assert!(t.permission_by_name(p.as_str()).is_some());
                }
            })
            .unwrap();
    }

    #[test]
    fn default_grants_follow_roles() {
        let store = SharedStore::in_memory();
        seed_roles_and_permissions(&store).unwrap();
        assign_role(&store, "admin-1", ROLE_ADMIN).unwrap();
        assign_role(&store, "player-1", ROLE_PLAYER).unwrap();
        assign_role(&store, "owner-1", ROLE_GROUP_OWNER).unwrap();

        assert_eq!(permissions_of(&store, "admin-1").unwrap().len(), 17);
        let player = permissions_of(&store, "player-1").unwrap();
        assert!(player.contains(&"create_sessions".to_string()));
        assert!(!player.contains(&"delete_courts".to_string()));
        assert!(permissions_of(&store, "owner-1").unwrap().is_empty());
    }

    #[test]
    fn assigning_unknown_role_is_not_found() {
        let store = SharedStore::in_memory();
        seed_roles_and_permissions(&store).unwrap();
        let err = assign_role(&store, "u1", "superuser").unwrap_err();
        assert_eq!(err.code_str(), "role_not_found");
        assert!(roles_of(&store, "u1").unwrap().is_empty());
    }
}
