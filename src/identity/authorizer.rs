use tracing::{debug, error};

use super::{Principal, RequestContext};
use crate::error::{AppError, AppResult};
use crate::model::ROLE_ADMIN;
use crate::security::Permission;
use crate::storage::{SharedStore, StoreError};

/// Permission and admin checks against the live role tables.
///
/// Nothing is cached between calls: every check reads the current `user_roles`
/// and `role_permissions` rows, so grants and revocations apply to the next request.
#[derive(Clone)]
pub struct AccessGuard {
    store: SharedStore,
}

fn fail_closed(e: StoreError) -> AppError {
    error!(target: "courtbook::identity", "authorization read failed, rejecting: {}", e);
    AppError::from(e)
}

impl AccessGuard {
    pub fn new(store: SharedStore) -> Self { Self { store } }

    pub fn store(&self) -> &SharedStore { &self.store }

    /// OR across every role the principal holds. A name outside the seeded catalog
    /// is a configuration error, not a denial.
    pub fn has_permission(&self, principal_id: &str, permission: &str) -> AppResult<bool> {
        let perm: Permission = permission.parse()?;
        self.has(principal_id, perm)
    }

    pub fn has(&self, principal_id: &str, perm: Permission) -> AppResult<bool> {
        let name = perm.as_str();
        let (known, granted) = self
            .store
            .read(|t| (t.permission_by_name(name).is_some(), t.user_has_permission(principal_id, name)))
            .map_err(fail_closed)?;
        if !known {
            error!(target: "courtbook::identity", "permission '{}' missing from catalog; seed not run?", name);
            return Err(AppError::internal("unknown_permission", format!("permission '{}' is not seeded", name)));
        }
        Ok(granted)
    }

    /// Admin check against one snapshot: the denormalized `primary_role` must say
    /// admin and membership in the admin role must be present in `user_roles`.
    pub fn is_admin(&self, principal_id: &str) -> AppResult<bool> {
        let (primary_admin, member) = self
            .store
            .read(|t| {
                let primary_admin = t.user(principal_id).is_some_and(|u| u.primary_role == ROLE_ADMIN);
                (primary_admin, primary_admin && t.user_has_role(principal_id, ROLE_ADMIN))
            })
            .map_err(fail_closed)?;
        if !primary_admin {
            return Ok(false);
        }
        if !member {
            debug!(target: "courtbook::identity", "primary role says admin but membership is gone user={}", principal_id);
        }
        Ok(member)
    }

    /// Gate an operation on one permission. Unauthenticated callers get 401, callers
    /// without the permission 403.
    pub fn require_permission<'a>(&self, ctx: &'a RequestContext, perm: Permission) -> AppResult<&'a Principal> {
        let principal = ctx.require_principal()?;
        if self.has(&principal.user_id, perm)? {
            return Ok(principal);
        }
        debug!(target: "courtbook::identity", "denied user={} permission={}", principal.user_id, perm);
        Err(AppError::authorization("insufficient_permission", format!("missing permission '{}'", perm)))
    }

    pub fn require_admin<'a>(&self, ctx: &'a RequestContext) -> AppResult<&'a Principal> {
        let principal = ctx.require_principal()?;
        // the token's role claim is a free first reject; the store decides
        if principal.role == ROLE_ADMIN && self.is_admin(&principal.user_id)? {
            return Ok(principal);
        }
        debug!(target: "courtbook::identity", "admin required user={}", principal.user_id);
        Err(AppError::authorization("admin_required", "admin role required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{UserRecord, ROLE_GROUP_OWNER, ROLE_PLAYER};
    use crate::security::{assign_role, seed_roles_and_permissions};

    fn seeded() -> AccessGuard {
        let store = SharedStore::in_memory();
        seed_roles_and_permissions(&store).unwrap();
        AccessGuard::new(store)
    }

    fn add_user(guard: &AccessGuard, id: &str, primary: &str) {
        guard
            .store()
            .transaction(|t| {
                t.insert_user(UserRecord {
                    id: id.into(),
                    email: format!("{}@example.com", id),
                    name: id.into(),
                    primary_role: primary.into(),
                    avatar_url: None,
                    created_at: chrono::Utc::now(),
                });
                Ok::<_, AppError>(())
            })
            .unwrap();
    }

    #[test]
    fn permission_is_or_across_roles() {
        let g = seeded();
        assign_role(g.store(), "u1", ROLE_GROUP_OWNER).unwrap();
        assert!(!g.has_permission("u1", "list_courts").unwrap());
        assign_role(g.store(), "u1", ROLE_PLAYER).unwrap();
        assert!(g.has_permission("u1", "list_courts").unwrap());
        assert!(!g.has_permission("u1", "delete_courts").unwrap());
    }

    #[test]
    fn unknown_permission_is_configuration_error() {
        let g = seeded();
        let err = g.has_permission("u1", "fly").unwrap_err();
        assert_eq!(err.http_status(), 500);

        let unseeded = AccessGuard::new(SharedStore::in_memory());
        assert_eq!(unseeded.has("u1", Permission::ListUsers).unwrap_err().code_str(), "unknown_permission");
    }

    #[test]
    fn admin_needs_both_primary_role_and_membership() {
        let g = seeded();
        add_user(&g, "a", ROLE_ADMIN);
        assert!(!g.is_admin("a").unwrap(), "primary role alone is not enough");
        assign_role(g.store(), "a", ROLE_ADMIN).unwrap();
        assert!(g.is_admin("a").unwrap());

        add_user(&g, "b", ROLE_PLAYER);
        assign_role(g.store(), "b", ROLE_ADMIN).unwrap();
        assert!(!g.is_admin("b").unwrap(), "stale primary role rejects on the fast path");
        assert!(!g.is_admin("nobody").unwrap());
    }

    #[test]
    fn admin_check_never_mixes_two_states() {
        // neither state is an admin: A has the primary role only, B the membership only
        let g = seeded();
        add_user(&g, "a", ROLE_ADMIN);
        let admin_id = g.store().read(|t| t.role_by_name(ROLE_ADMIN).map(|r| r.id.clone())).unwrap().unwrap();

        let flipper = {
            let store = g.store().clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    store
                        .transaction(|t| {
                            if i % 2 == 0 {
                                t.set_primary_role("a", ROLE_PLAYER);
                                t.add_user_role("a", &admin_id);
                            } else {
                                t.set_primary_role("a", ROLE_ADMIN);
                                t.remove_user_role("a", &admin_id);
                            }
                            Ok::<_, AppError>(())
                        })
                        .unwrap();
                }
            })
        };
        while !flipper.is_finished() {
            assert!(!g.is_admin("a").unwrap());
        }
        flipper.join().unwrap();
        assert!(!g.is_admin("a").unwrap());
    }

    #[test]
    fn store_failure_rejects() {
        let g = seeded();
        add_user(&g, "a", ROLE_ADMIN);
        assign_role(g.store(), "a", ROLE_ADMIN).unwrap();
        g.store().set_available(false);
        assert!(g.is_admin("a").is_err());
        let ctx = RequestContext::authenticated(Principal::local("a", ROLE_ADMIN));
        assert!(g.require_admin(&ctx).is_err());
        assert!(g.require_permission(&ctx, Permission::ListUsers).is_err());
    }

    #[test]
    fn require_permission_distinguishes_401_and_403() {
        let g = seeded();
        assign_role(g.store(), "p", ROLE_PLAYER).unwrap();
        let anon = RequestContext::anonymous();
        assert_eq!(g.require_permission(&anon, Permission::ListSessions).unwrap_err().http_status(), 401);

        let ctx = RequestContext::authenticated(Principal::local("p", ROLE_PLAYER));
        assert_eq!(g.require_permission(&ctx, Permission::ListSessions).unwrap().user_id, "p");
        let err = g.require_permission(&ctx, Permission::DeleteUsers).unwrap_err();
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.code_str(), "insufficient_permission");
    }
}
