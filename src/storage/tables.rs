use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{StoreError, StoreResult};
use crate::model::{
    ApprovalStatus, AttendeeRecord, PermissionRecord, RoleRecord, SessionRecord, SessionStatus, UserRecord,
};

/// The relational tables. Join tables are sets of `(left_id, right_id)` pairs so
/// a user's memberships are a contiguous range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    roles: BTreeMap<String, RoleRecord>,
    #[serde(default)]
    permissions: BTreeMap<String, PermissionRecord>,
    /// (user_id, role_id)
    #[serde(default)]
    user_roles: BTreeSet<(String, String)>,
    /// (role_id, permission_id)
    #[serde(default)]
    role_permissions: BTreeSet<(String, String)>,
    #[serde(default)]
    sessions: BTreeMap<String, SessionRecord>,
    /// session_id -> user_id -> reservation
    #[serde(default)]
    attendees: BTreeMap<String, BTreeMap<String, AttendeeRecord>>,
}

fn pairs_from<'a>(set: &'a BTreeSet<(String, String)>, left: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    set.range((left.to_string(), String::new())..)
        .take_while(move |(l, _)| l == left)
        .map(|(_, r)| r.as_str())
}

impl Tables {
    // --- users ---

    pub fn user(&self, id: &str) -> Option<&UserRecord> { self.users.get(id) }

    pub fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.users.values().find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn insert_user(&mut self, user: UserRecord) { self.users.insert(user.id.clone(), user); }

    pub fn set_primary_role(&mut self, user_id: &str, role: &str) -> bool {
        match self.users.get_mut(user_id) {
            Some(u) => { u.primary_role = role.to_string(); true }
            None => false,
        }
    }

    // --- roles & permissions ---

    pub fn role_by_name(&self, name: &str) -> Option<&RoleRecord> { self.roles.values().find(|r| r.name == name) }

    pub fn permission_by_name(&self, name: &str) -> Option<&PermissionRecord> {
        self.permissions.values().find(|p| p.name == name)
    }

    /// Insert a role unless one with the same name exists. Returns the role id.
    pub fn ensure_role(&mut self, name: &str) -> String {
        if let Some(r) = self.role_by_name(name) { return r.id.clone(); }
        let id = uuid::Uuid::new_v4().to_string();
        self.roles.insert(id.clone(), RoleRecord { id: id.clone(), name: name.to_string() });
        id
    }

    /// Insert a permission unless one with the same name exists. Returns the permission id.
    pub fn ensure_permission(&mut self, name: &str) -> String {
        if let Some(p) = self.permission_by_name(name) { return p.id.clone(); }
        let id = uuid::Uuid::new_v4().to_string();
        self.permissions.insert(id.clone(), PermissionRecord { id: id.clone(), name: name.to_string() });
        id
    }

    pub fn grant(&mut self, role_id: &str, permission_id: &str) {
        self.role_permissions.insert((role_id.to_string(), permission_id.to_string()));
    }

    pub fn add_user_role(&mut self, user_id: &str, role_id: &str) {
        self.user_roles.insert((user_id.to_string(), role_id.to_string()));
    }

    pub fn remove_user_role(&mut self, user_id: &str, role_id: &str) -> bool {
        self.user_roles.remove(&(user_id.to_string(), role_id.to_string()))
    }

    pub fn clear_user_roles(&mut self, user_id: &str) {
        let held: Vec<String> = pairs_from(&self.user_roles, user_id).map(str::to_string).collect();
        for role_id in held {
            self.user_roles.remove(&(user_id.to_string(), role_id));
        }
    }

    /// Names of every role the user is a member of.
    pub fn role_names_of(&self, user_id: &str) -> Vec<String> {
        pairs_from(&self.user_roles, user_id)
            .filter_map(|rid| self.roles.get(rid))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Names of every permission granted through any of the user's roles.
    pub fn permission_names_of(&self, user_id: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for rid in pairs_from(&self.user_roles, user_id) {
            for pid in pairs_from(&self.role_permissions, rid) {
                if let Some(p) = self.permissions.get(pid) { out.insert(p.name.clone()); }
            }
        }
        out
    }

    /// `user_roles ⋈ role_permissions ⋈ permissions(name)`; true when any held role qualifies.
    pub fn user_has_permission(&self, user_id: &str, permission: &str) -> bool {
        let Some(perm) = self.permission_by_name(permission) else { return false; };
        pairs_from(&self.user_roles, user_id)
            .any(|rid| self.role_permissions.contains(&(rid.to_string(), perm.id.clone())))
    }

    /// `user_roles ⋈ roles(name)`.
    pub fn user_has_role(&self, user_id: &str, role: &str) -> bool {
        pairs_from(&self.user_roles, user_id).any(|rid| self.roles.get(rid).is_some_and(|r| r.name == role))
    }

    // --- sessions & attendance ---

    pub fn session(&self, id: &str) -> Option<&SessionRecord> { self.sessions.get(id) }

    pub fn insert_session(&mut self, session: SessionRecord) { self.sessions.insert(session.id.clone(), session); }

    pub fn set_session_status(&mut self, id: &str, status: SessionStatus) -> bool {
        match self.sessions.get_mut(id) {
            Some(s) => { s.status = status; true }
            None => false,
        }
    }

    /// Delete a session together with its reservations.
    pub fn remove_session(&mut self, id: &str) -> Option<SessionRecord> {
        self.attendees.remove(id);
        self.sessions.remove(id)
    }

    pub fn attendee(&self, session_id: &str, user_id: &str) -> Option<&AttendeeRecord> {
        self.attendees.get(session_id).and_then(|m| m.get(user_id))
    }

    pub fn attendees_of(&self, session_id: &str) -> Vec<AttendeeRecord> {
        self.attendees.get(session_id).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    /// Σ slot over approved reservations of the session. `None` when the sum
    /// does not fit in an i64.
    pub fn approved_slots(&self, session_id: &str) -> Option<i64> {
        match self.attendees.get(session_id) {
            Some(m) => m
                .values()
                .filter(|a| a.status == ApprovalStatus::Approved)
                .try_fold(0i64, |acc, a| acc.checked_add(a.slot)),
            None => Some(0),
        }
    }

    /// `approved_slots` with overflow reported as a store error.
    pub fn checked_approved_slots(&self, session_id: &str) -> StoreResult<i64> {
        self.approved_slots(session_id).ok_or_else(|| StoreError::Overflow(session_id.to_string()))
    }

    pub fn insert_attendee(&mut self, rec: AttendeeRecord) {
        self.attendees.entry(rec.session_id.clone()).or_default().insert(rec.user_id.clone(), rec);
    }

    pub fn remove_attendee(&mut self, session_id: &str, user_id: &str) -> Option<AttendeeRecord> {
        let m = self.attendees.get_mut(session_id)?;
        let removed = m.remove(user_id);
        if m.is_empty() {
            self.attendees.remove(session_id);
        }
        removed
    }

    /// Sessions the user holds a reservation in, ordered by session id.
    pub fn sessions_attended_by(&self, user_id: &str) -> Vec<SessionRecord> {
        self.attendees
            .iter()
            .filter(|(_, m)| m.contains_key(user_id))
            .filter_map(|(sid, _)| self.sessions.get(sid).cloned())
            .collect()
    }
}
