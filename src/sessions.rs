//! Session rows: creation, status changes, deletion and read views.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::identity::{AccessGuard, RequestContext};
use crate::model::{SessionDetail, SessionRecord, SessionStatus};
use crate::security::Permission;
use crate::storage::SharedStore;

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    #[serde(default)]
    pub description: String,
    pub max_members: i64,
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SessionService {
    store: SharedStore,
    guard: AccessGuard,
}

fn not_found(id: &str) -> AppError {
    AppError::not_found("session_not_found", format!("session '{}' does not exist", id))
}

impl SessionService {
    pub fn new(store: SharedStore, guard: AccessGuard) -> Self { Self { store, guard } }

    /// Create an open session owned by the caller. Requires `create_sessions`.
    pub fn create_session(&self, ctx: &RequestContext, new: NewSession) -> AppResult<SessionRecord> {
        let principal = self.guard.require_permission(ctx, Permission::CreateSessions)?;
        if new.max_members <= 0 {
            return Err(AppError::validation("invalid_max_members", "max_members must be positive"));
        }
        let session = SessionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            description: new.description,
            status: SessionStatus::Open,
            max_members: new.max_members,
            date_time: new.date_time,
            created_by: principal.user_id.clone(),
        };
        let row = session.clone();
        self.store.transaction(move |t| {
            t.insert_session(row);
            Ok::<_, AppError>(())
        })?;
        info!(target: "courtbook::server", "session created id={} by={} max={}", session.id, session.created_by, session.max_members);
        Ok(session)
    }

    /// Admin-only status change under the session row lock. Setting the current
    /// status again is a conflict; any other transition is accepted.
    pub async fn update_session_status(&self, ctx: &RequestContext, session_id: &str, status: SessionStatus) -> AppResult<SessionRecord> {
        self.guard.require_admin(ctx)?;
        let Some(mut tx) = self.store.lock_session(session_id).await? else {
            return Err(not_found(session_id));
        };
        if tx.session().status == status {
            return Err(AppError::conflict("status_unchanged", format!("session is already {}", status)));
        }
        let from = tx.session().status;
        tx.set_status(status);
        let updated = tx.session().clone();
        tx.commit()?;
        debug!(target: "courtbook::server", "session status id={} {} -> {}", session_id, from, status);
        Ok(updated)
    }

    /// Delete a session and every reservation in it. Requires `delete_sessions`;
    /// non-admins may only delete sessions they created.
    pub async fn delete_session(&self, ctx: &RequestContext, session_id: &str) -> AppResult<()> {
        let principal = self.guard.require_permission(ctx, Permission::DeleteSessions)?;
        let Some(mut tx) = self.store.lock_session(session_id).await? else {
            return Err(not_found(session_id));
        };
        if tx.session().created_by != principal.user_id && !self.guard.is_admin(&principal.user_id)? {
            return Err(AppError::authorization("not_owner", "only the creator or an admin can delete a session"));
        }
        tx.delete_session();
        tx.commit()?;
        info!(target: "courtbook::server", "session deleted id={} by={}", session_id, principal.user_id);
        Ok(())
    }

    /// Session row with its approved occupancy and attendee list.
    pub fn session_detail(&self, ctx: &RequestContext, session_id: &str) -> AppResult<SessionDetail> {
        self.guard.require_permission(ctx, Permission::ListSessions)?;
        let detail = self.store.read(|t| {
            t.session(session_id).map(|s| {
                t.checked_approved_slots(session_id).map(|occupied| SessionDetail {
                    session: s.clone(),
                    occupied,
                    attendees: t.attendees_of(session_id),
                })
            })
        })?;
        match detail {
            Some(d) => Ok(d?),
            None => Err(not_found(session_id)),
        }
    }

    /// Sessions the caller holds a reservation in.
    pub fn attended_sessions(&self, ctx: &RequestContext) -> AppResult<Vec<SessionRecord>> {
        let principal = ctx.require_principal()?;
        Ok(self.store.read(|t| t.sessions_attended_by(&principal.user_id))?)
    }
}
