use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::{SharedStore, StoreError, StoreResult};
use crate::model::{ApprovalStatus, AttendeeRecord, SessionRecord, SessionStatus};

#[derive(Debug)]
enum Staged {
    InsertAttendee(AttendeeRecord),
    SetStatus(SessionStatus),
    DeleteSession,
}

/// Transaction scoped to one session row.
///
/// Holds the session's exclusive row lock for its whole lifetime, so reads made
/// through it cannot race another writer of the same session. Writes are staged
/// and published by `commit`; dropping the transaction without committing (early
/// return, error, timeout cancellation) discards them.
pub struct SessionTx {
    store: SharedStore,
    session: SessionRecord,
    staged: Vec<Staged>,
    committed: bool,
    _row: OwnedMutexGuard<()>,
}

impl SessionTx {
    pub(super) fn new(store: SharedStore, session: SessionRecord, row: OwnedMutexGuard<()>) -> Self {
        Self { store, session, staged: Vec::new(), committed: false, _row: row }
    }

    /// The session row as read after the lock was taken.
    pub fn session(&self) -> &SessionRecord { &self.session }

    pub fn attendee(&self, user_id: &str) -> StoreResult<Option<AttendeeRecord>> {
        let staged = self.staged.iter().find_map(|s| match s {
            Staged::InsertAttendee(a) if a.user_id == user_id => Some(a.clone()),
            _ => None,
        });
        if staged.is_some() {
            return Ok(staged);
        }
        let sid = self.session.id.as_str();
        self.store.read(|t| t.attendee(sid, user_id).cloned())
    }

    /// Σ approved slots, including reservations staged in this transaction.
    pub fn approved_slots(&self) -> StoreResult<i64> {
        let sid = self.session.id.as_str();
        let committed = self.store.read(|t| t.checked_approved_slots(sid))??;
        self.staged
            .iter()
            .try_fold(committed, |acc, s| match s {
                Staged::InsertAttendee(a) if a.status == ApprovalStatus::Approved => acc.checked_add(a.slot),
                _ => Some(acc),
            })
            .ok_or_else(|| StoreError::Overflow(sid.to_string()))
    }

    pub fn insert_attendee(&mut self, rec: AttendeeRecord) {
        self.staged.push(Staged::InsertAttendee(rec));
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.session.status = status;
        self.staged.push(Staged::SetStatus(status));
    }

    pub fn delete_session(&mut self) {
        self.staged.push(Staged::DeleteSession);
    }

    /// Publish every staged write in one store transaction.
    pub fn commit(mut self) -> StoreResult<()> {
        let sid = self.session.id.clone();
        let staged = std::mem::take(&mut self.staged);
        let deleted = staged.iter().any(|s| matches!(s, Staged::DeleteSession));
        self.store.transaction(|t| {
            for op in staged {
                match op {
                    Staged::InsertAttendee(rec) => t.insert_attendee(rec),
                    Staged::SetStatus(status) => { t.set_session_status(&sid, status); }
                    Staged::DeleteSession => { t.remove_session(&sid); }
                }
            }
            Ok::<(), super::StoreError>(())
        })?;
        self.committed = true;
        if deleted {
            self.store.forget_row_lock(&sid);
        }
        debug!(target: "courtbook::storage", "session tx committed session={}", sid);
        Ok(())
    }
}

impl Drop for SessionTx {
    fn drop(&mut self) {
        if !self.committed && !self.staged.is_empty() {
            debug!(target: "courtbook::storage", "session tx rolled back session={} staged={}", self.session.id, self.staged.len());
        }
    }
}
