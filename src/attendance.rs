//! Capacity allocation for session attendance.
//!
//! `reserve` is the only path that can raise a session's occupancy. It runs
//! under the session's exclusive row lock, so the occupancy it reads cannot move
//! until its own insert is committed or discarded:
//!
//! ```text
//! lock row -> status gate -> slot check -> duplicate check -> Σ approved -> capacity check -> insert -> commit
//! ```
//!
//! Reservations against different sessions take different locks and proceed in
//! parallel. `release` only ever lowers occupancy and therefore skips the row lock.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error};

use crate::error::{AppError, AppResult};
use crate::model::{ApprovalStatus, AttendeeRecord};
use crate::storage::SharedStore;

#[derive(Clone)]
pub struct CapacityAllocator {
    store: SharedStore,
    timeout: Duration,
}

fn session_not_found(session_id: &str) -> AppError {
    AppError::not_found("session_not_found", format!("session '{}' does not exist", session_id))
}

impl CapacityAllocator {
    pub fn new(store: SharedStore, timeout: Duration) -> Self { Self { store, timeout } }

    pub fn store(&self) -> &SharedStore { &self.store }

    /// Run `fut` under the request deadline. On expiry the future is dropped, which
    /// drops any open `SessionTx` and with it every staged write.
    async fn with_deadline<T>(&self, op: &str, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                error!(target: "courtbook::attendance", "{} timed out after {:?}", op, self.timeout);
                Err(AppError::internal("timeout", format!("{} did not finish in time", op)))
            }
        }
    }

    /// Reserve `slot` places of `session_id` for `user_id`. Exactly one row per
    /// user and session; the sum of approved slots never exceeds `max_members`.
    pub async fn reserve(&self, session_id: &str, user_id: &str, slot: i64) -> AppResult<AttendeeRecord> {
        let rec = self.with_deadline("reserve", self.reserve_locked(session_id, user_id, slot)).await;
        match &rec {
            Ok(r) => debug!(target: "courtbook::attendance", "reserved session={} user={} slot={}", session_id, user_id, r.slot),
            Err(e) if e.is_recoverable() => {
                debug!(target: "courtbook::attendance", "reserve rejected session={} user={}: {}", session_id, user_id, e)
            }
            Err(e) => error!(target: "courtbook::attendance", "reserve failed session={} user={}: {}", session_id, user_id, e),
        }
        rec
    }

    async fn reserve_locked(&self, session_id: &str, user_id: &str, slot: i64) -> AppResult<AttendeeRecord> {
        let Some(mut tx) = self.store.lock_session(session_id).await? else {
            return Err(session_not_found(session_id));
        };
        if !tx.session().can_attend() {
            return Err(AppError::conflict("not_open", format!("session is {}", tx.session().status)));
        }
        if slot <= 0 {
            return Err(AppError::validation("invalid_slot", "slot must be positive"));
        }
        if tx.attendee(user_id)?.is_some() {
            return Err(AppError::conflict("duplicate", "already attending this session"));
        }
        let occupied = tx.approved_slots()?;
        let max = tx.session().max_members;
        // an unrepresentable total can never fit
        let fits = occupied.checked_add(slot).is_some_and(|total| total <= max);
        if !fits {
            return Err(AppError::conflict(
                "session_full",
                format!("{} of {} places taken, {} requested", occupied, max, slot),
            ));
        }
        let rec = AttendeeRecord {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            slot,
            status: ApprovalStatus::Approved,
            remark: String::new(),
        };
        tx.insert_attendee(rec.clone());
        tx.commit()?;
        Ok(rec)
    }

    /// Drop the user's reservation. Only allowed while the session is open.
    pub async fn release(&self, session_id: &str, user_id: &str) -> AppResult<AttendeeRecord> {
        let store = self.store.clone();
        let out = self
            .with_deadline("release", async move {
                store.transaction(|t| {
                    let session = t.session(session_id).ok_or_else(|| session_not_found(session_id))?;
                    if !session.can_attend() {
                        return Err(AppError::conflict("not_open", format!("session is {}", session.status)));
                    }
                    t.remove_attendee(session_id, user_id).ok_or_else(|| {
                        AppError::not_found("attendance_not_found", "no reservation for this user and session")
                    })
                })
            })
            .await;
        if let Ok(rec) = &out {
            debug!(target: "courtbook::attendance", "released session={} user={} slot={}", session_id, user_id, rec.slot);
        }
        out
    }

    /// Current Σ of approved slots.
    pub fn occupancy(&self, session_id: &str) -> AppResult<i64> {
        let found = self.store.read(|t| t.session(session_id).map(|_| t.checked_approved_slots(session_id)))?;
        match found {
            Some(total) => Ok(total?),
            None => Err(session_not_found(session_id)),
        }
    }
}

#[cfg(test)]
#[path = "attendance_tests.rs"]
mod attendance_tests;
