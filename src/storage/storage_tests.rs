use super::*;
use crate::model::{ApprovalStatus, AttendeeRecord, SessionRecord, SessionStatus};

fn session(id: &str, max: i64) -> SessionRecord {
    SessionRecord {
        id: id.into(),
        description: "evening rally".into(),
        status: SessionStatus::Open,
        max_members: max,
        date_time: None,
        created_by: "owner".into(),
    }
}

fn attendee(sid: &str, uid: &str, slot: i64) -> AttendeeRecord {
    AttendeeRecord { session_id: sid.into(), user_id: uid.into(), slot, status: ApprovalStatus::Approved, remark: String::new() }
}

#[test]
fn readers_see_committed_state_while_a_transaction_runs() {
    let store = SharedStore::in_memory();
    store
        .transaction(|t| {
            t.insert_session(session("s1", 4));
            // a plain read does not wait for the open transaction
            assert!(store.read(|c| c.session("s1").is_none()).unwrap());
            Ok::<_, StoreError>(())
        })
        .unwrap();
    assert!(store.read(|t| t.session("s1").is_some()).unwrap());
}

#[test]
fn failed_transaction_leaves_no_trace() {
    let store = SharedStore::in_memory();
    let res: StoreResult<()> = store.transaction(|t| {
        t.insert_session(session("s1", 4));
        Err(StoreError::Io(std::io::Error::other("boom")))
    });
    assert!(res.is_err());
    assert!(store.read(|t| t.session("s1").is_none()).unwrap());
}

#[test]
fn join_chain_grants_through_any_role() {
    let store = SharedStore::in_memory();
    store
        .transaction(|t| {
            let viewer = t.ensure_role("viewer");
            let editor = t.ensure_role("editor");
            let list = t.ensure_permission("list_sessions");
            let edit = t.ensure_permission("edit_sessions");
            t.grant(&viewer, &list);
            t.grant(&editor, &edit);
            t.add_user_role("u1", &viewer);
            t.add_user_role("u1", &editor);
            Ok::<_, StoreError>(())
        })
        .unwrap();
    store
        .read(|t| {
            assert!(t.user_has_permission("u1", "list_sessions"));
            assert!(t.user_has_permission("u1", "edit_sessions"));
            assert!(!t.user_has_permission("u1", "delete_sessions"));
            assert!(!t.user_has_permission("u2", "list_sessions"));
            assert_eq!(t.permission_names_of("u1").len(), 2);
        })
        .unwrap();
}

#[test]
fn clearing_roles_only_touches_one_user() {
    let store = SharedStore::in_memory();
    store
        .transaction(|t| {
            let r = t.ensure_role("player");
            t.add_user_role("a", &r);
            t.add_user_role("b", &r);
            t.clear_user_roles("a");
            Ok::<_, StoreError>(())
        })
        .unwrap();
    store
        .read(|t| {
            assert!(t.role_names_of("a").is_empty());
            assert_eq!(t.role_names_of("b"), vec!["player".to_string()]);
        })
        .unwrap();
}

#[test]
fn unavailable_store_rejects_reads_and_writes() {
    let store = SharedStore::in_memory();
    store.set_available(false);
    assert!(matches!(store.read(|_| ()), Err(StoreError::Unavailable)));
    let res = store.transaction(|t| {
        t.insert_session(session("s1", 2));
        Ok::<_, StoreError>(())
    });
    assert!(matches!(res, Err(StoreError::Unavailable)));
    store.set_available(true);
    assert!(store.read(|t| t.session("s1").is_none()).unwrap());
}

#[tokio::test]
async fn dropped_session_tx_rolls_back() {
    let store = SharedStore::in_memory();
    store.transaction(|t| { t.insert_session(session("s1", 4)); Ok::<_, StoreError>(()) }).unwrap();
    {
        let mut tx = store.lock_session("s1").await.unwrap().unwrap();
        tx.insert_attendee(attendee("s1", "u1", 2));
        assert_eq!(tx.approved_slots().unwrap(), 2);
    }
    assert_eq!(store.read(|t| t.approved_slots("s1")).unwrap(), Some(0));

    let mut tx = store.lock_session("s1").await.unwrap().unwrap();
    tx.insert_attendee(attendee("s1", "u1", 2));
    tx.commit().unwrap();
    assert_eq!(store.read(|t| t.approved_slots("s1")).unwrap(), Some(2));
}

#[tokio::test]
async fn slot_totals_that_overflow_are_reported_not_wrapped() {
    let store = SharedStore::in_memory();
    store
        .transaction(|t| {
            t.insert_session(session("s1", 4));
            t.insert_attendee(attendee("s1", "u1", i64::MAX));
            t.insert_attendee(attendee("s1", "u2", 1));
            Ok::<_, StoreError>(())
        })
        .unwrap();
    assert_eq!(store.read(|t| t.approved_slots("s1")).unwrap(), None);
    let res = store.read(|t| t.checked_approved_slots("s1")).unwrap();
    assert!(matches!(res, Err(StoreError::Overflow(ref sid)) if sid == "s1"));

    let tx = store.lock_session("s1").await.unwrap().unwrap();
    assert!(matches!(tx.approved_slots(), Err(StoreError::Overflow(_))));
}

#[tokio::test]
async fn lock_session_on_missing_row_is_none() {
    let store = SharedStore::in_memory();
    assert!(store.lock_session("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn same_session_lock_is_exclusive_other_sessions_are_not() {
    let store = SharedStore::in_memory();
    store
        .transaction(|t| {
            t.insert_session(session("s1", 4));
            t.insert_session(session("s2", 4));
            Ok::<_, StoreError>(())
        })
        .unwrap();
    let held = store.lock_session("s1").await.unwrap().unwrap();

    let other = tokio::time::timeout(std::time::Duration::from_millis(200), store.lock_session("s2")).await;
    assert!(other.is_ok(), "a different session must not block");

    let same = tokio::time::timeout(std::time::Duration::from_millis(50), store.lock_session("s1")).await;
    assert!(same.is_err(), "the same session must wait for the holder");
    drop(held);

    let same = tokio::time::timeout(std::time::Duration::from_millis(200), store.lock_session("s1")).await;
    assert!(same.is_ok());
}

#[tokio::test]
async fn deleting_session_removes_its_reservations() {
    let store = SharedStore::in_memory();
    store.transaction(|t| { t.insert_session(session("s1", 4)); Ok::<_, StoreError>(()) }).unwrap();
    let mut tx = store.lock_session("s1").await.unwrap().unwrap();
    tx.insert_attendee(attendee("s1", "u1", 1));
    tx.commit().unwrap();

    let mut tx = store.lock_session("s1").await.unwrap().unwrap();
    tx.delete_session();
    tx.commit().unwrap();
    store
        .read(|t| {
            assert!(t.session("s1").is_none());
            assert!(t.attendee("s1", "u1").is_none());
            assert!(t.sessions_attended_by("u1").is_empty());
        })
        .unwrap();
    assert!(store.lock_session("s1").await.unwrap().is_none());
}

#[test]
fn snapshot_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let store = SharedStore::open(tmp.path()).unwrap();
        store
            .transaction(|t| {
                t.insert_session(session("s1", 6));
                t.insert_attendee(attendee("s1", "u1", 3));
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }
    let reopened = SharedStore::open(tmp.path()).unwrap();
    assert_eq!(reopened.read(|t| t.approved_slots("s1")).unwrap(), Some(3));
    assert_eq!(reopened.data_dir(), Some(tmp.path()));
}
