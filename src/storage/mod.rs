//!
//! courtbook storage module
//! ------------------------
//! In-process relational store holding the identity, role/permission and session
//! tables. The public API centers around `SharedStore`, a cloneable handle that the
//! entry point constructs once and injects into every component.
//!
//! Key responsibilities:
//! - Scoped multi-row transactions: the closure runs on a private copy under the
//!   write lock and is published only when it returns `Ok` (rollback otherwise).
//! - Per-session row locks so writers to the same session serialize while writers
//!   to different sessions proceed in parallel (see `SessionTx`).
//! - Optional JSON snapshot persistence under a data directory.
//! - An availability switch modelling an unreachable database.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use thiserror::Error;
use tracing::{debug, info};

mod session_tx;
mod tables;

pub use session_tx::SessionTx;
pub use tables::Tables;

const SNAPSHOT_FILE: &str = "store.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable")]
    Unavailable,
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("slot total overflows for session {0}")]
    Overflow(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Backing state behind a `SharedStore` handle.
pub struct Store {
    tables: RwLock<Tables>,
    /// Session id -> exclusive row lock. Entries are created on first use.
    row_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    available: AtomicBool,
    /// Snapshot directory; `None` keeps everything in memory.
    data_dir: Option<PathBuf>,
}

#[derive(Clone)]
pub struct SharedStore(pub Arc<Store>);

impl SharedStore {
    /// Empty store without persistence.
    pub fn in_memory() -> Self {
        Self::with_tables(Tables::default(), None)
    }

    /// Open (or create) a store persisted under `dir`. An existing snapshot is loaded.
    pub fn open<P: AsRef<Path>>(dir: P) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let snapshot = dir.join(SNAPSHOT_FILE);
        let tables = if snapshot.exists() {
            let bytes = fs::read(&snapshot)?;
            let t: Tables = serde_json::from_slice(&bytes)?;
            info!(target: "courtbook::storage", "loaded snapshot '{}'", snapshot.display());
            t
        } else {
            Tables::default()
        };
        Ok(Self::with_tables(tables, Some(dir)))
    }

    fn with_tables(tables: Tables, data_dir: Option<PathBuf>) -> Self {
        SharedStore(Arc::new(Store {
            tables: RwLock::new(tables),
            row_locks: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            data_dir,
        }))
    }

    pub fn data_dir(&self) -> Option<&Path> { self.0.data_dir.as_deref() }

    /// Toggle availability. While unavailable every read and commit fails.
    pub fn set_available(&self, available: bool) {
        self.0.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool { self.0.available.load(Ordering::SeqCst) }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.is_available() { Ok(()) } else { Err(StoreError::Unavailable) }
    }

    /// Run a read-only query against committed state.
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> StoreResult<R> {
        self.ensure_available()?;
        let guard = self.0.tables.read();
        Ok(f(&guard))
    }

    /// Run a multi-row mutation atomically.
    ///
    /// The closure works on a copy of the tables taken under an upgradable read
    /// lock: transactions are serialized, readers are not. When it returns `Ok`
    /// the copy is persisted (if configured) and the lock is upgraded only to
    /// swap it in; on `Err` the copy is discarded and nothing is visible to
    /// other readers.
    ///
    /// Each commit clones every table and, with a data dir, rewrites the whole
    /// snapshot with blocking `std::fs` calls on the caller's thread. That is
    /// sized for a club-scale dataset, not for large tables.
    pub fn transaction<R, E>(&self, f: impl FnOnce(&mut Tables) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        self.ensure_available()?;
        let guard = self.0.tables.upgradable_read();
        let mut work = (*guard).clone();
        let out = match f(&mut work) {
            Ok(out) => out,
            Err(e) => {
                debug!(target: "courtbook::storage", "transaction rolled back");
                return Err(e);
            }
        };
        // re-check: availability may have dropped while the closure ran
        self.ensure_available()?;
        self.persist(&work)?;
        *RwLockUpgradableReadGuard::upgrade(guard) = work;
        Ok(out)
    }

    /// Acquire the exclusive row lock of one session and open a transaction on it.
    ///
    /// Returns `Ok(None)` when the session does not exist (or was deleted while
    /// waiting for the lock).
    pub async fn lock_session(&self, session_id: &str) -> StoreResult<Option<SessionTx>> {
        if !self.read(|t| t.session(session_id).is_some())? {
            return Ok(None);
        }
        let lock = self.row_lock(session_id);
        let guard = lock.lock_owned().await;
        let Some(session) = self.read(|t| t.session(session_id).cloned())? else {
            return Ok(None);
        };
        debug!(target: "courtbook::storage", "row lock acquired session={}", session_id);
        Ok(Some(SessionTx::new(self.clone(), session, guard)))
    }

    fn row_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.0.row_locks.lock();
        locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    pub(crate) fn forget_row_lock(&self, session_id: &str) {
        self.0.row_locks.lock().remove(session_id);
    }

    fn persist(&self, tables: &Tables) -> StoreResult<()> {
        let Some(dir) = self.0.data_dir.as_ref() else { return Ok(()); };
        let bytes = serde_json::to_vec_pretty(tables)?;
        let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
