//! Crash-recovery breadcrumbs for an in-flight generation run.
//!
//! A breadcrumb row is written before the first model call, upgraded with
//! the full pool once generation finishes, and kept current as selections
//! change. Selection writes are debounced so rapid toggling costs one write;
//! a write coalesced away schedules a trailing flush, so the persisted row
//! converges even if the user stops toggling. The row is cleared whenever
//! the pool is committed to a meal plan, cancelled, or fails; a row that
//! survives to the next startup is either a resumable pool or evidence of
//! an interrupted run.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::database::Database;
use crate::models::{GenerationSession, RecipePool, SelectionSet};

/// What startup found in the session table.
#[derive(Debug)]
pub enum SessionStatus {
    NoSession,
    /// A run died before producing a pool; nothing to restore.
    Interrupted { started_at: DateTime<Utc> },
    /// A completed pool survived; the caller may resume selection.
    Restored {
        pool: RecipePool,
        selections: SelectionSet,
    },
}

struct DebounceState {
    started_at: DateTime<Utc>,
    last_write: Option<Instant>,
    pending: Option<GenerationSession>,
    flush_scheduled: bool,
}

struct TrackerInner {
    db: Arc<Mutex<Database>>,
    debounce: Duration,
    state: Mutex<DebounceState>,
}

impl TrackerInner {
    /// Write any pending session still held by the debounce.
    fn flush(&self) -> Result<()> {
        let pending = {
            let mut state = self.state.lock().unwrap();
            state.flush_scheduled = false;
            let pending = state.pending.take();
            if pending.is_some() {
                state.last_write = Some(Instant::now());
            }
            pending
        };
        match pending {
            Some(session) => self.db.lock().unwrap().write_session(&session),
            None => Ok(()),
        }
    }
}

pub struct SessionTracker {
    inner: Arc<TrackerInner>,
    timeout: ChronoDuration,
}

impl SessionTracker {
    pub fn new(db: Arc<Mutex<Database>>, config: &PlannerConfig) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                db,
                debounce: config.session_debounce,
                state: Mutex::new(DebounceState {
                    started_at: Utc::now(),
                    last_write: None,
                    pending: None,
                    flush_scheduled: false,
                }),
            }),
            timeout: ChronoDuration::minutes(config.session_timeout_minutes),
        }
    }

    /// Inspect the session row left by a previous process, deleting stale
    /// breadcrumbs. A pool-less row older than the timeout is garbage from
    /// a crashed run; a pool-bearing row never goes stale, the user's picks
    /// are worth keeping.
    pub fn startup_check(&self) -> Result<SessionStatus> {
        let db = self.inner.db.lock().unwrap();
        let Some(session) = db.read_session()? else {
            return Ok(SessionStatus::NoSession);
        };

        match session.pool {
            Some(pool) => {
                info!(recipes = pool.len(), "restoring interrupted selection session");
                Ok(SessionStatus::Restored {
                    pool,
                    selections: session.selections,
                })
            }
            None => {
                if Utc::now() - session.started_at > self.timeout {
                    debug!("discarding stale pool-less session breadcrumb");
                    db.clear_session()?;
                    Ok(SessionStatus::NoSession)
                } else {
                    Ok(SessionStatus::Interrupted {
                        started_at: session.started_at,
                    })
                }
            }
        }
    }

    /// Write the breadcrumb marking a run as started. Called before the
    /// first model call so a crash mid-run is detectable.
    pub fn begin(&self, started_at: DateTime<Utc>) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.started_at = started_at;
            state.last_write = None;
            state.pending = None;
        }
        self.inner.db.lock().unwrap().write_session(&GenerationSession {
            started_at,
            pool: None,
            selections: SelectionSet::default(),
        })
    }

    /// Persist the finished pool immediately, bypassing the debounce.
    pub fn commit_pool(&self, pool: &RecipePool, selections: &SelectionSet) -> Result<()> {
        let session = {
            let mut state = self.inner.state.lock().unwrap();
            state.pending = None;
            state.last_write = Some(Instant::now());
            GenerationSession {
                started_at: state.started_at,
                pool: Some(pool.clone()),
                selections: selections.clone(),
            }
        };
        self.inner.db.lock().unwrap().write_session(&session)
    }

    /// Persist a selection change, debounced. A write inside the window is
    /// held pending and flushed by a deferred task once the window elapses;
    /// outside an async runtime the pending write waits for an explicit
    /// [`flush`](Self::flush).
    pub fn persist_selection(&self, pool: &RecipePool, selections: &SelectionSet) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        let session = GenerationSession {
            started_at: state.started_at,
            pool: Some(pool.clone()),
            selections: selections.clone(),
        };
        let now = Instant::now();
        let within_window = matches!(
            state.last_write,
            Some(last) if now.duration_since(last) < self.inner.debounce
        );
        if !within_window {
            state.last_write = Some(now);
            state.pending = None;
            drop(state);
            return self.inner.db.lock().unwrap().write_session(&session);
        }

        state.pending = Some(session);
        if !state.flush_scheduled {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                state.flush_scheduled = true;
                let inner = self.inner.clone();
                let delay = self.inner.debounce;
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(err) = inner.flush() {
                        warn!(error = %err, "deferred session flush failed");
                    }
                });
            }
        }
        Ok(())
    }

    /// Write any selection change still held by the debounce.
    pub fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    /// Remove the session row and forget pending writes.
    pub fn clear(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.pending = None;
            state.last_write = None;
        }
        self.inner.db.lock().unwrap().clear_session()
    }
}
