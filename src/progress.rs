//! Progress events, pipeline state, cancellation, and background keep-alive.
//!
//! The core emits structured events only; any presentation (progress bar,
//! notification) is the caller's concern. Callers subscribe to a broadcast
//! stream rather than polling shared global state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Pipeline phase reported in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    Outlines,
    Details,
    Normalizing,
    Saving,
    Consolidating,
}

impl PlanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanPhase::Outlines => "outlines",
            PlanPhase::Details => "details",
            PlanPhase::Normalizing => "normalizing",
            PlanPhase::Saving => "saving",
            PlanPhase::Consolidating => "consolidating",
        }
    }
}

/// One progress update published by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: PlanPhase,
    pub current: usize,
    pub total: usize,
    /// Set for per-recipe updates during detail expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_name: Option<String>,
}

/// State machine of one plan job.
///
/// `Idle → GeneratingOutlines → GeneratingDetails → Normalizing → Ready`
/// on generation, then `Ready → Saving → Consolidating → Complete` once the
/// user confirms a selection. Any fatal failure lands in `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanState {
    Idle,
    GeneratingOutlines,
    GeneratingDetails,
    Normalizing,
    Ready,
    Saving,
    Consolidating,
    Complete,
    Error(String),
}

/// Cooperative cancellation flag, checked before each phase and each batch.
///
/// Already-dispatched model calls are allowed to finish; their results are
/// discarded and no further phase is entered.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Platform hook for "keep running while backgrounded" requests.
///
/// The orchestrator holds a [`KeepAliveGuard`] for the whole run so the
/// request is released on every exit path, including errors and cancels.
pub trait KeepAlive: Send + Sync {
    fn begin(&self);
    fn end(&self);
}

/// No-op implementation for hosts without a background-execution API.
#[derive(Debug, Default)]
pub struct NoopKeepAlive;

impl KeepAlive for NoopKeepAlive {
    fn begin(&self) {}
    fn end(&self) {}
}

/// RAII wrapper releasing the keep-alive request on drop.
pub struct KeepAliveGuard {
    inner: Arc<dyn KeepAlive>,
}

impl KeepAliveGuard {
    pub fn acquire(inner: Arc<dyn KeepAlive>) -> Self {
        inner.begin();
        Self { inner }
    }
}

impl Drop for KeepAliveGuard {
    fn drop(&mut self) {
        self.inner.end();
    }
}
