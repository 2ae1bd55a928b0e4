//! Preference learning over cooking history.
//!
//! Two independent passes share the history table:
//!
//! - [`scoring`] computes cheap, synchronous like/dislike signal from rated
//!   entries that have not been compacted away yet.
//! - [`compaction`] summarizes old rated history into the persistent
//!   preference profile to bound storage growth. It runs as a one-shot
//!   trigger after a rating write commits, never re-entrantly from inside
//!   the write, and is purely additive-safe: on any failure the raw history
//!   stays put and the next attempt starts from scratch.

pub mod compaction;
pub mod scoring;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::warn;

use crate::config::PlannerConfig;
use crate::database::Database;
use crate::llm::TextModel;
use crate::models::WouldMakeAgain;

pub use compaction::{maybe_compact, CompactionOutcome};
pub use scoring::{live_signal, LiveSignal};

/// Record a rating, then run the post-write compaction trigger.
///
/// Compaction failures are background noise by design: they are logged and
/// swallowed, and the rating write itself is never rolled back.
pub async fn rate_and_compact(
    db: &Arc<Mutex<Database>>,
    model: &Arc<dyn TextModel>,
    entry_id: i64,
    rating: u8,
    would_make_again: WouldMakeAgain,
    config: &PlannerConfig,
) -> Result<CompactionOutcome> {
    db.lock()
        .unwrap()
        .record_rating(entry_id, rating, would_make_again)?;

    match maybe_compact(db, model.as_ref(), config).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            warn!(error = %err, "history compaction failed; raw history retained");
            Ok(CompactionOutcome { compacted: 0 })
        }
    }
}
