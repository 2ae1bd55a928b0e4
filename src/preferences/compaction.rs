//! Background compaction of rated history into the preference profile.

use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::database::Database;
use crate::llm::{parse_response, TextModel, TextRequest};
use crate::models::HistoryEntry;
use crate::preferences::scoring::merge_lists;

const SYSTEM_PROMPT: &str = "You maintain a household's taste profile. Given older rated \
cooking history and the current profile text, produce an updated profile that folds the \
old entries in. Respond with a JSON object: \
{\"summary\": string, \"likes\": [string], \"dislikes\": [string]}.";

/// Result of one compaction trigger. `compacted == 0` means the threshold
/// was not crossed (or the failure was swallowed upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionOutcome {
    pub compacted: usize,
}

#[derive(Debug, Serialize)]
struct CompactionEntry<'a> {
    recipe_name: &'a str,
    rating: Option<u8>,
    would_make_again: &'a str,
    tags: &'a [String],
    ingredients: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CompactionResponse {
    summary: String,
    #[serde(default)]
    likes: Vec<String>,
    #[serde(default)]
    dislikes: Vec<String>,
}

/// Run compaction if the rated-history count exceeds the threshold.
///
/// All rated entries except the `keep_recent` most recently cooked are
/// summarized together with the existing profile. On success the compacted
/// rows are deleted and the summary row updated in one transaction; on any
/// failure nothing is deleted, so the trigger can retry indefinitely.
pub async fn maybe_compact(
    db: &Mutex<Database>,
    model: &dyn TextModel,
    config: &PlannerConfig,
) -> Result<CompactionOutcome> {
    // Snapshot everything needed before the model call; the lock is never
    // held across an await.
    let (victims, mut summary) = {
        let store = db.lock().unwrap();
        let rated = store.list_rated()?;
        if rated.len() <= config.compaction_threshold {
            debug!(
                rated = rated.len(),
                threshold = config.compaction_threshold,
                "compaction not triggered"
            );
            return Ok(CompactionOutcome { compacted: 0 });
        }
        let summary = store.load_summary(Utc::now())?;
        // list_rated is most-recent-first; everything past keep_recent ages out
        let victims: Vec<(i64, HistoryEntry)> =
            rated.into_iter().skip(config.keep_recent).collect();
        (victims, summary)
    };

    let prompt = build_prompt(&victims, &summary.profile)?;
    let response = model
        .complete(TextRequest::new(SYSTEM_PROMPT, prompt))
        .await
        .context("compaction summarization call failed")?;
    let parsed: CompactionResponse =
        parse_response(&response).context("compaction response unparsable")?;

    let (likes, dislikes) = merge_lists(
        &parsed.likes,
        &parsed.dislikes,
        &summary.likes,
        &summary.dislikes,
    );
    summary.profile = parsed.summary;
    summary.likes = likes;
    summary.dislikes = dislikes;
    summary.entries_compacted += victims.len() as u32;
    summary.updated_at = Utc::now();

    let ids: Vec<i64> = victims.iter().map(|(id, _)| *id).collect();
    db.lock().unwrap().apply_compaction(&ids, &summary)?;

    info!(compacted = ids.len(), "history compaction complete");
    Ok(CompactionOutcome {
        compacted: ids.len(),
    })
}

fn build_prompt(victims: &[(i64, HistoryEntry)], profile: &str) -> Result<String> {
    let entries: Vec<CompactionEntry<'_>> = victims
        .iter()
        .map(|(_, e)| CompactionEntry {
            recipe_name: &e.recipe_name,
            rating: e.rating,
            would_make_again: e.would_make_again.as_str(),
            tags: &e.tags,
            ingredients: &e.ingredients,
        })
        .collect();

    Ok(format!(
        "Current profile:\n{}\n\nOlder rated history to fold in ({} entries):\n{}",
        if profile.is_empty() { "(none yet)" } else { profile },
        entries.len(),
        serde_json::to_string_pretty(&entries)?,
    ))
}
