//! Live preference scoring: cheap aggregation over rated history.

use std::collections::HashMap;

use crate::models::{HistoryEntry, PreferenceSummary};

/// How many leading ingredient lines count as "main" ingredients.
const MAIN_INGREDIENT_COUNT: usize = 5;

/// Minimum number of ratings before a tag or ingredient produces signal.
const MIN_RATINGS: usize = 2;

const LIKE_MEAN: f64 = 4.0;
const DISLIKE_MEAN: f64 = 2.0;

/// Merged like/dislike lists fed into generation prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSignal {
    pub likes: Vec<String>,
    pub dislikes: Vec<String>,
}

/// Compute fresh signal from rated entries and merge it with the stored
/// summary lists. Summary items that conflict with fresh signal lose;
/// everything else is kept.
pub fn live_signal(entries: &[HistoryEntry], summary: &PreferenceSummary) -> LiveSignal {
    let mut scores: HashMap<String, (f64, usize)> = HashMap::new();

    for entry in entries {
        let Some(rating) = entry.rating else { continue };
        let rating = rating as f64;

        let keys = entry
            .tags
            .iter()
            .chain(entry.ingredients.iter().take(MAIN_INGREDIENT_COUNT));
        for key in keys {
            let key = normalize(key);
            if key.is_empty() {
                continue;
            }
            let slot = scores.entry(key).or_insert((0.0, 0));
            slot.0 += rating;
            slot.1 += 1;
        }
    }

    let mut fresh_likes = Vec::new();
    let mut fresh_dislikes = Vec::new();
    let mut keyed: Vec<_> = scores.into_iter().collect();
    // Deterministic output order regardless of hash iteration
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    for (key, (sum, count)) in keyed {
        if count < MIN_RATINGS {
            continue;
        }
        let mean = sum / count as f64;
        if mean >= LIKE_MEAN {
            fresh_likes.push(key);
        } else if mean <= DISLIKE_MEAN {
            fresh_dislikes.push(key);
        }
    }

    let (likes, dislikes) = merge_lists(
        &fresh_likes,
        &fresh_dislikes,
        &summary.likes,
        &summary.dislikes,
    );
    LiveSignal { likes, dislikes }
}

/// Merge fresh signal with stored lists: fresh items first, stored items
/// appended unless they duplicate or conflict with fresh signal.
pub(crate) fn merge_lists(
    fresh_likes: &[String],
    fresh_dislikes: &[String],
    stored_likes: &[String],
    stored_dislikes: &[String],
) -> (Vec<String>, Vec<String>) {
    let mut likes: Vec<String> = fresh_likes.iter().map(|s| normalize(s)).collect();
    let mut dislikes: Vec<String> = fresh_dislikes.iter().map(|s| normalize(s)).collect();

    for stored in stored_likes {
        let stored = normalize(stored);
        if !stored.is_empty() && !likes.contains(&stored) && !dislikes.contains(&stored) {
            likes.push(stored);
        }
    }
    for stored in stored_dislikes {
        let stored = normalize(stored);
        if !stored.is_empty() && !dislikes.contains(&stored) && !likes.contains(&stored) {
            dislikes.push(stored);
        }
    }

    (likes, dislikes)
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}
