//! Phase 2: expand outlines into full recipes, in parallel batches.
//!
//! Outlines are expanded in fixed-size batches; calls within a batch run
//! concurrently, batches run sequentially so a cancel or a rate limit never
//! leaves more than one batch in flight. A failed expansion drops that
//! recipe from the pool rather than failing the run; default selections are
//! re-indexed to survive the drops.

use anyhow::{bail, Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::llm::{parse_response, TextModel, TextRequest};
use crate::models::{CookingStep, GeneratedRecipe, IngredientLine, RecipeOutline, RecipePool};
use crate::progress::{CancelFlag, PlanPhase, ProgressEvent};

const SYSTEM_PROMPT: &str = "You write complete home-cooking recipes from an outline. \
Respond with a JSON object: {\"ingredients\": [{\"name\": string, \"quantity\": number, \
\"unit\": string, \"preparation\": string or null}], \"steps\": [{\"title\": string, \
\"substeps\": [string]}]}. Quantities are for the outline's serving count.";

#[derive(Debug, Deserialize)]
struct DetailResponse {
    ingredients: Vec<IngredientLine>,
    steps: Vec<CookingStep>,
}

/// Expand every outline and assemble the surviving recipes into a pool.
///
/// Returns early with the recipes expanded so far if cancelled between
/// batches; the caller discards the partial pool. Fails only when every
/// single expansion failed.
pub async fn expand_details(
    model: &dyn TextModel,
    outlines: &[RecipeOutline],
    default_selections: &[usize],
    batch_size: usize,
    cancel: &CancelFlag,
    progress: &broadcast::Sender<ProgressEvent>,
) -> Result<RecipePool> {
    let total = outlines.len();
    let mut expanded: Vec<Option<GeneratedRecipe>> = (0..total).map(|_| None).collect();
    let mut processed = 0usize;

    for chunk in outlines.chunks(batch_size.max(1)) {
        if cancel.is_cancelled() {
            break;
        }

        let base = processed;
        let mut in_flight: FuturesUnordered<_> = chunk
            .iter()
            .enumerate()
            .map(|(offset, outline)| async move {
                (base + offset, expand_one(model, outline).await)
            })
            .collect();

        while let Some((idx, result)) = in_flight.next().await {
            match result {
                Ok(recipe) => expanded[idx] = Some(recipe),
                Err(err) => {
                    warn!(recipe = %outlines[idx].name, error = %err, "detail expansion failed, dropping recipe");
                }
            }
        }

        processed += chunk.len();
        let _ = progress.send(ProgressEvent {
            phase: PlanPhase::Details,
            current: processed,
            total,
            recipe_name: None,
        });
    }

    if !cancel.is_cancelled() && expanded.iter().all(|slot| slot.is_none()) {
        bail!("every detail expansion failed");
    }

    // Drop the failed slots and shift selection indices down past them
    let failed: Vec<usize> = expanded
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_none())
        .map(|(idx, _)| idx)
        .collect();
    let recipes: Vec<GeneratedRecipe> = expanded.into_iter().flatten().collect();
    let default_selections = remap_selections(default_selections, &failed);

    Ok(RecipePool {
        recipes,
        default_selections,
    })
}

async fn expand_one(model: &dyn TextModel, outline: &RecipeOutline) -> Result<GeneratedRecipe> {
    let prompt = format!(
        "Write the full recipe for this outline:\n{}",
        serde_json::to_string_pretty(outline)?
    );
    let response = model
        .complete(TextRequest::new(SYSTEM_PROMPT, prompt))
        .await
        .with_context(|| format!("detail call failed for {}", outline.name))?;
    let parsed: DetailResponse = parse_response(&response)
        .with_context(|| format!("detail response unparsable for {}", outline.name))?;

    if parsed.ingredients.is_empty() || parsed.steps.is_empty() {
        bail!("detail response for {} is missing ingredients or steps", outline.name);
    }

    Ok(GeneratedRecipe {
        outline: outline.clone(),
        ingredients: parsed.ingredients,
        steps: parsed.steps,
    })
}

/// Shift selection indices down past dropped pool positions; selections of
/// dropped recipes disappear.
pub(crate) fn remap_selections(selections: &[usize], dropped: &[usize]) -> Vec<usize> {
    selections
        .iter()
        .filter(|idx| !dropped.contains(idx))
        .map(|idx| idx - dropped.iter().filter(|d| *d < idx).count())
        .collect()
}
