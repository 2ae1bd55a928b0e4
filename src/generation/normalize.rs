//! Phase 3: normalize ingredient names and units across the whole pool.
//!
//! One model call rewrites every recipe's ingredient list into canonical
//! names and consistent units so the later shopping consolidation can match
//! lines across recipes. The response is validated defensively: a length
//! mismatch leaves the whole pool untouched, a per-recipe name mismatch
//! leaves that recipe untouched. Only an unparsable response is fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::{parse_response, TextModel, TextRequest};
use crate::models::{IngredientLine, RecipePool};

const SYSTEM_PROMPT: &str = "You normalize recipe ingredient lists for shopping-list \
matching. For each recipe, rewrite every ingredient with a canonical lowercase name \
(\"yellow onion\" and \"onions, diced\" both become \"onion\") and a consistent metric \
or count unit. Keep recipes in the given order and keep each recipe_name exactly as \
given. Respond with a JSON array: [{\"recipe_name\": string, \"ingredients\": \
[{\"name\": string, \"quantity\": number, \"unit\": string}]}].";

#[derive(Debug, Serialize)]
struct NormalizeRecipe<'a> {
    recipe_name: &'a str,
    ingredients: Vec<NormalizeLine<'a>>,
}

#[derive(Debug, Serialize)]
struct NormalizeLine<'a> {
    name: &'a str,
    quantity: f64,
    unit: &'a str,
}

#[derive(Debug, Deserialize)]
struct NormalizedRecipe {
    recipe_name: String,
    ingredients: Vec<NormalizedLine>,
}

#[derive(Debug, Deserialize)]
struct NormalizedLine {
    name: String,
    quantity: f64,
    unit: String,
}

/// Normalize ingredient names and units in place.
pub async fn normalize_pool(model: &dyn TextModel, pool: &mut RecipePool) -> Result<()> {
    if pool.recipes.is_empty() {
        return Ok(());
    }

    let request: Vec<NormalizeRecipe<'_>> = pool
        .recipes
        .iter()
        .map(|recipe| NormalizeRecipe {
            recipe_name: &recipe.outline.name,
            ingredients: recipe
                .ingredients
                .iter()
                .map(|line| NormalizeLine {
                    name: &line.name,
                    quantity: line.quantity,
                    unit: &line.unit,
                })
                .collect(),
        })
        .collect();
    let prompt = format!(
        "Normalize these recipes' ingredients:\n{}",
        serde_json::to_string_pretty(&request)?
    );

    let response = model
        .complete(TextRequest::new(SYSTEM_PROMPT, prompt))
        .await
        .context("normalization call failed")?;
    let normalized: Vec<NormalizedRecipe> =
        parse_response(&response).context("normalization response unparsable")?;

    if normalized.len() != pool.recipes.len() {
        warn!(
            expected = pool.recipes.len(),
            got = normalized.len(),
            "normalization length mismatch, keeping original ingredients"
        );
        return Ok(());
    }

    for (recipe, replacement) in pool.recipes.iter_mut().zip(normalized) {
        if replacement.recipe_name != recipe.outline.name {
            warn!(
                expected = %recipe.outline.name,
                got = %replacement.recipe_name,
                "normalization name mismatch, keeping recipe untouched"
            );
            continue;
        }
        // Preparation notes are re-attached by position; lines the model
        // added beyond the original count carry none.
        let originals = std::mem::take(&mut recipe.ingredients);
        recipe.ingredients = replacement
            .ingredients
            .into_iter()
            .enumerate()
            .map(|(idx, line)| IngredientLine {
                name: line.name,
                quantity: line.quantity,
                unit: line.unit,
                preparation: originals.get(idx).and_then(|orig| orig.preparation.clone()),
            })
            .collect();
    }

    Ok(())
}
