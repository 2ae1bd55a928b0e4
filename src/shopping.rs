//! Pantry-aware shopping-list consolidation.
//!
//! The cross-ingredient matching and aggregation heuristics are delegated to
//! the text model: duplicate names across recipes are summed before pantry
//! subtraction, fuzzy variants ("onion" vs "yellow onion") are its problem,
//! and quantities come back rounded to purchasable retail units. This
//! component's contract is narrower: build the request deterministically
//! from recipe and pantry state, clamp quantities at zero, replace the
//! plan's previous batch in one transaction, and stamp the plan's
//! shopping-list-generated marker on success. On failure the plan is left
//! without a shopping list and the caller decides whether to retry.

use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::database::Database;
use crate::llm::{parse_response, TextModel, TextRequest};
use crate::models::{GeneratedRecipe, IngredientCategory, PantryItem, ShoppingItem};

const SYSTEM_PROMPT: &str = "You consolidate weekly shopping lists. Sum ingredient needs \
across recipes (merging fuzzy name variants like 'onion' and 'yellow onion'), subtract \
pantry stock, and round what remains up to sensible retail units. Skip ingredients fully \
covered by the pantry. Respond with a JSON object: {\"items\": [{\"ingredient_name\": \
string, \"quantity\": number, \"unit\": string, \"category\": one of produce|dairy|\
protein|dry_goods|condiment|spice|frozen|other, \"notes\": string}]}.";

#[derive(Debug, Serialize)]
struct RequestRecipe<'a> {
    recipe_name: &'a str,
    ingredients: Vec<RequestIngredient<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestIngredient<'a> {
    name: &'a str,
    quantity: f64,
    unit: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConsolidationResponse {
    items: Vec<ConsolidatedItem>,
}

#[derive(Debug, Deserialize)]
struct ConsolidatedItem {
    ingredient_name: String,
    quantity: f64,
    unit: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Consolidate the selected recipes' ingredient needs into a shopping batch
/// for `plan_id`, replacing any previous batch for the same plan.
pub async fn consolidate(
    db: &Mutex<Database>,
    model: &dyn TextModel,
    recipes: &[GeneratedRecipe],
    pantry: &[PantryItem],
    plan_id: Uuid,
) -> Result<Vec<ShoppingItem>> {
    let prompt = build_request(recipes, pantry)?;
    let response = model
        .complete(TextRequest::new(SYSTEM_PROMPT, prompt))
        .await
        .context("shopping consolidation call failed")?;
    let parsed: ConsolidationResponse =
        parse_response(&response).context("consolidation response unparsable")?;

    let generated_at = Utc::now();
    let items: Vec<ShoppingItem> = parsed
        .items
        .into_iter()
        .map(|item| ShoppingItem {
            id: 0,
            meal_plan_id: plan_id,
            ingredient_name: item.ingredient_name,
            // Pantry subtraction never produces a negative need
            quantity: item.quantity.max(0.0),
            unit: item.unit,
            category: item
                .category
                .as_deref()
                .map(IngredientCategory::parse)
                .unwrap_or(IngredientCategory::Other),
            checked: false,
            notes: item.notes,
        })
        .collect();

    db.lock()
        .unwrap()
        .replace_shopping_items(plan_id, &items, generated_at)?;

    info!(plan = %plan_id, items = items.len(), "shopping list consolidated");
    db.lock().unwrap().list_shopping_items(plan_id)
}

/// Deterministic request body: recipes in pool order with ingredient lines
/// in recipe order, pantry sorted by name. Steps and preparation notes are
/// never sent.
pub(crate) fn build_request(
    recipes: &[GeneratedRecipe],
    pantry: &[PantryItem],
) -> Result<String> {
    let request_recipes: Vec<RequestRecipe<'_>> = recipes
        .iter()
        .map(|recipe| RequestRecipe {
            recipe_name: &recipe.outline.name,
            ingredients: recipe
                .ingredients
                .iter()
                .map(|line| RequestIngredient {
                    name: &line.name,
                    quantity: line.quantity,
                    unit: &line.unit,
                })
                .collect(),
        })
        .collect();

    let mut pantry_sorted: Vec<&PantryItem> = pantry.iter().collect();
    pantry_sorted.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(format!(
        "Selected recipes:\n{}\n\nPantry stock:\n{}",
        serde_json::to_string_pretty(&request_recipes)?,
        serde_json::to_string_pretty(
            &pantry_sorted
                .iter()
                .map(|item| serde_json::json!({
                    "name": item.name,
                    "quantity_remaining": item.quantity_remaining,
                    "unit": item.unit,
                }))
                .collect::<Vec<_>>()
        )?,
    ))
}

/// Fold checked items back into pantry stock and clear the plan's batch.
pub fn complete_trip(db: &Mutex<Database>, plan_id: Uuid) -> Result<usize> {
    db.lock().unwrap().complete_shopping_trip(plan_id)
}
