//! Phase 1: generate a balanced pool of recipe outlines in one model call.
//!
//! There is no meaningful partial result at this phase: transport failure or
//! an unparsable response is fatal for the whole generation run.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::llm::{parse_response, TextModel, TextRequest};
use crate::models::RecipeOutline;
use crate::preferences::LiveSignal;

const SYSTEM_PROMPT: &str = "You are a weekly meal planning assistant. Generate a varied \
pool of recipe outlines balanced across proteins (poultry, red meat, fish, vegetarian), \
starches (rice, pasta, potato, bread, none), and meal formats (bowl, bake, stir-fry, \
soup, salad, handheld), with roughly two thirds quick weeknight recipes (under 45 \
minutes total) and one third weekend projects. Respond with a JSON object: \
{\"recipes\": [{\"name\", \"description\", \"servings\", \"prep_minutes\", \
\"cook_minutes\", \"tags\", \"main_protein\", \"main_starch\", \"meal_format\"}], \
\"default_selections\": [indices of up to 6 recommended recipes]}.";

/// Inputs echoed into the outline prompt.
pub struct OutlineRequest<'a> {
    pub count: usize,
    pub servings: u32,
    pub spice_tolerance: &'a str,
    /// Recipe names cooked recently, excluded from the new pool
    pub exclude_recipes: &'a [String],
    pub signal: &'a LiveSignal,
}

/// Outline pool plus the model's recommended pre-selection.
#[derive(Debug)]
pub struct OutlinePlan {
    pub outlines: Vec<RecipeOutline>,
    pub default_selections: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct OutlineResponse {
    recipes: Vec<RecipeOutline>,
    #[serde(default)]
    default_selections: Vec<usize>,
}

pub async fn generate_outlines(
    model: &dyn TextModel,
    request: &OutlineRequest<'_>,
    max_selections: usize,
) -> Result<OutlinePlan> {
    let prompt = build_prompt(request);
    let response = model
        .complete(TextRequest::new(SYSTEM_PROMPT, prompt))
        .await
        .context("outline generation call failed")?;
    let parsed: OutlineResponse =
        parse_response(&response).context("outline response unparsable")?;

    if parsed.recipes.is_empty() {
        bail!("outline generation returned an empty pool");
    }

    // Sanitize the recommendation: in-range, deduplicated, capped
    let recipe_count = parsed.recipes.len();
    let mut default_selections = Vec::new();
    for idx in parsed.default_selections {
        if idx < recipe_count && !default_selections.contains(&idx) {
            default_selections.push(idx);
        }
        if default_selections.len() == max_selections {
            break;
        }
    }

    debug!(
        outlines = recipe_count,
        preselected = default_selections.len(),
        "outline pool generated"
    );
    Ok(OutlinePlan {
        outlines: parsed.recipes,
        default_selections,
    })
}

fn build_prompt(request: &OutlineRequest<'_>) -> String {
    let mut prompt = format!(
        "Generate {} recipe outlines for {} servings each. Spice tolerance: {}.",
        request.count, request.servings, request.spice_tolerance
    );
    if !request.exclude_recipes.is_empty() {
        prompt.push_str(&format!(
            "\nDo not repeat these recently cooked recipes: {}.",
            request.exclude_recipes.join(", ")
        ));
    }
    if !request.signal.likes.is_empty() {
        prompt.push_str(&format!(
            "\nLean toward: {}.",
            request.signal.likes.join(", ")
        ));
    }
    if !request.signal.dislikes.is_empty() {
        prompt.push_str(&format!(
            "\nAvoid: {}.",
            request.signal.dislikes.join(", ")
        ));
    }
    prompt
}
