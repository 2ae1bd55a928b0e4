//! Core data model for the meal planning pipeline.
//!
//! The generation flow produces these shapes in order:
//!
//! 1. **RecipeOutline** - lightweight candidates from the first model call
//! 2. **GeneratedRecipe** - outline + ingredients + steps after expansion
//! 3. **RecipePool** - the full candidate set offered for selection
//!
//! Ingredient and step order is preserved end-to-end: later phases correlate
//! by index, not by name.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Recipe Types
// ============================================================================

/// Lightweight recipe candidate produced by outline generation.
///
/// Immutable once created; detail expansion consumes it verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeOutline {
    pub name: String,

    pub description: String,

    /// Number of servings the recipe is written for
    pub servings: u32,

    pub prep_minutes: u32,

    pub cook_minutes: u32,

    /// Free-form tags ("weeknight", "comfort food", ...)
    #[serde(default)]
    pub tags: Vec<String>,

    /// Coarse classifier used for pool balancing
    pub main_protein: String,

    /// Coarse classifier used for pool balancing
    pub main_starch: String,

    /// Meal format ("bowl", "stir-fry", "bake", ...)
    pub meal_format: String,
}

/// One ingredient line of a recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientLine {
    pub name: String,

    pub quantity: f64,

    pub unit: String,

    /// Preparation note ("diced", "room temperature"). Never sent to the
    /// normalization call; re-attached by index afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparation: Option<String>,
}

/// One cooking step with ordered substeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookingStep {
    pub title: String,

    #[serde(default)]
    pub substeps: Vec<String>,
}

/// Full recipe: an outline merged with the detail-expansion output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedRecipe {
    pub outline: RecipeOutline,

    /// Ordered ingredient lines; index is the correlation key
    pub ingredients: Vec<IngredientLine>,

    pub steps: Vec<CookingStep>,
}

/// The candidate set produced by one generation run, pre-selection.
///
/// Transient in memory but serialized verbatim into the generation session
/// so selection survives interruption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipePool {
    pub recipes: Vec<GeneratedRecipe>,

    /// Indices pre-selected by the outline call, at most [`MAX_SELECTIONS`]
    #[serde(default)]
    pub default_selections: Vec<usize>,
}

/// Hard cap on how many recipes can be selected from one pool.
pub const MAX_SELECTIONS: usize = 6;

impl RecipePool {
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Set of selected pool indices with a hard size cap.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionSet {
    indices: BTreeSet<usize>,
}

impl SelectionSet {
    /// Build from raw indices, dropping duplicates and anything past the cap.
    pub fn from_indices(indices: &[usize], cap: usize) -> Self {
        let mut set = SelectionSet::default();
        for &idx in indices {
            if set.indices.len() >= cap {
                break;
            }
            set.indices.insert(idx);
        }
        set
    }

    /// Toggle an index. Adding past the cap is a no-op; returns whether the
    /// set changed.
    pub fn toggle(&mut self, index: usize, cap: usize) -> bool {
        if self.indices.remove(&index) {
            return true;
        }
        if self.indices.len() >= cap {
            return false;
        }
        self.indices.insert(index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Selected indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        self.indices.iter().copied().collect()
    }
}

// ============================================================================
// Pantry & Shopping Types
// ============================================================================

/// Grocery category used for pantry stock and shopping items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngredientCategory {
    Produce,
    Dairy,
    Protein,
    DryGoods,
    Condiment,
    Spice,
    Frozen,
    Other,
}

impl IngredientCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngredientCategory::Produce => "produce",
            IngredientCategory::Dairy => "dairy",
            IngredientCategory::Protein => "protein",
            IngredientCategory::DryGoods => "dry_goods",
            IngredientCategory::Condiment => "condiment",
            IngredientCategory::Spice => "spice",
            IngredientCategory::Frozen => "frozen",
            IngredientCategory::Other => "other",
        }
    }

    /// Parse a stored or model-provided category, defaulting to `Other`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "produce" => IngredientCategory::Produce,
            "dairy" => IngredientCategory::Dairy,
            "protein" => IngredientCategory::Protein,
            "dry_goods" | "dry goods" => IngredientCategory::DryGoods,
            "condiment" => IngredientCategory::Condiment,
            "spice" => IngredientCategory::Spice,
            "frozen" => IngredientCategory::Frozen,
            _ => IngredientCategory::Other,
        }
    }
}

/// Pantry stock record, owned by the pantry subsystem.
///
/// Generation and consolidation treat this as read-only; only shopping-trip
/// completion writes quantities back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PantryIngredient {
    pub name: String,

    pub unit: String,

    pub quantity_initial: f64,

    pub quantity_remaining: f64,

    pub category: IngredientCategory,

    pub perishable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Read-only pantry snapshot line consumed by generation and consolidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PantryItem {
    pub name: String,
    pub quantity_remaining: f64,
    pub unit: String,
}

/// One line of a consolidated shopping list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShoppingItem {
    /// Row id assigned by the store; 0 before insertion
    #[serde(default)]
    pub id: i64,

    pub meal_plan_id: Uuid,

    pub ingredient_name: String,

    /// Aggregated quantity after pantry subtraction, never negative
    pub quantity: f64,

    pub unit: String,

    pub category: IngredientCategory,

    /// Checked off by the user during the shopping trip
    #[serde(default)]
    pub checked: bool,

    /// Provenance notes from consolidation ("needed by 2 recipes", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ============================================================================
// History & Preference Types
// ============================================================================

/// Tri-state answer to "would you make this again?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WouldMakeAgain {
    Yes,
    No,
    Undecided,
}

impl WouldMakeAgain {
    pub fn as_str(&self) -> &'static str {
        match self {
            WouldMakeAgain::Yes => "yes",
            WouldMakeAgain::No => "no",
            WouldMakeAgain::Undecided => "undecided",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "yes" => WouldMakeAgain::Yes,
            "no" => WouldMakeAgain::No,
            _ => WouldMakeAgain::Undecided,
        }
    }
}

/// Append-only cooking history record.
///
/// Rated entries are eventually compacted into the preference summary and
/// deleted; unrated entries stay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recipe_name: String,

    /// 1-5, or none if the user never rated it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,

    pub would_make_again: WouldMakeAgain,

    pub date_cooked: DateTime<Utc>,

    /// Tag snapshot taken from the recipe at cook time
    #[serde(default)]
    pub tags: Vec<String>,

    /// Ingredient-name snapshot taken from the recipe at cook time
    #[serde(default)]
    pub ingredients: Vec<String>,
}

/// Rolling taste profile. At most one live row; merged in place, never
/// replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceSummary {
    /// Free-text profile maintained by compaction, user-editable
    pub profile: String,

    pub likes: Vec<String>,

    pub dislikes: Vec<String>,

    /// Count of history entries already folded into the profile
    pub entries_compacted: u32,

    pub updated_at: DateTime<Utc>,
}

impl PreferenceSummary {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            profile: String::new(),
            likes: Vec::new(),
            dislikes: Vec::new(),
            entries_compacted: 0,
            updated_at: now,
        }
    }
}

/// Explicit per-run user preferences passed into generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpiceTolerance {
    Mild,
    Medium,
    Hot,
}

impl SpiceTolerance {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpiceTolerance::Mild => "mild",
            SpiceTolerance::Medium => "medium",
            SpiceTolerance::Hot => "hot",
        }
    }
}

// ============================================================================
// Plans & Sessions
// ============================================================================

/// A confirmed weekly meal plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: Uuid,

    pub created_at: DateTime<Utc>,

    /// Names of the selected recipes, in pool order
    pub recipe_names: Vec<String>,

    /// Set when consolidation last succeeded for this plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shopping_list_generated_at: Option<DateTime<Utc>>,
}

/// The single persisted generation-session row.
///
/// A row with `pool: None` is the resumability breadcrumb written before the
/// first model call; once a pool exists the row carries the full serialized
/// pool plus the live selection set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSession {
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<RecipePool>,

    #[serde(default)]
    pub selections: SelectionSet,
}
