//! Core engine of a weekly meal planner.
//!
//! The crate drives a text model through a multi-phase pipeline: generate a
//! pool of recipe outlines, expand them into full recipes in parallel
//! batches, normalize ingredient naming, then consolidate a confirmed
//! selection into a pantry-aware shopping list. Around the pipeline sit a
//! SQLite store for pantry, history, and plans, a preference learner that
//! compacts rated history into a taste profile, and crash-recovery session
//! breadcrumbs.
//!
//! Hosts embed the crate by constructing a [`generation::PlanJob`] with a
//! [`llm::TextModel`] implementation and a [`database::Database`], then
//! driving it from their UI. No I/O besides the model HTTP calls and the
//! SQLite file is performed.

pub mod config;
pub mod database;
pub mod generation;
pub mod images;
pub mod llm;
pub mod models;
pub mod preferences;
pub mod progress;
pub mod shopping;

pub use config::{ModelConfig, PlannerConfig};
pub use database::Database;
pub use generation::{PlanJob, PlanRequest, SessionStatus};
pub use llm::{HttpTextModel, ImageModel, MockTextModel, ModelError, TextModel, TextRequest};
pub use models::{
    GeneratedRecipe, HistoryEntry, IngredientCategory, IngredientLine, MealPlan, PantryItem,
    PreferenceSummary, RecipeOutline, RecipePool, SelectionSet, ShoppingItem, SpiceTolerance,
    WouldMakeAgain, MAX_SELECTIONS,
};
pub use progress::{CancelFlag, KeepAlive, NoopKeepAlive, PlanPhase, PlanState, ProgressEvent};
