//! Configuration for the planning pipeline and the text-model client.

use std::time::Duration;

use crate::models::MAX_SELECTIONS;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Tunables for one planning pipeline instance.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Outlines requested from the first generation call
    pub outline_count: usize,
    /// Concurrent detail-expansion calls per batch
    pub detail_batch_size: usize,
    /// Hard cap on selected recipes per pool
    pub max_selections: usize,
    /// Rated-history size above which compaction runs
    pub compaction_threshold: usize,
    /// Most recent rated entries kept out of compaction
    pub keep_recent: usize,
    /// Age in minutes after which a pool-less session is abandoned
    pub session_timeout_minutes: i64,
    /// Debounce window for session re-persistence
    pub session_debounce: Duration,
    /// Image cache entries older than this many days are expired
    pub image_cache_days: i64,
    /// History window for recent-recipe exclusion
    pub exclusion_months: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            outline_count: 24,
            detail_batch_size: 4,
            max_selections: MAX_SELECTIONS,
            compaction_threshold: 50,
            keep_recent: 20,
            session_timeout_minutes: 60,
            session_debounce: Duration::from_millis(300),
            image_cache_days: 14,
            exclusion_months: 3,
        }
    }
}

/// Connection settings for the text-generation collaborator.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Optional extended-reasoning token budget forwarded with each request
    pub reasoning_budget: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("MEALPLAN_API_KEY").ok(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            reasoning_budget: None,
        }
    }
}

impl ModelConfig {
    /// Build a config from `MEALPLAN_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(base) = std::env::var("MEALPLAN_BASE_URL") {
            cfg.base_url = base;
        }
        if let Ok(model) = std::env::var("MEALPLAN_MODEL") {
            cfg.model = model;
        }
        if let Ok(timeout) = std::env::var("MEALPLAN_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                cfg.timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(budget) = std::env::var("MEALPLAN_REASONING_BUDGET") {
            if let Ok(tokens) = budget.parse::<u32>() {
                cfg.reasoning_budget = Some(tokens);
            }
        }
        cfg
    }
}
