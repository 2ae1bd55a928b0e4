//! Common test utilities for pipeline tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use mealplan::llm::{MockTextModel, ModelError, TextModel, TextRequest};
use mealplan::progress::NoopKeepAlive;
use mealplan::{Database, PlanJob, PlannerConfig};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install the env-filtered log subscriber once per test binary, so
/// `RUST_LOG=mealplan=debug cargo test` shows pipeline tracing.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Build a job over a fresh in-memory store, returning the store handle so
/// tests can inspect and seed it directly.
pub fn job_with_model(
    model: Arc<dyn TextModel>,
    config: PlannerConfig,
) -> (Arc<PlanJob>, Arc<Mutex<Database>>) {
    init_tracing();
    let db = Arc::new(Mutex::new(Database::new_in_memory().unwrap()));
    let job = Arc::new(PlanJob::new(
        config,
        model,
        db.clone(),
        Arc::new(NoopKeepAlive),
    ));
    (job, db)
}

pub fn small_config(outline_count: usize) -> PlannerConfig {
    PlannerConfig {
        outline_count,
        session_debounce: std::time::Duration::from_millis(0),
        ..PlannerConfig::default()
    }
}

/// An outline response with `count` recipes named `Recipe 0..count`.
pub fn outline_response(count: usize, selections: &[usize]) -> String {
    let recipes: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"name": "Recipe {i}", "description": "weeknight dinner",
                    "servings": 4, "prep_minutes": 10, "cook_minutes": 20,
                    "tags": ["quick"], "main_protein": "chicken",
                    "main_starch": "rice", "meal_format": "bowl"}}"#
            )
        })
        .collect();
    format!(
        r#"{{"recipes": [{}], "default_selections": {:?}}}"#,
        recipes.join(","),
        selections
    )
}

pub fn detail_response(ingredient: &str, quantity: f64, unit: &str) -> String {
    format!(
        r#"{{"ingredients": [{{"name": "{ingredient}", "quantity": {quantity},
            "unit": "{unit}", "preparation": null}}],
            "steps": [{{"title": "Cook", "substeps": ["Cook it through."]}}]}}"#
    )
}

/// A normalization response echoing each named recipe with one ingredient.
pub fn normalize_response(recipe_names: &[&str], ingredient: &str) -> String {
    let entries: Vec<String> = recipe_names
        .iter()
        .map(|name| {
            format!(
                r#"{{"recipe_name": "{name}", "ingredients":
                    [{{"name": "{ingredient}", "quantity": 300, "unit": "g"}}]}}"#
            )
        })
        .collect();
    format!("[{}]", entries.join(","))
}

/// Queue a complete happy-path generation for a pool of `count` recipes.
pub fn queue_generation(mock: &MockTextModel, count: usize, selections: &[usize]) {
    mock.push_text(outline_response(count, selections));
    for _ in 0..count {
        mock.push_text(detail_response("rice", 300.0, "g"));
    }
    let names: Vec<String> = (0..count).map(|i| format!("Recipe {i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    mock.push_text(normalize_response(&name_refs, "rice"));
}

/// Wrapper model that fires a hook after the nth completed call. Used to
/// trigger cancellation from inside a running pipeline.
pub struct HookedModel {
    pub inner: MockTextModel,
    after_calls: usize,
    count: AtomicUsize,
    hook: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl HookedModel {
    pub fn new(inner: MockTextModel, after_calls: usize) -> Self {
        Self {
            inner,
            after_calls,
            count: AtomicUsize::new(0),
            hook: Mutex::new(None),
        }
    }

    pub fn set_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }
}

#[async_trait]
impl TextModel for HookedModel {
    async fn complete(&self, request: TextRequest) -> Result<String, ModelError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        let response = self.inner.complete(request).await;
        if n == self.after_calls {
            if let Some(hook) = self.hook.lock().unwrap().as_ref() {
                hook();
            }
        }
        response
    }
}
