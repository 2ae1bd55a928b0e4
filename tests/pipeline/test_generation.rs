//! Generation runs: pool assembly, per-recipe failure, cancellation

use std::sync::Arc;

use mealplan::llm::MockTextModel;
use mealplan::{PlanRequest, PlanState};

use super::common::*;

#[tokio::test]
async fn full_run_produces_a_ready_pool() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 24, &[0, 3, 7, 11, 15, 19]);
    let (job, db) = job_with_model(mock.clone(), small_config(24));

    job.generate(PlanRequest::default()).await.unwrap();

    assert_eq!(job.state(), PlanState::Ready);
    let pool = job.pool().unwrap();
    assert_eq!(pool.recipes.len(), 24);
    assert_eq!(job.selections().indices(), vec![0, 3, 7, 11, 15, 19]);
    // 1 outline + 24 details + 1 normalize
    assert_eq!(mock.calls().len(), 26);
    // Session row carries the pool for crash recovery
    let session = db.lock().unwrap().read_session().unwrap().unwrap();
    assert!(session.pool.is_some());
}

#[tokio::test]
async fn failed_expansion_shrinks_pool_and_reindexes_selections() {
    let mock = Arc::new(MockTextModel::new());
    mock.push_text(outline_response(24, &[5, 7, 9]));
    for i in 0..24 {
        if i == 7 {
            mock.push_error("rate limited");
        } else {
            mock.push_text(detail_response("rice", 300.0, "g"));
        }
    }
    // Normalization must name the 23 survivors
    let names: Vec<String> = (0..24)
        .filter(|&i| i != 7)
        .map(|i| format!("Recipe {i}"))
        .collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    mock.push_text(normalize_response(&name_refs, "rice"));

    let (job, _db) = job_with_model(mock, small_config(24));
    job.generate(PlanRequest::default()).await.unwrap();

    let pool = job.pool().unwrap();
    assert_eq!(pool.recipes.len(), 23);
    assert_eq!(pool.recipes[7].outline.name, "Recipe 8");
    // Selection of the dropped recipe vanished; 9 shifted down to 8
    assert_eq!(job.selections().indices(), vec![5, 8]);
}

#[tokio::test]
async fn normalization_length_mismatch_keeps_raw_ingredients() {
    let mock = Arc::new(MockTextModel::new());
    mock.push_text(outline_response(2, &[0]));
    mock.push_text(detail_response("Yellow Onions, diced", 2.0, "whole"));
    mock.push_text(detail_response("rice", 300.0, "g"));
    // Only one recipe comes back; the whole pass is discarded
    mock.push_text(normalize_response(&["Recipe 0"], "onion"));

    let (job, _db) = job_with_model(mock, small_config(2));
    job.generate(PlanRequest::default()).await.unwrap();

    assert_eq!(job.state(), PlanState::Ready);
    let pool = job.pool().unwrap();
    assert_eq!(pool.recipes[0].ingredients[0].name, "Yellow Onions, diced");
}

#[tokio::test]
async fn outline_failure_clears_session_and_reports_error() {
    let mock = Arc::new(MockTextModel::new());
    mock.push_error("model unavailable");
    let (job, db) = job_with_model(mock, small_config(4));

    assert!(job.generate(PlanRequest::default()).await.is_err());
    assert!(matches!(job.state(), PlanState::Error(_)));
    assert!(db.lock().unwrap().read_session().unwrap().is_none());
    assert!(job.pool().is_none());
}

#[tokio::test]
async fn cancel_mid_run_discards_partial_work() {
    let inner = MockTextModel::new();
    // Outline call succeeds, then the run is cancelled before details
    inner.push_text(outline_response(8, &[0, 1]));
    let hooked = Arc::new(HookedModel::new(inner, 1));
    let (job, db) = job_with_model(hooked.clone(), small_config(8));
    let for_hook = job.clone();
    hooked.set_hook(move || for_hook.cancel());

    job.generate(PlanRequest::default()).await.unwrap();

    assert_eq!(job.state(), PlanState::Idle);
    assert!(job.pool().is_none());
    assert!(job.selections().is_empty());
    // No detail calls were dispatched after the cancel
    assert_eq!(hooked.inner.calls().len(), 1);
    assert!(db.lock().unwrap().read_session().unwrap().is_none());
}

#[tokio::test]
async fn preferences_and_recent_history_shape_the_outline_prompt() {
    use chrono::{Duration, Utc};
    use mealplan::{HistoryEntry, WouldMakeAgain};

    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 2, &[0]);
    let (job, db) = job_with_model(mock.clone(), small_config(2));

    {
        let store = db.lock().unwrap();
        for i in 0..2 {
            store
                .insert_history(&HistoryEntry {
                    recipe_name: format!("Weeknight Curry {i}"),
                    rating: Some(5),
                    would_make_again: WouldMakeAgain::Yes,
                    date_cooked: Utc::now() - Duration::days(i),
                    tags: vec!["curry".into()],
                    ingredients: vec![],
                })
                .unwrap();
        }
    }

    job.generate(PlanRequest::default()).await.unwrap();

    let prompt = &mock.calls()[0].prompt;
    assert!(prompt.contains("Lean toward: curry"));
    assert!(prompt.contains("Weeknight Curry 0"));
    assert!(prompt.contains("Weeknight Curry 1"));
}
