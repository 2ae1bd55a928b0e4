//! Confirmation flow: plan save, shopping consolidation, trip completion

use std::sync::Arc;

use mealplan::llm::MockTextModel;
use mealplan::models::PantryIngredient;
use mealplan::{IngredientCategory, PlanRequest, PlanState};

use super::common::*;

fn seed_pantry(db: &std::sync::Mutex<mealplan::Database>, name: &str, qty: f64, unit: &str) {
    db.lock()
        .unwrap()
        .upsert_pantry_ingredient(&PantryIngredient {
            name: name.into(),
            unit: unit.into(),
            quantity_initial: qty,
            quantity_remaining: qty,
            category: IngredientCategory::DryGoods,
            perishable: false,
            expires_at: None,
        })
        .unwrap();
}

#[tokio::test]
async fn confirm_saves_plan_and_consolidates_list() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 3, &[0, 1]);
    // Two selected recipes need 600g rice total, pantry holds 500g
    mock.push_text(
        r#"{"items": [{"ingredient_name": "rice", "quantity": 100, "unit": "g",
            "category": "dry_goods", "notes": "600g needed, 500g on hand"}]}"#,
    );
    let (job, db) = job_with_model(mock.clone(), small_config(3));
    seed_pantry(&db, "rice", 500.0, "g");

    job.generate(PlanRequest::default()).await.unwrap();
    let plan = job.confirm().await.unwrap();

    assert_eq!(job.state(), PlanState::Complete);
    assert_eq!(plan.recipe_names, vec!["Recipe 0", "Recipe 1"]);
    assert!(plan.shopping_list_generated_at.is_some());

    let items = job.shopping_list(plan.id).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].ingredient_name, "rice");
    assert_eq!(items[0].quantity, 100.0);
    assert_eq!(items[0].category, IngredientCategory::DryGoods);

    // Pool is spent and the session row is gone
    assert!(job.pool().is_none());
    assert!(db.lock().unwrap().read_session().unwrap().is_none());

    // The consolidation prompt saw the pantry stock
    let last_call = mock.calls().last().unwrap().prompt.clone();
    assert!(last_call.contains("rice"));
    assert!(last_call.contains("500"));
}

#[tokio::test]
async fn consolidation_failure_keeps_plan_and_allows_retry() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 2, &[0]);
    mock.push_error("gateway timeout");
    let (job, db) = job_with_model(mock.clone(), small_config(2));

    job.generate(PlanRequest::default()).await.unwrap();
    assert!(job.confirm().await.is_err());
    assert!(matches!(job.state(), PlanState::Error(_)));

    // The plan row survived the failure, without a list
    let plans = db.lock().unwrap().list_meal_plans().unwrap();
    assert_eq!(plans.len(), 1);
    assert!(plans[0].shopping_list_generated_at.is_none());

    mock.push_text(r#"{"items": [{"ingredient_name": "rice", "quantity": 300, "unit": "g"}]}"#);
    let plan = job.retry_consolidation().await.unwrap();

    assert_eq!(job.state(), PlanState::Complete);
    assert_eq!(plan.id, plans[0].id);
    assert!(plan.shopping_list_generated_at.is_some());
    assert_eq!(job.shopping_list(plan.id).unwrap().len(), 1);

    // Retrying twice is an error once consolidation succeeded
    assert!(job.retry_consolidation().await.is_err());
}

#[tokio::test]
async fn completed_trip_folds_checked_items_into_pantry() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 2, &[0]);
    mock.push_text(
        r#"{"items": [
            {"ingredient_name": "rice", "quantity": 100, "unit": "g"},
            {"ingredient_name": "soy sauce", "quantity": 1, "unit": "bottle"}]}"#,
    );
    let (job, db) = job_with_model(mock, small_config(2));
    seed_pantry(&db, "rice", 500.0, "g");

    job.generate(PlanRequest::default()).await.unwrap();
    let plan = job.confirm().await.unwrap();

    // Only the rice gets checked off in the store
    let items = job.shopping_list(plan.id).unwrap();
    let rice = items.iter().find(|i| i.ingredient_name == "rice").unwrap();
    db.lock().unwrap().set_item_checked(rice.id, true).unwrap();

    let folded = mealplan::shopping::complete_trip(&db, plan.id).unwrap();
    assert_eq!(folded, 1);

    let pantry = db.lock().unwrap().pantry_snapshot().unwrap();
    let rice_stock = pantry.iter().find(|p| p.name == "rice").unwrap();
    assert_eq!(rice_stock.quantity_remaining, 600.0);
    // Unchecked items are discarded with the batch
    assert!(job.shopping_list(plan.id).unwrap().is_empty());
}

#[tokio::test]
async fn state_stream_covers_the_whole_flow() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 2, &[0]);
    mock.push_text(r#"{"items": [{"ingredient_name": "rice", "quantity": 100, "unit": "g"}]}"#);
    let (job, _db) = job_with_model(mock, small_config(2));
    let mut states = job.subscribe_states();

    job.generate(PlanRequest::default()).await.unwrap();
    job.confirm().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(state) = states.try_recv() {
        seen.push(state);
    }
    assert_eq!(
        seen,
        vec![
            PlanState::GeneratingOutlines,
            PlanState::GeneratingDetails,
            PlanState::Normalizing,
            PlanState::Ready,
            PlanState::Saving,
            PlanState::Consolidating,
            PlanState::Complete,
        ]
    );
}

#[tokio::test]
async fn confirm_with_no_selection_is_rejected() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 2, &[0]);
    let (job, _db) = job_with_model(mock, small_config(2));

    job.generate(PlanRequest::default()).await.unwrap();
    // Deselect the single default pick
    assert!(job.toggle_selection(0).unwrap());
    assert!(job.confirm().await.is_err());
    // Still Ready: nothing was committed
    assert_eq!(job.state(), PlanState::Ready);
}

#[tokio::test]
async fn selection_cap_is_enforced_through_the_job() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 8, &[0, 1, 2, 3, 4, 5]);
    let (job, _db) = job_with_model(mock, small_config(8));

    job.generate(PlanRequest::default()).await.unwrap();
    assert_eq!(job.selections().len(), 6);
    // Seventh pick is refused, deselection still works
    assert!(!job.toggle_selection(6).unwrap());
    assert!(job.toggle_selection(0).unwrap());
    assert!(job.toggle_selection(6).unwrap());
    assert_eq!(job.selections().len(), 6);
}
