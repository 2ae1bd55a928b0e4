//! Rating writes and history compaction through the public API

use std::sync::Arc;

use chrono::{Duration, Utc};
use mealplan::llm::MockTextModel;
use mealplan::models::{HistoryEntry, WouldMakeAgain};
use mealplan::preferences::rate_and_compact;
use mealplan::{Database, PlannerConfig, TextModel};
use std::sync::Mutex;

fn seed_history(db: &Mutex<Database>, count: usize, rated: bool) -> Vec<i64> {
    let store = db.lock().unwrap();
    (0..count)
        .map(|i| {
            store
                .insert_history(&HistoryEntry {
                    recipe_name: format!("Recipe {i}"),
                    rating: if rated { Some(4) } else { None },
                    would_make_again: WouldMakeAgain::Undecided,
                    date_cooked: Utc::now() - Duration::days(i as i64),
                    tags: vec!["weeknight".into()],
                    ingredients: vec!["rice".into()],
                })
                .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn rating_below_threshold_skips_compaction() {
    let db = Arc::new(Mutex::new(Database::new_in_memory().unwrap()));
    let ids = seed_history(&db, 10, true);
    let mock = Arc::new(MockTextModel::new());
    let model: Arc<dyn TextModel> = mock.clone();

    let outcome = rate_and_compact(
        &db,
        &model,
        ids[0],
        5,
        WouldMakeAgain::Yes,
        &PlannerConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.compacted, 0);
    assert!(mock.calls().is_empty());
    let (_, entry) = db
        .lock()
        .unwrap()
        .list_rated()
        .unwrap()
        .into_iter()
        .find(|(id, _)| *id == ids[0])
        .unwrap();
    assert_eq!(entry.rating, Some(5));
    assert_eq!(entry.would_make_again, WouldMakeAgain::Yes);
}

#[tokio::test]
async fn crossing_the_threshold_compacts_old_history() {
    let db = Arc::new(Mutex::new(Database::new_in_memory().unwrap()));
    // 50 rated plus one unrated entry whose rating tips the count to 51
    let _rated = seed_history(&db, 50, true);
    let unrated = seed_history(&db, 1, false);
    let mock = Arc::new(MockTextModel::new());
    mock.push_text(
        r#"{"summary": "Enjoys quick rice dishes.", "likes": ["rice"], "dislikes": []}"#,
    );
    let model: Arc<dyn TextModel> = mock.clone();

    let outcome = rate_and_compact(
        &db,
        &model,
        unrated[0],
        4,
        WouldMakeAgain::Yes,
        &PlannerConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.compacted, 31);
    let store = db.lock().unwrap();
    assert_eq!(store.rated_count().unwrap(), 20);
    let summary = store.load_summary(Utc::now()).unwrap();
    assert_eq!(summary.profile, "Enjoys quick rice dishes.");
    assert_eq!(summary.entries_compacted, 31);
}

#[tokio::test]
async fn compaction_failure_never_loses_the_rating() {
    let db = Arc::new(Mutex::new(Database::new_in_memory().unwrap()));
    let _rated = seed_history(&db, 50, true);
    let unrated = seed_history(&db, 1, false);
    let mock = Arc::new(MockTextModel::new());
    mock.push_error("model unavailable");
    let model: Arc<dyn TextModel> = mock.clone();

    // The failure is swallowed; the rating write stands
    let outcome = rate_and_compact(
        &db,
        &model,
        unrated[0],
        4,
        WouldMakeAgain::No,
        &PlannerConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.compacted, 0);
    let store = db.lock().unwrap();
    assert_eq!(store.rated_count().unwrap(), 51);
    assert_eq!(store.load_summary(Utc::now()).unwrap().entries_compacted, 0);
}

#[tokio::test]
async fn rating_an_unknown_entry_fails() {
    let db = Arc::new(Mutex::new(Database::new_in_memory().unwrap()));
    let mock = Arc::new(MockTextModel::new());
    let model: Arc<dyn TextModel> = mock;

    assert!(rate_and_compact(
        &db,
        &model,
        999,
        4,
        WouldMakeAgain::Yes,
        &PlannerConfig::default(),
    )
    .await
    .is_err());
}
