//! Session recovery across simulated restarts

use std::sync::Arc;

use chrono::{Duration, Utc};
use mealplan::llm::MockTextModel;
use mealplan::models::GenerationSession;
use mealplan::{PlanRequest, PlanState, SelectionSet, SessionStatus, MAX_SELECTIONS};

use super::common::*;

#[tokio::test]
async fn fresh_store_has_nothing_to_resume() {
    let mock = Arc::new(MockTextModel::new());
    let (job, _db) = job_with_model(mock, small_config(4));
    assert!(matches!(job.resume().unwrap(), SessionStatus::NoSession));
    assert_eq!(job.state(), PlanState::Idle);
}

#[tokio::test]
async fn pool_bearing_session_restores_to_ready() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 3, &[0, 2]);
    let (job, db) = job_with_model(mock.clone(), small_config(3));
    job.generate(PlanRequest::default()).await.unwrap();

    // Simulate a restart: a second job over the same store
    let revived = mealplan::PlanJob::new(
        small_config(3),
        mock as Arc<dyn mealplan::TextModel>,
        db.clone(),
        Arc::new(mealplan::NoopKeepAlive),
    );
    match revived.resume().unwrap() {
        SessionStatus::Restored { pool, selections } => {
            assert_eq!(pool.recipes.len(), 3);
            assert_eq!(selections.indices(), vec![0, 2]);
        }
        other => panic!("expected Restored, got {:?}", other),
    }
    assert_eq!(revived.state(), PlanState::Ready);
    assert_eq!(revived.pool().unwrap().recipes.len(), 3);

    // The restored job can confirm as if nothing happened
    assert!(revived.toggle_selection(1).unwrap());
    assert_eq!(revived.selections().indices(), vec![0, 1, 2]);
}

#[tokio::test]
async fn stale_breadcrumb_without_pool_is_discarded() {
    let mock = Arc::new(MockTextModel::new());
    let (job, db) = job_with_model(mock, small_config(4));
    db.lock()
        .unwrap()
        .write_session(&GenerationSession {
            started_at: Utc::now() - Duration::minutes(61),
            pool: None,
            selections: SelectionSet::default(),
        })
        .unwrap();

    assert!(matches!(job.resume().unwrap(), SessionStatus::NoSession));
    assert!(db.lock().unwrap().read_session().unwrap().is_none());
}

#[tokio::test]
async fn recent_breadcrumb_without_pool_reports_interrupted() {
    let mock = Arc::new(MockTextModel::new());
    let (job, db) = job_with_model(mock, small_config(4));
    let started_at = Utc::now() - Duration::minutes(5);
    db.lock()
        .unwrap()
        .write_session(&GenerationSession {
            started_at,
            pool: None,
            selections: SelectionSet::default(),
        })
        .unwrap();

    match job.resume().unwrap() {
        SessionStatus::Interrupted { started_at: seen } => {
            assert!((seen - started_at).num_seconds().abs() < 2);
        }
        other => panic!("expected Interrupted, got {:?}", other),
    }
    // The row stays until the run is retried or times out
    assert!(db.lock().unwrap().read_session().unwrap().is_some());
}

#[tokio::test]
async fn selection_toggles_reach_the_session_row() {
    let mock = Arc::new(MockTextModel::new());
    queue_generation(&mock, 4, &[]);
    let (job, db) = job_with_model(mock, small_config(4));
    job.generate(PlanRequest::default()).await.unwrap();

    job.toggle_selection(2).unwrap();
    job.toggle_selection(3).unwrap();
    job.flush_session().unwrap();

    let session = db.lock().unwrap().read_session().unwrap().unwrap();
    assert_eq!(session.selections.indices(), vec![2, 3]);
    assert_eq!(
        session.selections,
        SelectionSet::from_indices(&[2, 3], MAX_SELECTIONS)
    );
}
