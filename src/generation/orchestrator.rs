//! Plan job orchestration: the state machine driving a generation run from
//! outline generation through shopping-list consolidation.
//!
//! One [`PlanJob`] owns the run state, the selection set, the progress
//! broadcast, and the session breadcrumbs. All model traffic flows through
//! the injected [`TextModel`], so the whole pipeline runs against a mock in
//! tests.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PlannerConfig;
use crate::database::Database;
use crate::generation::details::expand_details;
use crate::generation::outlines::{generate_outlines, OutlineRequest};
use crate::generation::normalize::normalize_pool;
use crate::generation::session::{SessionStatus, SessionTracker};
use crate::llm::TextModel;
use crate::models::{
    GeneratedRecipe, HistoryEntry, MealPlan, RecipePool, SelectionSet, ShoppingItem,
    SpiceTolerance,
};
use crate::preferences::live_signal;
use crate::progress::{
    CancelFlag, KeepAlive, KeepAliveGuard, PlanPhase, PlanState, ProgressEvent,
};
use crate::shopping;

/// Caller-supplied inputs for one generation run.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub servings: u32,
    pub spice_tolerance: SpiceTolerance,
    /// Extra recipe names to exclude on top of the recent-history window
    pub exclude_recipes: Vec<String>,
}

impl Default for PlanRequest {
    fn default() -> Self {
        Self {
            servings: 4,
            spice_tolerance: SpiceTolerance::Medium,
            exclude_recipes: Vec::new(),
        }
    }
}

/// A single plan job. Create one per planning flow; a job whose plan reached
/// `Complete` can run [`generate`](Self::generate) again for the next week.
pub struct PlanJob {
    config: PlannerConfig,
    model: Arc<dyn TextModel>,
    db: Arc<Mutex<Database>>,
    session: SessionTracker,
    keep_alive: Arc<dyn KeepAlive>,
    state: Mutex<PlanState>,
    pool: Mutex<Option<RecipePool>>,
    selections: Mutex<SelectionSet>,
    /// Saved plan whose consolidation failed, kept for retry
    pending_consolidation: Mutex<Option<(MealPlan, Vec<GeneratedRecipe>)>>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    state_tx: broadcast::Sender<PlanState>,
    cancel: CancelFlag,
}

impl PlanJob {
    pub fn new(
        config: PlannerConfig,
        model: Arc<dyn TextModel>,
        db: Arc<Mutex<Database>>,
        keep_alive: Arc<dyn KeepAlive>,
    ) -> Self {
        let session = SessionTracker::new(db.clone(), &config);
        let (progress_tx, _) = broadcast::channel(256);
        let (state_tx, _) = broadcast::channel(64);
        Self {
            config,
            model,
            db,
            session,
            keep_alive,
            state: Mutex::new(PlanState::Idle),
            pool: Mutex::new(None),
            selections: Mutex::new(SelectionSet::default()),
            pending_consolidation: Mutex::new(None),
            progress_tx,
            state_tx,
            cancel: CancelFlag::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Subscribe to state transitions. Every change of [`PlanState`] is
    /// published here, terminal states included, so an observer never has
    /// to poll [`state`](Self::state).
    pub fn subscribe_states(&self) -> broadcast::Receiver<PlanState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> PlanState {
        self.state.lock().unwrap().clone()
    }

    /// Request cooperative cancellation of the in-flight run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn pool(&self) -> Option<RecipePool> {
        self.pool.lock().unwrap().clone()
    }

    pub fn selections(&self) -> SelectionSet {
        self.selections.lock().unwrap().clone()
    }

    /// Check for a session left by a previous process and restore a
    /// surviving pool into this job.
    pub fn resume(&self) -> Result<SessionStatus> {
        let status = self.session.startup_check()?;
        if let SessionStatus::Restored { pool, selections } = &status {
            *self.pool.lock().unwrap() = Some(pool.clone());
            *self.selections.lock().unwrap() = selections.clone();
            self.set_state(PlanState::Ready);
        }
        Ok(status)
    }

    /// Run the generation pipeline: outlines, details, normalization.
    ///
    /// Lands in `Ready` with a selectable pool, back in `Idle` when
    /// cancelled, or in `Error` on a fatal phase failure. The session row
    /// outlives only the happy path.
    pub async fn generate(&self, request: PlanRequest) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(
                *state,
                PlanState::GeneratingOutlines
                    | PlanState::GeneratingDetails
                    | PlanState::Normalizing
                    | PlanState::Saving
                    | PlanState::Consolidating
            ) {
                bail!("a plan job is already running");
            }
            *state = PlanState::GeneratingOutlines;
        }
        let _ = self.state_tx.send(PlanState::GeneratingOutlines);
        self.cancel.reset();
        *self.pool.lock().unwrap() = None;
        *self.selections.lock().unwrap() = SelectionSet::default();

        let _keep_alive = KeepAliveGuard::acquire(self.keep_alive.clone());
        match self.run_generation(&request).await {
            Ok(Some(pool)) => {
                let selections = SelectionSet::from_indices(
                    &pool.default_selections,
                    self.config.max_selections,
                );
                self.session.commit_pool(&pool, &selections)?;
                info!(recipes = pool.len(), "recipe pool ready");
                *self.pool.lock().unwrap() = Some(pool);
                *self.selections.lock().unwrap() = selections;
                self.set_state(PlanState::Ready);
                Ok(())
            }
            Ok(None) => {
                info!("generation cancelled, partial results discarded");
                if let Err(err) = self.session.clear() {
                    warn!(error = %err, "failed to clear session after cancel");
                }
                self.set_state(PlanState::Idle);
                Ok(())
            }
            Err(err) => {
                if let Err(clear_err) = self.session.clear() {
                    warn!(error = %clear_err, "failed to clear session after error");
                }
                self.set_state(PlanState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Ok(None) means cancelled between phases.
    async fn run_generation(&self, request: &PlanRequest) -> Result<Option<RecipePool>> {
        self.session.begin(Utc::now())?;

        let (signal, mut exclude) = {
            let db = self.db.lock().unwrap();
            let summary = db.load_summary(Utc::now())?;
            let rated: Vec<HistoryEntry> =
                db.list_rated()?.into_iter().map(|(_, entry)| entry).collect();
            let cutoff =
                Utc::now() - ChronoDuration::days(30 * self.config.exclusion_months as i64);
            (live_signal(&rated, &summary), db.recent_recipe_names(cutoff)?)
        };
        for name in &request.exclude_recipes {
            if !exclude.contains(name) {
                exclude.push(name.clone());
            }
        }

        self.emit(PlanPhase::Outlines, 0, 1);
        let outline_request = OutlineRequest {
            count: self.config.outline_count,
            servings: request.servings,
            spice_tolerance: request.spice_tolerance.as_str(),
            exclude_recipes: &exclude,
            signal: &signal,
        };
        let plan = generate_outlines(
            self.model.as_ref(),
            &outline_request,
            self.config.max_selections,
        )
        .await?;
        self.emit(PlanPhase::Outlines, 1, 1);
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        self.set_state(PlanState::GeneratingDetails);
        let mut pool = expand_details(
            self.model.as_ref(),
            &plan.outlines,
            &plan.default_selections,
            self.config.detail_batch_size,
            &self.cancel,
            &self.progress_tx,
        )
        .await?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        self.set_state(PlanState::Normalizing);
        self.emit(PlanPhase::Normalizing, 0, 1);
        normalize_pool(self.model.as_ref(), &mut pool).await?;
        self.emit(PlanPhase::Normalizing, 1, 1);
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        Ok(Some(pool))
    }

    /// Toggle a recipe in or out of the selection. Returns false when the
    /// selection is already at capacity.
    pub fn toggle_selection(&self, index: usize) -> Result<bool> {
        let pool_guard = self.pool.lock().unwrap();
        let Some(pool) = pool_guard.as_ref() else {
            bail!("no recipe pool to select from");
        };
        if index >= pool.recipes.len() {
            bail!("recipe index {} out of range", index);
        }
        let mut selections = self.selections.lock().unwrap();
        let changed = selections.toggle(index, self.config.max_selections);
        if changed {
            self.session.persist_selection(pool, &selections)?;
        }
        Ok(changed)
    }

    /// Push any debounced selection write to disk. Hosts call this when
    /// the process is about to be suspended.
    pub fn flush_session(&self) -> Result<()> {
        self.session.flush()
    }

    /// Throw away a `Ready` pool without committing it.
    pub fn discard_pool(&self) -> Result<()> {
        *self.pool.lock().unwrap() = None;
        *self.selections.lock().unwrap() = SelectionSet::default();
        self.session.clear()?;
        self.set_state(PlanState::Idle);
        Ok(())
    }

    /// Commit the current selection: save the meal plan, then consolidate
    /// its shopping list.
    ///
    /// The plan row is the commit point; the session clears as soon as it
    /// is saved. A consolidation failure leaves the saved plan without a
    /// list and the job in `Error`;
    /// [`retry_consolidation`](Self::retry_consolidation) picks it back up.
    pub async fn confirm(&self) -> Result<MealPlan> {
        let (pool, selections) = {
            let state = self.state.lock().unwrap();
            if *state != PlanState::Ready {
                bail!("no pool ready to confirm");
            }
            let pool = self
                .pool
                .lock()
                .unwrap()
                .clone()
                .context("pool missing in ready state")?;
            (pool, self.selections.lock().unwrap().clone())
        };
        let selected: Vec<GeneratedRecipe> = selections
            .indices()
            .into_iter()
            .filter(|&idx| idx < pool.recipes.len())
            .map(|idx| pool.recipes[idx].clone())
            .collect();
        if selected.is_empty() {
            bail!("no recipes selected");
        }

        let _keep_alive = KeepAliveGuard::acquire(self.keep_alive.clone());
        self.set_state(PlanState::Saving);
        self.emit(PlanPhase::Saving, 0, 1);

        let plan = MealPlan {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            recipe_names: selected.iter().map(|r| r.outline.name.clone()).collect(),
            shopping_list_generated_at: None,
        };
        if let Err(err) = self.db.lock().unwrap().insert_meal_plan(&plan) {
            self.set_state(PlanState::Error(err.to_string()));
            return Err(err).context("failed to save meal plan");
        }
        // The plan is durable; the session and in-memory pool retire here
        self.session.clear()?;
        *self.pool.lock().unwrap() = None;
        *self.selections.lock().unwrap() = SelectionSet::default();
        *self.pending_consolidation.lock().unwrap() = Some((plan.clone(), selected.clone()));
        self.emit(PlanPhase::Saving, 1, 1);
        info!(plan = %plan.id, recipes = plan.recipe_names.len(), "meal plan saved");

        self.run_consolidation(plan, selected).await
    }

    /// Re-run shopping consolidation for a plan saved by a
    /// [`confirm`](Self::confirm) whose consolidation failed.
    pub async fn retry_consolidation(&self) -> Result<MealPlan> {
        let (plan, selected) = self
            .pending_consolidation
            .lock()
            .unwrap()
            .clone()
            .context("no failed consolidation to retry")?;
        let _keep_alive = KeepAliveGuard::acquire(self.keep_alive.clone());
        self.run_consolidation(plan, selected).await
    }

    async fn run_consolidation(
        &self,
        plan: MealPlan,
        selected: Vec<GeneratedRecipe>,
    ) -> Result<MealPlan> {
        self.set_state(PlanState::Consolidating);
        self.emit(PlanPhase::Consolidating, 0, 1);

        let pantry = self.db.lock().unwrap().pantry_snapshot()?;
        match shopping::consolidate(&self.db, self.model.as_ref(), &selected, &pantry, plan.id)
            .await
        {
            Ok(items) => {
                self.emit(PlanPhase::Consolidating, 1, 1);
                *self.pending_consolidation.lock().unwrap() = None;
                self.set_state(PlanState::Complete);
                info!(plan = %plan.id, items = items.len(), "plan complete");
                let stamped = self.db.lock().unwrap().get_meal_plan(plan.id)?;
                Ok(stamped.unwrap_or(plan))
            }
            Err(err) => {
                warn!(plan = %plan.id, error = %err, "consolidation failed; plan saved without list");
                self.set_state(PlanState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Shopping items of the given plan, for display after completion.
    pub fn shopping_list(&self, plan_id: Uuid) -> Result<Vec<ShoppingItem>> {
        self.db.lock().unwrap().list_shopping_items(plan_id)
    }

    fn set_state(&self, state: PlanState) {
        *self.state.lock().unwrap() = state.clone();
        let _ = self.state_tx.send(state);
    }

    fn emit(&self, phase: PlanPhase, current: usize, total: usize) {
        // No subscribers is fine
        let _ = self.progress_tx.send(ProgressEvent {
            phase,
            current,
            total,
            recipe_name: None,
        });
    }
}
