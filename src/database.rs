//! SQLite-backed persistent store for the planning core.
//!
//! The core treats this as a transactional document/key-value store over the
//! collections it owns: pantry ingredients, recipe history, meal plans,
//! shopping items, the preference summary, the generation session, and the
//! image cache. The preference summary and generation session are each a
//! single-row table by construction; writes to them are last-writer-wins
//! snapshots.
//!
//! Timestamps are stored as RFC 3339 text, list-shaped columns as JSON.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::{
    GenerationSession, HistoryEntry, IngredientCategory, MealPlan, PantryIngredient, PantryItem,
    PreferenceSummary, ShoppingItem, WouldMakeAgain,
};

/// Database wrapper owning the single connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self { conn })
    }

    /// In-memory database for tests.
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Create all tables and indexes if they do not exist.
    pub fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pantry_ingredients (
                name TEXT PRIMARY KEY,
                unit TEXT NOT NULL,
                quantity_initial REAL NOT NULL,
                quantity_remaining REAL NOT NULL,
                category TEXT NOT NULL,
                perishable INTEGER NOT NULL DEFAULT 0,
                expires_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_pantry_category ON pantry_ingredients(category);

            CREATE TABLE IF NOT EXISTS recipe_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipe_name TEXT NOT NULL,
                rating INTEGER,
                would_make_again TEXT NOT NULL DEFAULT 'undecided',
                date_cooked TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                ingredients TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_history_date ON recipe_history(date_cooked DESC);
            CREATE INDEX IF NOT EXISTS idx_history_rating ON recipe_history(rating);

            CREATE TABLE IF NOT EXISTS meal_plans (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                recipe_names TEXT NOT NULL DEFAULT '[]',
                shopping_list_generated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS shopping_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                meal_plan_id TEXT NOT NULL,
                ingredient_name TEXT NOT NULL,
                quantity REAL NOT NULL,
                unit TEXT NOT NULL,
                category TEXT NOT NULL,
                checked INTEGER NOT NULL DEFAULT 0,
                notes TEXT,

                FOREIGN KEY(meal_plan_id) REFERENCES meal_plans(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_shopping_plan ON shopping_items(meal_plan_id);

            CREATE TABLE IF NOT EXISTS preference_summary (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                profile TEXT NOT NULL DEFAULT '',
                likes TEXT NOT NULL DEFAULT '[]',
                dislikes TEXT NOT NULL DEFAULT '[]',
                entries_compacted INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS generation_session (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                started_at TEXT NOT NULL,
                pool TEXT,
                selections TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS image_cache (
                cache_key TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    // ========================================================================
    // Pantry
    // ========================================================================

    pub fn upsert_pantry_ingredient(&self, ingredient: &PantryIngredient) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO pantry_ingredients
                (name, unit, quantity_initial, quantity_remaining, category, perishable, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(name) DO UPDATE SET
                unit = excluded.unit,
                quantity_initial = excluded.quantity_initial,
                quantity_remaining = excluded.quantity_remaining,
                category = excluded.category,
                perishable = excluded.perishable,
                expires_at = excluded.expires_at
            "#,
            params![
                ingredient.name,
                ingredient.unit,
                ingredient.quantity_initial,
                ingredient.quantity_remaining,
                ingredient.category.as_str(),
                ingredient.perishable,
                ingredient.expires_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn list_pantry(&self) -> Result<Vec<PantryIngredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, unit, quantity_initial, quantity_remaining, category, perishable, expires_at
             FROM pantry_ingredients ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_pantry_ingredient)?;
        collect_rows(rows)
    }

    /// Read-only `{name, quantity_remaining, unit}` snapshot consumed by
    /// generation and consolidation.
    pub fn pantry_snapshot(&self) -> Result<Vec<PantryItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, quantity_remaining, unit FROM pantry_ingredients ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PantryItem {
                name: row.get(0)?,
                quantity_remaining: row.get(1)?,
                unit: row.get(2)?,
            })
        })?;
        collect_rows(rows)
    }

    // ========================================================================
    // Recipe history
    // ========================================================================

    pub fn insert_history(&self, entry: &HistoryEntry) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO recipe_history
                (recipe_name, rating, would_make_again, date_cooked, tags, ingredients)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.recipe_name,
                entry.rating,
                entry.would_make_again.as_str(),
                entry.date_cooked.to_rfc3339(),
                serde_json::to_string(&entry.tags)?,
                serde_json::to_string(&entry.ingredients)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Record a rating on an existing entry. The compaction trigger runs
    /// after this write commits, never from inside it.
    pub fn record_rating(
        &self,
        entry_id: i64,
        rating: u8,
        would_make_again: WouldMakeAgain,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE recipe_history SET rating = ?1, would_make_again = ?2 WHERE id = ?3",
            params![rating, would_make_again.as_str(), entry_id],
        )?;
        if updated == 0 {
            return Err(anyhow!("history entry {} not found", entry_id));
        }
        Ok(())
    }

    /// All rated entries, most recently cooked first.
    pub fn list_rated(&self) -> Result<Vec<(i64, HistoryEntry)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recipe_name, rating, would_make_again, date_cooked, tags, ingredients
             FROM recipe_history WHERE rating IS NOT NULL ORDER BY date_cooked DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row_to_history(row)?))
        })?;
        collect_rows(rows)
    }

    pub fn rated_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM recipe_history WHERE rating IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Distinct recipe names cooked since `cutoff`, for generation exclusion.
    pub fn recent_recipe_names(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT recipe_name FROM recipe_history
             WHERE date_cooked >= ?1 ORDER BY recipe_name",
        )?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], |row| row.get(0))?;
        collect_rows(rows)
    }

    /// Delete compacted entries and persist the merged summary atomically.
    /// Either both happen or neither does, so a failure is never destructive.
    pub fn apply_compaction(
        &mut self,
        compacted_ids: &[i64],
        summary: &PreferenceSummary,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        for id in compacted_ids {
            tx.execute("DELETE FROM recipe_history WHERE id = ?1", params![id])?;
        }
        write_summary(&tx, summary)?;
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Preference summary
    // ========================================================================

    /// Load the single summary row, or an empty summary if none exists yet.
    pub fn load_summary(&self, now: DateTime<Utc>) -> Result<PreferenceSummary> {
        let row = self
            .conn
            .query_row(
                "SELECT profile, likes, dislikes, entries_compacted, updated_at
                 FROM preference_summary WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((profile, likes, dislikes, entries_compacted, updated_at)) => {
                Ok(PreferenceSummary {
                    profile,
                    likes: serde_json::from_str(&likes).context("likes column")?,
                    dislikes: serde_json::from_str(&dislikes).context("dislikes column")?,
                    entries_compacted,
                    updated_at: parse_timestamp(&updated_at)?,
                })
            }
            None => Ok(PreferenceSummary::empty(now)),
        }
    }

    pub fn save_summary(&self, summary: &PreferenceSummary) -> Result<()> {
        write_summary(&self.conn, summary)
    }

    // ========================================================================
    // Meal plans & shopping items
    // ========================================================================

    pub fn insert_meal_plan(&self, plan: &MealPlan) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meal_plans (id, created_at, recipe_names, shopping_list_generated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                plan.id.to_string(),
                plan.created_at.to_rfc3339(),
                serde_json::to_string(&plan.recipe_names)?,
                plan.shopping_list_generated_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_meal_plan(&self, id: Uuid) -> Result<Option<MealPlan>> {
        self.conn
            .query_row(
                "SELECT id, created_at, recipe_names, shopping_list_generated_at
                 FROM meal_plans WHERE id = ?1",
                params![id.to_string()],
                row_to_meal_plan,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All saved plans, newest first.
    pub fn list_meal_plans(&self) -> Result<Vec<MealPlan>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, recipe_names, shopping_list_generated_at
             FROM meal_plans ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_meal_plan)?;
        collect_rows(rows)
    }

    /// Replace the plan's shopping batch and stamp the generated marker in
    /// one transaction. On failure the previous batch is left in place.
    pub fn replace_shopping_items(
        &mut self,
        plan_id: Uuid,
        items: &[ShoppingItem],
        generated_at: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM shopping_items WHERE meal_plan_id = ?1",
            params![plan_id.to_string()],
        )?;
        for item in items {
            tx.execute(
                r#"
                INSERT INTO shopping_items
                    (meal_plan_id, ingredient_name, quantity, unit, category, checked, notes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    plan_id.to_string(),
                    item.ingredient_name,
                    item.quantity,
                    item.unit,
                    item.category.as_str(),
                    item.checked,
                    item.notes,
                ],
            )?;
        }
        let updated = tx.execute(
            "UPDATE meal_plans SET shopping_list_generated_at = ?1 WHERE id = ?2",
            params![generated_at.to_rfc3339(), plan_id.to_string()],
        )?;
        if updated == 0 {
            return Err(anyhow!("meal plan {} not found", plan_id));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_shopping_items(&self, plan_id: Uuid) -> Result<Vec<ShoppingItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, meal_plan_id, ingredient_name, quantity, unit, category, checked, notes
             FROM shopping_items WHERE meal_plan_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![plan_id.to_string()], row_to_shopping_item)?;
        collect_rows(rows)
    }

    pub fn set_item_checked(&self, item_id: i64, checked: bool) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE shopping_items SET checked = ?1 WHERE id = ?2",
            params![checked, item_id],
        )?;
        if updated == 0 {
            return Err(anyhow!("shopping item {} not found", item_id));
        }
        Ok(())
    }

    /// Fold checked items back into pantry stock and clear the plan's batch.
    /// Returns the number of items folded in.
    pub fn complete_shopping_trip(&mut self, plan_id: Uuid) -> Result<usize> {
        let items = self.list_shopping_items(plan_id)?;
        let tx = self.conn.transaction()?;
        let mut folded = 0;

        for item in items.iter().filter(|i| i.checked) {
            let updated = tx.execute(
                "UPDATE pantry_ingredients SET
                     quantity_remaining = quantity_remaining + ?1,
                     quantity_initial = quantity_initial + ?1
                 WHERE name = ?2",
                params![item.quantity, item.ingredient_name],
            )?;
            if updated == 0 {
                tx.execute(
                    r#"
                    INSERT INTO pantry_ingredients
                        (name, unit, quantity_initial, quantity_remaining, category, perishable)
                    VALUES (?1, ?2, ?3, ?3, ?4, 0)
                    "#,
                    params![
                        item.ingredient_name,
                        item.unit,
                        item.quantity,
                        item.category.as_str(),
                    ],
                )?;
            }
            folded += 1;
        }

        tx.execute(
            "DELETE FROM shopping_items WHERE meal_plan_id = ?1",
            params![plan_id.to_string()],
        )?;
        tx.commit()?;
        Ok(folded)
    }

    // ========================================================================
    // Generation session
    // ========================================================================

    /// Write the single session row (last-writer-wins snapshot).
    pub fn write_session(&self, session: &GenerationSession) -> Result<()> {
        let pool = session
            .pool
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            r#"
            INSERT INTO generation_session (id, started_at, pool, selections)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                started_at = excluded.started_at,
                pool = excluded.pool,
                selections = excluded.selections
            "#,
            params![
                session.started_at.to_rfc3339(),
                pool,
                serde_json::to_string(&session.selections)?,
            ],
        )?;
        Ok(())
    }

    pub fn read_session(&self) -> Result<Option<GenerationSession>> {
        let row = self
            .conn
            .query_row(
                "SELECT started_at, pool, selections FROM generation_session WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((started_at, pool, selections)) => Ok(Some(GenerationSession {
                started_at: parse_timestamp(&started_at)?,
                pool: pool
                    .map(|p| serde_json::from_str(&p))
                    .transpose()
                    .context("session pool column")?,
                selections: serde_json::from_str(&selections).context("session selections")?,
            })),
            None => Ok(None),
        }
    }

    /// Single-statement atomic clear.
    pub fn clear_session(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM generation_session WHERE id = 1", [])?;
        Ok(())
    }

    // ========================================================================
    // Image cache
    // ========================================================================

    pub fn put_cached_image(&self, key: &str, data: &[u8], now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO image_cache (cache_key, data, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(cache_key) DO UPDATE SET
                data = excluded.data,
                created_at = excluded.created_at
            "#,
            params![key, data, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Cached bytes for `key`, unless the entry is older than `max_age_days`.
    pub fn get_cached_image(
        &self,
        key: &str,
        max_age_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<u8>>> {
        let cutoff = now - Duration::days(max_age_days);
        self.conn
            .query_row(
                "SELECT data FROM image_cache WHERE cache_key = ?1 AND created_at >= ?2",
                params![key, cutoff.to_rfc3339()],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Drop expired cache entries, returning how many were removed.
    pub fn prune_image_cache(&self, max_age_days: i64, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::days(max_age_days);
        let removed = self.conn.execute(
            "DELETE FROM image_cache WHERE created_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_pantry_ingredient(row: &Row<'_>) -> rusqlite::Result<PantryIngredient> {
    let category: String = row.get(4)?;
    let expires_at: Option<String> = row.get(6)?;
    Ok(PantryIngredient {
        name: row.get(0)?,
        unit: row.get(1)?,
        quantity_initial: row.get(2)?,
        quantity_remaining: row.get(3)?,
        category: IngredientCategory::parse(&category),
        perishable: row.get(5)?,
        expires_at: expires_at.and_then(|t| parse_timestamp(&t).ok()),
    })
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let would: String = row.get(3)?;
    let date: String = row.get(4)?;
    let tags: String = row.get(5)?;
    let ingredients: String = row.get(6)?;
    Ok(HistoryEntry {
        recipe_name: row.get(1)?,
        rating: row.get(2)?,
        would_make_again: WouldMakeAgain::parse(&would),
        date_cooked: parse_timestamp(&date).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        ingredients: serde_json::from_str(&ingredients).unwrap_or_default(),
    })
}

fn row_to_meal_plan(row: &Row<'_>) -> rusqlite::Result<MealPlan> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(1)?;
    let names: String = row.get(2)?;
    let generated: Option<String> = row.get(3)?;
    Ok(MealPlan {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
        })?,
        created_at: parse_timestamp(&created_at).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?,
        recipe_names: serde_json::from_str(&names).unwrap_or_default(),
        shopping_list_generated_at: generated.and_then(|t| parse_timestamp(&t).ok()),
    })
}

fn row_to_shopping_item(row: &Row<'_>) -> rusqlite::Result<ShoppingItem> {
    let plan_id: String = row.get(1)?;
    let category: String = row.get(5)?;
    Ok(ShoppingItem {
        id: row.get(0)?,
        meal_plan_id: Uuid::parse_str(&plan_id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?,
        ingredient_name: row.get(2)?,
        quantity: row.get(3)?,
        unit: row.get(4)?,
        category: IngredientCategory::parse(&category),
        checked: row.get(6)?,
        notes: row.get(7)?,
    })
}

fn write_summary(conn: &Connection, summary: &PreferenceSummary) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO preference_summary (id, profile, likes, dislikes, entries_compacted, updated_at)
        VALUES (1, ?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
            profile = excluded.profile,
            likes = excluded.likes,
            dislikes = excluded.dislikes,
            entries_compacted = excluded.entries_compacted,
            updated_at = excluded.updated_at
        "#,
        params![
            summary.profile,
            serde_json::to_string(&summary.likes)?,
            serde_json::to_string(&summary.dislikes)?,
            summary.entries_compacted,
            summary.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp: {}", text))
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
