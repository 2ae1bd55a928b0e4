//! Cached access to the image-generation collaborator.
//!
//! Image calls are expensive and rate-limited, so every result is cached by
//! a content key and reused until the entry ages out. The collaborator is
//! driven sequentially by callers; this module adds no concurrency.

use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::database::Database;
use crate::llm::ImageModel;

/// Cache key for a recipe's hero image.
pub fn recipe_key(recipe_name: &str) -> String {
    recipe_name.to_string()
}

/// Cache key for a cooking-step illustration.
pub fn step_key(recipe_name: &str, step_index: usize) -> String {
    format!("step:{}:{}", recipe_name, step_index)
}

/// Cache key for an ingredient thumbnail.
pub fn ingredient_key(ingredient_name: &str) -> String {
    format!("ingredient:{}", ingredient_name)
}

/// Image fetcher with a persistent content-keyed cache.
pub struct CachedImages<'a> {
    db: &'a Mutex<Database>,
    max_age_days: i64,
}

impl<'a> CachedImages<'a> {
    pub fn new(db: &'a Mutex<Database>, max_age_days: i64) -> Self {
        Self { db, max_age_days }
    }

    /// Return cached bytes for `key`, or invoke the collaborator and cache
    /// the result. A model returning no image is not cached, so the next
    /// fetch retries.
    pub async fn fetch(
        &self,
        model: &dyn ImageModel,
        key: &str,
        prompt: &str,
    ) -> Result<Option<Vec<u8>>> {
        let now = Utc::now();
        if let Some(bytes) = self
            .db
            .lock()
            .unwrap()
            .get_cached_image(key, self.max_age_days, now)?
        {
            debug!(key, "image cache hit");
            return Ok(Some(bytes));
        }

        let generated = model
            .generate(prompt)
            .await
            .with_context(|| format!("image generation failed for {}", key))?;

        if let Some(bytes) = &generated {
            self.db
                .lock()
                .unwrap()
                .put_cached_image(key, bytes, Utc::now())?;
        }
        Ok(generated)
    }

    /// Drop expired entries; returns how many were removed.
    pub fn prune(&self) -> Result<usize> {
        self.db
            .lock()
            .unwrap()
            .prune_image_cache(self.max_age_days, Utc::now())
    }
}
