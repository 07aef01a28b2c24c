//! Recipe persistence.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryRecipeStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Recipe, RecipeDraft, RecipeId, Step, UserId};

/// Storage for recipes. `source_url` is unique across the store.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Recipe>, StoreError>;

    async fn find_by_id(&self, id: RecipeId) -> Result<Option<Recipe>, StoreError>;

    /// Create a recipe, failing with [`StoreError::DuplicateSource`] if one
    /// already exists for the same source URL
    async fn insert(&self, draft: RecipeDraft) -> Result<Recipe, StoreError>;

    /// Replace the step list of a recipe. Nothing else changes.
    async fn update_steps(&self, id: RecipeId, steps: Vec<Step>) -> Result<Recipe, StoreError>;

    /// Recipes created by `user`, newest first
    async fn list_by_creator(&self, user: &UserId) -> Result<Vec<Recipe>, StoreError>;
}

/// In-memory recipe table shared by the reference stores
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(from = "RecipeDocument", into = "RecipeDocument")]
pub(crate) struct RecipeTable {
    recipes: HashMap<RecipeId, Recipe>,
    by_source: HashMap<String, RecipeId>,
}

/// On-disk layout of a [`RecipeTable`]
#[derive(Serialize, Deserialize)]
struct RecipeDocument {
    #[serde(default)]
    recipes: Vec<Recipe>,
}

impl From<RecipeDocument> for RecipeTable {
    fn from(document: RecipeDocument) -> Self {
        let mut table = RecipeTable::default();
        for recipe in document.recipes {
            table.by_source.insert(recipe.source_url.clone(), recipe.id);
            table.recipes.insert(recipe.id, recipe);
        }
        table
    }
}

impl From<RecipeTable> for RecipeDocument {
    fn from(table: RecipeTable) -> Self {
        let mut recipes: Vec<Recipe> = table.recipes.into_values().collect();
        recipes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        RecipeDocument { recipes }
    }
}

impl RecipeTable {
    pub(crate) fn find_by_source_url(&self, source_url: &str) -> Option<Recipe> {
        self.by_source
            .get(source_url)
            .and_then(|id| self.recipes.get(id))
            .cloned()
    }

    pub(crate) fn find_by_id(&self, id: RecipeId) -> Option<Recipe> {
        self.recipes.get(&id).cloned()
    }

    pub(crate) fn insert(&mut self, draft: RecipeDraft) -> Result<Recipe, StoreError> {
        if self.by_source.contains_key(&draft.source_url) {
            return Err(StoreError::DuplicateSource(draft.source_url));
        }

        let recipe = draft.into_recipe(Uuid::new_v4(), Utc::now());
        self.by_source.insert(recipe.source_url.clone(), recipe.id);
        self.recipes.insert(recipe.id, recipe.clone());
        Ok(recipe)
    }

    pub(crate) fn update_steps(&mut self, id: RecipeId, steps: Vec<Step>) -> Result<Recipe, StoreError> {
        let recipe = self.recipes.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        recipe.steps = steps;
        Ok(recipe.clone())
    }

    pub(crate) fn list_by_creator(&self, user: &UserId) -> Vec<Recipe> {
        let mut recipes: Vec<Recipe> = self
            .recipes
            .values()
            .filter(|recipe| recipe.is_owned_by(user))
            .cloned()
            .collect();
        recipes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recipes
    }
}
