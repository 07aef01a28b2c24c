use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecipeStore, RecipeTable};
use crate::error::StoreError;
use crate::model::{Recipe, RecipeDraft, RecipeId, Step, UserId};

/// Process-local store, used by tests and embedders that persist elsewhere
#[derive(Default)]
pub struct MemoryRecipeStore {
    table: RwLock<RecipeTable>,
}

impl MemoryRecipeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipeStore for MemoryRecipeStore {
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Recipe>, StoreError> {
        Ok(self.table.read().await.find_by_source_url(source_url))
    }

    async fn find_by_id(&self, id: RecipeId) -> Result<Option<Recipe>, StoreError> {
        Ok(self.table.read().await.find_by_id(id))
    }

    async fn insert(&self, draft: RecipeDraft) -> Result<Recipe, StoreError> {
        self.table.write().await.insert(draft)
    }

    async fn update_steps(&self, id: RecipeId, steps: Vec<Step>) -> Result<Recipe, StoreError> {
        self.table.write().await.update_steps(id, steps)
    }

    async fn list_by_creator(&self, user: &UserId) -> Result<Vec<Recipe>, StoreError> {
        Ok(self.table.read().await.list_by_creator(user))
    }
}
