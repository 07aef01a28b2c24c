use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::fs;
use tokio::sync::Mutex;

use super::{RecipeStore, RecipeTable};
use crate::error::StoreError;
use crate::model::{Recipe, RecipeDraft, RecipeId, Step, UserId};

/// Store kept in a single JSON document on disk.
///
/// Every write rewrites the whole document to a sibling temp file and
/// renames it over the original.
pub struct JsonFileStore {
    path: PathBuf,
    table: Mutex<RecipeTable>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let table = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => RecipeTable::default(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RecipeTable::default(),
            Err(e) => return Err(e.into()),
        };

        debug!("Opened recipe store at {}", path.display());
        Ok(JsonFileStore {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &RecipeTable) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(table)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecipeStore for JsonFileStore {
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<Recipe>, StoreError> {
        Ok(self.table.lock().await.find_by_source_url(source_url))
    }

    async fn find_by_id(&self, id: RecipeId) -> Result<Option<Recipe>, StoreError> {
        Ok(self.table.lock().await.find_by_id(id))
    }

    async fn insert(&self, draft: RecipeDraft) -> Result<Recipe, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let recipe = next.insert(draft)?;
        self.persist(&next).await?;
        *table = next;
        Ok(recipe)
    }

    async fn update_steps(&self, id: RecipeId, steps: Vec<Step>) -> Result<Recipe, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let recipe = next.update_steps(id, steps)?;
        self.persist(&next).await?;
        *table = next;
        Ok(recipe)
    }

    async fn list_by_creator(&self, user: &UserId) -> Result<Vec<Recipe>, StoreError> {
        Ok(self.table.lock().await.list_by_creator(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::draft;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("recipes.json")).await.unwrap();
        assert!(store
            .list_by_creator(&UserId::new("alice"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_writes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        let recipe = store
            .insert(draft("https://www.instagram.com/reel/B/", Some("alice")))
            .await
            .unwrap();
        let timed = vec![Step::new(1, "Boil water.").with_timing(0.0, 20.0)];
        store.update_steps(recipe.id, timed.clone()).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let found = reopened.find_by_id(recipe.id).await.unwrap().unwrap();
        assert_eq!(found.steps, timed);
        assert_eq!(found.original_steps, recipe.original_steps);
        assert!(matches!(
            reopened
                .insert(draft("https://www.instagram.com/reel/B/", None))
                .await,
            Err(StoreError::DuplicateSource(_))
        ));
        assert!(!dir.path().join("recipes.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
