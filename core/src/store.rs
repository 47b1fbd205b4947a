//! The entity store interface shared by the local and remote backends.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::db::Database;
use crate::models::{
    ExportData, ImportSummary, PlanningEntry, Recipe, RecipeMetadata, RecipeWithMetadata,
    ShoppingList,
};

/// Every entity-kind operation the application performs, implemented once
/// per backend.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>>;
    /// All recipes, sorted by title.
    async fn get_all_recipes(&self) -> Result<Vec<Recipe>>;
    async fn save_recipe(&self, recipe: &Recipe) -> Result<()>;
    /// Removes the recipe and its metadata. Planning entries are left alone.
    async fn delete_recipe(&self, id: &str) -> Result<bool>;

    async fn get_metadata(&self, id: &str) -> Result<Option<RecipeMetadata>>;
    async fn get_all_metadata(&self) -> Result<Vec<RecipeMetadata>>;
    async fn save_metadata(&self, metadata: &RecipeMetadata) -> Result<()>;

    /// Missing metadata is created with defaults and persisted before returning.
    async fn get_recipe_with_metadata(&self, id: &str) -> Result<Option<RecipeWithMetadata>>;
    async fn get_all_recipes_with_metadata(&self) -> Result<Vec<RecipeWithMetadata>>;

    async fn get_planning(&self) -> Result<Vec<PlanningEntry>>;
    async fn get_planning_for_week(&self, week_start: NaiveDate) -> Result<Vec<PlanningEntry>>;
    async fn save_planning_entry(&self, entry: &PlanningEntry) -> Result<()>;
    async fn delete_planning_entry(&self, id: &str) -> Result<bool>;

    async fn get_shopping_list(&self, id: &str) -> Result<Option<ShoppingList>>;
    async fn get_shopping_lists(&self) -> Result<Vec<ShoppingList>>;
    async fn save_shopping_list(&self, list: &ShoppingList) -> Result<()>;
    async fn delete_shopping_list(&self, id: &str) -> Result<bool>;

    async fn export_all(&self) -> Result<ExportData>;
    /// Upsert every record of the bundle by id.
    async fn import_all(&self, data: &ExportData) -> Result<ImportSummary>;
    /// Make the four collections hold exactly the bundle's records.
    async fn replace_all(&self, data: &ExportData) -> Result<ImportSummary>;
}

/// The embedded SQLite database behind the [`RecipeStore`] interface.
pub struct LocalStore {
    db: Mutex<Database>,
}

impl LocalStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a closure against the underlying database (settings, bulk wipes).
    pub fn with_db<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        let db = self.db();
        f(&*db)
    }
}

#[async_trait]
impl RecipeStore for LocalStore {
    async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        self.db().get_recipe(id)
    }

    async fn get_all_recipes(&self) -> Result<Vec<Recipe>> {
        self.db().get_all_recipes()
    }

    async fn save_recipe(&self, recipe: &Recipe) -> Result<()> {
        self.db().put_recipe(recipe)
    }

    async fn delete_recipe(&self, id: &str) -> Result<bool> {
        self.db().delete_recipe(id)
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<RecipeMetadata>> {
        self.db().get_metadata(id)
    }

    async fn get_all_metadata(&self) -> Result<Vec<RecipeMetadata>> {
        self.db().get_all_metadata()
    }

    async fn save_metadata(&self, metadata: &RecipeMetadata) -> Result<()> {
        self.db().put_metadata(metadata)
    }

    async fn get_recipe_with_metadata(&self, id: &str) -> Result<Option<RecipeWithMetadata>> {
        self.db().get_recipe_with_metadata(id)
    }

    async fn get_all_recipes_with_metadata(&self) -> Result<Vec<RecipeWithMetadata>> {
        self.db().get_all_recipes_with_metadata()
    }

    async fn get_planning(&self) -> Result<Vec<PlanningEntry>> {
        self.db().get_all_planning()
    }

    async fn get_planning_for_week(&self, week_start: NaiveDate) -> Result<Vec<PlanningEntry>> {
        self.db().get_planning_for_week(week_start)
    }

    async fn save_planning_entry(&self, entry: &PlanningEntry) -> Result<()> {
        self.db().put_planning_entry(entry)
    }

    async fn delete_planning_entry(&self, id: &str) -> Result<bool> {
        self.db().delete_planning_entry(id)
    }

    async fn get_shopping_list(&self, id: &str) -> Result<Option<ShoppingList>> {
        self.db().get_shopping_list(id)
    }

    async fn get_shopping_lists(&self) -> Result<Vec<ShoppingList>> {
        self.db().get_all_shopping_lists()
    }

    async fn save_shopping_list(&self, list: &ShoppingList) -> Result<()> {
        self.db().put_shopping_list(list)
    }

    async fn delete_shopping_list(&self, id: &str) -> Result<bool> {
        self.db().delete_shopping_list(id)
    }

    async fn export_all(&self) -> Result<ExportData> {
        self.db().export_all()
    }

    async fn import_all(&self, data: &ExportData) -> Result<ImportSummary> {
        self.db().import_all(data)
    }

    async fn replace_all(&self, data: &ExportData) -> Result<ImportSummary> {
        self.db().replace_all(data)
    }
}
