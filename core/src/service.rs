use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use reqwest::Client;

use crate::db::Database;
use crate::fetch::{ImportStage, PageSource, fetch_and_parse_recipe};
use crate::models::{
    ExportData, HistoryEntry, ImportSummary, MealSlot, NewRecipe, PlanningEntry, Recipe,
    RecipeFilter, RecipeMetadata, RecipeStatus, RecipeWithMetadata, ShoppingList,
    ShoppingListStatus, validate_export, validate_recipe, validate_shopping_list, week_start,
};
use crate::remote::github::build_client;
use crate::remote::{FileHost, GithubHost, RemoteConfig, RemoteStore, RetryPolicy, VersionCache};
use crate::shopping::aggregate_ingredients;
use crate::store::{LocalStore, RecipeStore};

/// Turns a stored [`RemoteConfig`] into a live file host.
///
/// The CLI connects to GitHub; tests hand back an in-memory host.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, config: &RemoteConfig) -> Result<Arc<dyn FileHost>>;
}

pub struct GithubConnector {
    client: Client,
}

impl GithubConnector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client().context("Failed to build HTTP client")?,
        })
    }
}

impl RemoteConnector for GithubConnector {
    fn connect(&self, config: &RemoteConfig) -> Result<Arc<dyn FileHost>> {
        config.validate()?;
        Ok(Arc::new(GithubHost::new(self.client.clone(), config.clone())))
    }
}

/// A planned meal with its recipe, `None` when the recipe no longer exists.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PlannedMeal {
    pub entry: PlanningEntry,
    pub recipe: Option<Recipe>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The local store held no records.
    NothingToMigrate,
    Migrated(ImportSummary),
}

/// The application's single entry point to its data.
///
/// Every call checks whether a remote configuration is stored and routes to
/// the remote backend if so, to the local database otherwise.
pub struct DataService {
    local: Arc<LocalStore>,
    cache: Arc<VersionCache>,
    connector: Arc<dyn RemoteConnector>,
    retry: Option<(RetryPolicy, RetryPolicy)>,
}

impl DataService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self::with_connector(db, Arc::new(GithubConnector::new()?)))
    }

    #[must_use]
    pub fn with_connector(db: Database, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            local: Arc::new(LocalStore::new(db)),
            cache: Arc::new(VersionCache::default()),
            connector,
            retry: None,
        }
    }

    /// Override the remote retry policies (recipes, everything else).
    #[must_use]
    pub fn with_retry(mut self, recipes: RetryPolicy, records: RetryPolicy) -> Self {
        self.retry = Some((recipes, records));
        self
    }

    fn remote_store(&self) -> Result<Option<RemoteStore>> {
        let Some(config) = self.remote_config()? else {
            return Ok(None);
        };
        let host = self.connector.connect(&config)?;
        let mut store = RemoteStore::new(host, Arc::clone(&self.cache));
        if let Some((recipes, records)) = self.retry {
            store = store.with_retry(recipes, records);
        }
        Ok(Some(store))
    }

    fn store(&self) -> Result<Arc<dyn RecipeStore>> {
        let store: Arc<dyn RecipeStore> = match self.remote_store()? {
            Some(remote) => Arc::new(remote),
            None => self.local.clone(),
        };
        Ok(store)
    }

    // --- Recipes ---

    pub async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        self.store()?.get_recipe(id).await
    }

    pub async fn get_all_recipes(&self) -> Result<Vec<Recipe>> {
        self.store()?.get_all_recipes().await
    }

    pub async fn get_recipe_with_metadata(&self, id: &str) -> Result<Option<RecipeWithMetadata>> {
        self.store()?.get_recipe_with_metadata(id).await
    }

    pub async fn get_all_recipes_with_metadata(&self) -> Result<Vec<RecipeWithMetadata>> {
        self.store()?.get_all_recipes_with_metadata().await
    }

    /// Recipes joined with metadata, restricted by `filter`, sorted by title.
    pub async fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<RecipeWithMetadata>> {
        let all = self.get_all_recipes_with_metadata().await?;
        Ok(all.into_iter().filter(|r| filter.matches(r)).collect())
    }

    pub async fn create_recipe(&self, new: NewRecipe) -> Result<Recipe> {
        let recipe = new.into_recipe()?;
        self.store()?.save_recipe(&recipe).await?;
        tracing::info!(id = %recipe.id, title = %recipe.title, "created recipe");
        Ok(recipe)
    }

    /// Save edits to an existing recipe. The id and creation time are kept
    /// from the stored copy and `updated_at` moves forward.
    pub async fn update_recipe(&self, mut recipe: Recipe) -> Result<Recipe> {
        let store = self.store()?;
        let Some(existing) = store.get_recipe(&recipe.id).await? else {
            bail!("Recipe '{}' not found", recipe.id);
        };
        recipe.title = recipe.title.trim().to_string();
        recipe.created_at = existing.created_at;
        recipe.updated_at = existing.updated_at;
        recipe.touch();
        validate_recipe(&recipe)?;
        store.save_recipe(&recipe).await?;
        Ok(recipe)
    }

    /// Delete a recipe and its metadata. Planning entries that point at it
    /// are left in place.
    pub async fn delete_recipe(&self, id: &str) -> Result<bool> {
        self.store()?.delete_recipe(id).await
    }

    pub async fn import_recipe_from_url(
        &self,
        source: &dyn PageSource,
        url: &str,
        on_progress: impl FnMut(ImportStage),
    ) -> Result<Recipe> {
        let parsed = fetch_and_parse_recipe(source, url.trim(), on_progress).await?;
        self.create_recipe(NewRecipe::from(parsed)).await
    }

    // --- Metadata ---

    pub async fn get_metadata(&self, id: &str) -> Result<Option<RecipeMetadata>> {
        self.store()?.get_metadata(id).await
    }

    pub async fn save_metadata(&self, metadata: &RecipeMetadata) -> Result<()> {
        self.store()?.save_metadata(metadata).await
    }

    async fn update_metadata(
        &self,
        recipe_id: &str,
        change: impl FnOnce(&mut RecipeMetadata) -> Result<()>,
    ) -> Result<RecipeMetadata> {
        let store = self.store()?;
        let Some(RecipeWithMetadata { mut metadata, .. }) =
            store.get_recipe_with_metadata(recipe_id).await?
        else {
            bail!("Recipe '{recipe_id}' not found");
        };
        change(&mut metadata)?;
        store.save_metadata(&metadata).await?;
        Ok(metadata)
    }

    pub async fn set_status(&self, recipe_id: &str, status: RecipeStatus) -> Result<RecipeMetadata> {
        self.update_metadata(recipe_id, |m| {
            m.status = status;
            Ok(())
        })
        .await
    }

    pub async fn set_rating(&self, recipe_id: &str, rating: Option<u8>) -> Result<RecipeMetadata> {
        self.update_metadata(recipe_id, |m| m.set_rating(rating)).await
    }

    pub async fn add_tag(&self, recipe_id: &str, tag: &str) -> Result<RecipeMetadata> {
        if tag.trim().is_empty() {
            bail!("Tag must not be empty");
        }
        self.update_metadata(recipe_id, |m| {
            m.add_tag(tag);
            Ok(())
        })
        .await
    }

    pub async fn remove_tag(&self, recipe_id: &str, tag: &str) -> Result<RecipeMetadata> {
        self.update_metadata(recipe_id, |m| {
            m.remove_tag(tag);
            Ok(())
        })
        .await
    }

    pub async fn record_cooked(
        &self,
        recipe_id: &str,
        date: NaiveDate,
        notes: Option<String>,
    ) -> Result<RecipeMetadata> {
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.update_metadata(recipe_id, |m| {
            m.history.push(HistoryEntry { date, notes });
            Ok(())
        })
        .await
    }

    // --- Planning ---

    pub async fn get_planning(&self) -> Result<Vec<PlanningEntry>> {
        self.store()?.get_planning().await
    }

    /// Put `recipe_id` in a slot. `week` may be any date of the target week.
    /// Whatever occupied the slot before is removed.
    pub async fn plan_meal(
        &self,
        week: NaiveDate,
        day: u8,
        slot: MealSlot,
        recipe_id: &str,
    ) -> Result<PlanningEntry> {
        let store = self.store()?;
        if store.get_recipe(recipe_id).await?.is_none() {
            bail!("Recipe '{recipe_id}' not found");
        }
        let monday = week_start(week);
        let entry = PlanningEntry::new(monday, day, slot, recipe_id)?;

        for existing in store.get_planning_for_week(monday).await? {
            if existing.occupies(monday, day, slot) {
                store.delete_planning_entry(&existing.id).await?;
            }
        }
        store.save_planning_entry(&entry).await?;
        Ok(entry)
    }

    pub async fn unplan(&self, entry_id: &str) -> Result<bool> {
        self.store()?.delete_planning_entry(entry_id).await
    }

    /// The week containing `week`, in day then slot order (lunch before dinner).
    pub async fn planned_week(&self, week: NaiveDate) -> Result<Vec<PlannedMeal>> {
        let store = self.store()?;
        let mut entries = store.get_planning_for_week(week_start(week)).await?;
        entries.sort_by_key(|e| (e.day, e.slot == MealSlot::Dinner));

        let recipes: HashMap<String, Recipe> = store
            .get_all_recipes()
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        Ok(entries
            .into_iter()
            .map(|entry| {
                let recipe = recipes.get(&entry.recipe_id).cloned();
                if recipe.is_none() {
                    tracing::debug!(entry = %entry.id, recipe = %entry.recipe_id, "planned recipe no longer exists");
                }
                PlannedMeal { entry, recipe }
            })
            .collect())
    }

    // --- Shopping lists ---

    pub async fn get_shopping_lists(&self) -> Result<Vec<ShoppingList>> {
        self.store()?.get_shopping_lists().await
    }

    pub async fn get_shopping_list(&self, id: &str) -> Result<Option<ShoppingList>> {
        self.store()?.get_shopping_list(id).await
    }

    pub async fn delete_shopping_list(&self, id: &str) -> Result<bool> {
        self.store()?.delete_shopping_list(id).await
    }

    /// Build and save a list from every recipe planned in the week containing
    /// `week`. A recipe planned twice counts twice.
    pub async fn generate_shopping_list(&self, name: &str, week: NaiveDate) -> Result<ShoppingList> {
        if name.trim().is_empty() {
            bail!("Shopping list name must not be empty");
        }
        let planned: Vec<Recipe> = self
            .planned_week(week)
            .await?
            .into_iter()
            .filter_map(|meal| meal.recipe)
            .collect();
        if planned.is_empty() {
            bail!(
                "No recipes planned for the week of {}",
                week_start(week).format("%Y-%m-%d")
            );
        }

        let list = ShoppingList::new(name, aggregate_ingredients(&planned));
        validate_shopping_list(&list)?;
        self.store()?.save_shopping_list(&list).await?;
        tracing::info!(id = %list.id, items = list.items.len(), "generated shopping list");
        Ok(list)
    }

    async fn update_list<R>(
        &self,
        list_id: &str,
        change: impl FnOnce(&mut ShoppingList) -> Result<R>,
    ) -> Result<R> {
        let store = self.store()?;
        let Some(mut list) = store.get_shopping_list(list_id).await? else {
            bail!("Shopping list '{list_id}' not found");
        };
        let result = change(&mut list)?;
        store.save_shopping_list(&list).await?;
        Ok(result)
    }

    /// Flip an item's checked flag; returns the new state.
    pub async fn toggle_item(&self, list_id: &str, item_id: &str) -> Result<bool> {
        self.update_list(list_id, |list| list.toggle_item(item_id))
            .await
    }

    pub async fn set_list_status(
        &self,
        list_id: &str,
        status: ShoppingListStatus,
    ) -> Result<ShoppingList> {
        self.update_list(list_id, |list| {
            list.status = status;
            list.updated_at = Some(Utc::now());
            Ok(list.clone())
        })
        .await
    }

    // --- Bulk ---

    pub async fn export_all(&self) -> Result<ExportData> {
        self.store()?.export_all().await
    }

    pub async fn import_all(&self, data: &ExportData) -> Result<ImportSummary> {
        validate_export(data).context("Invalid export bundle")?;
        self.store()?.import_all(data).await
    }

    /// Make the active backend hold exactly the bundle: records it does not
    /// contain are removed.
    pub async fn restore_all(&self, data: &ExportData) -> Result<ImportSummary> {
        validate_export(data).context("Invalid export bundle")?;
        self.store()?.replace_all(data).await
    }

    // --- Backend configuration ---

    pub fn remote_config(&self) -> Result<Option<RemoteConfig>> {
        self.local.with_db(RemoteConfig::load)
    }

    pub fn is_remote(&self) -> Result<bool> {
        Ok(self.remote_config()?.is_some())
    }

    /// Store the remote configuration; the next call goes to the remote.
    pub fn configure_remote(&self, config: &RemoteConfig) -> Result<()> {
        self.local.with_db(|db| config.save(db))?;
        self.cache.clear();
        tracing::info!(owner = %config.owner, repo = %config.repo, branch = %config.branch, "remote backend configured");
        Ok(())
    }

    /// Forget the remote configuration; returns false if none was stored.
    pub fn disconnect_remote(&self) -> Result<bool> {
        let removed = self.local.with_db(RemoteConfig::clear)?;
        self.cache.clear();
        Ok(removed)
    }

    pub fn clear_remote_cache(&self) {
        self.cache.clear();
    }

    /// Delete the four dataset files from the configured remote. Returns how
    /// many existed.
    pub async fn clear_remote(&self) -> Result<usize> {
        let Some(remote) = self.remote_store()? else {
            bail!("No remote backend is configured");
        };
        let deleted = remote
            .clear_all()
            .await
            .context("Failed to clear the remote datasets")?;
        tracing::info!(deleted, "remote datasets cleared");
        Ok(deleted)
    }

    /// Wipe the four local collections. Settings, including the remote
    /// configuration, are kept.
    pub fn clear_local(&self) -> Result<()> {
        self.local.with_db(Database::clear_all)
    }

    /// Copy every local record to the configured remote.
    ///
    /// The four datasets are written one after another and the first failure
    /// is returned; earlier datasets stay written. Re-running is safe since
    /// import upserts by id. Local data is not modified.
    pub async fn migrate_to_remote(&self) -> Result<MigrationOutcome> {
        let Some(remote) = self.remote_store()? else {
            bail!("No remote backend is configured");
        };
        let bundle = self.local.export_all().await?;
        if bundle.is_empty() {
            tracing::info!("local store is empty, nothing to migrate");
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        remote
            .ensure_root()
            .await
            .context("Failed to initialize the remote data directory")?;
        let summary = remote
            .import_all(&bundle)
            .await
            .context("Migration to the remote backend failed")?;
        tracing::info!(
            recipes = summary.recipes_imported,
            planning = summary.planning_imported,
            "migration complete"
        );
        Ok(MigrationOutcome::Migrated(summary))
    }
}
