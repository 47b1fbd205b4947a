//! Remote dataset store.
//!
//! Each dataset is one pretty-printed JSON array committed to a file host.
//! Writes are compare-and-swap on the file's version token: every write
//! re-reads the file, applies its change to the fresh array, and supplies the
//! token it read. A conflicting write is retried with exponential backoff and
//! becomes [`RemoteError::ConflictRetriesExhausted`] once the policy runs out.

pub mod github;
pub mod memory;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{
    ExportData, Identified, ImportSummary, PlanningEntry, Recipe, RecipeMetadata,
    RecipeWithMetadata, ShoppingList,
};
use crate::store::RecipeStore;

pub use github::{GithubHost, RemoteConfig};
pub use memory::MemoryFileHost;

/// Marker file created by [`RemoteStore::ensure_root`].
pub const ROOT_MARKER_PATH: &str = "data/.gitkeep";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Recipes,
    Metadata,
    Planning,
    ShoppingLists,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Recipes,
        Dataset::Metadata,
        Dataset::Planning,
        Dataset::ShoppingLists,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Dataset::Recipes => "recipes",
            Dataset::Metadata => "metadata",
            Dataset::Planning => "planning",
            Dataset::ShoppingLists => "shoppingLists",
        }
    }

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Dataset::Recipes => "data/recipes.json",
            Dataset::Metadata => "data/metadata.json",
            Dataset::Planning => "data/planning.json",
            Dataset::ShoppingLists => "data/shopping-lists.json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    /// Opaque token naming this revision of the file.
    pub version: String,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Write conflict on {path}: the file changed on the remote")]
    Conflict { path: String },

    #[error(
        "The {dataset} data kept changing on the remote ({attempts} attempts); reload and retry"
    )]
    ConflictRetriesExhausted {
        dataset: &'static str,
        attempts: u32,
    },

    #[error("The remote access token is invalid or expired")]
    Unauthorized,

    #[error("The remote access token cannot write {path}; it needs write (contents) scope")]
    Forbidden { path: String },

    #[error("Remote location not found for {path}; check owner, repository and branch")]
    MissingLocation { path: String },

    #[error("Remote API returned HTTP {status} for {path}")]
    Status { path: String, status: u16 },

    #[error("Remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not decode remote file {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Invalid JSON in remote file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RemoteError {
    /// Map a failed write or delete status to the error taxonomy.
    #[must_use]
    pub fn from_status(path: &str, status: u16) -> Self {
        let path = path.to_string();
        match status {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::Forbidden { path },
            404 => RemoteError::MissingLocation { path },
            // 422 is what the host answers when a file appeared after we saw it missing.
            409 | 422 => RemoteError::Conflict { path },
            _ => RemoteError::Status { path, status },
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RemoteError::Conflict { .. } | RemoteError::ConflictRetriesExhausted { .. }
        )
    }
}

/// Operations a remote file host must support.
#[async_trait]
pub trait FileHost: Send + Sync {
    /// `Ok(None)` when the path does not exist. `bypass_cache` defeats any
    /// intermediate HTTP caching.
    async fn read(&self, path: &str, bypass_cache: bool) -> Result<Option<RemoteFile>, RemoteError>;

    /// Create or replace a file. `expected` is the version being replaced,
    /// `None` when creating. Returns the new version token.
    async fn write(
        &self,
        path: &str,
        content: &str,
        message: &str,
        expected: Option<&str>,
    ) -> Result<String, RemoteError>;

    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

pub const RECIPES_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_millis(100),
};

pub const RECORD_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_millis(150),
};

impl RetryPolicy {
    /// Wait before the retry following failed attempt `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Last version token seen per dataset. A hint only; writes never trust it.
#[derive(Debug, Default)]
pub struct VersionCache {
    tokens: Mutex<HashMap<Dataset, String>>,
}

impl VersionCache {
    fn tokens(&self) -> MutexGuard<'_, HashMap<Dataset, String>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, dataset: Dataset) -> Option<String> {
        self.tokens().get(&dataset).cloned()
    }

    pub fn record(&self, dataset: Dataset, version: &str) {
        self.tokens().insert(dataset, version.to_string());
    }

    pub fn forget(&self, dataset: Dataset) {
        self.tokens().remove(&dataset);
    }

    pub fn clear(&self) {
        self.tokens().clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }
}

fn to_document<T: Serialize>(dataset: Dataset, items: &[T]) -> Result<String, RemoteError> {
    let mut text = serde_json::to_string_pretty(items).map_err(|source| RemoteError::Json {
        path: dataset.path().to_string(),
        source,
    })?;
    text.push('\n');
    Ok(text)
}

/// An existing file is always a JSON array. Blank content is refused rather
/// than read as empty, so a write can never replace data it failed to see.
fn parse_document<T: DeserializeOwned>(dataset: Dataset, content: &str) -> Result<Vec<T>, RemoteError> {
    if content.trim().is_empty() {
        return Err(RemoteError::Decode {
            path: dataset.path().to_string(),
            reason: "the file exists but its content is empty".to_string(),
        });
    }
    serde_json::from_str(content).map_err(|source| RemoteError::Json {
        path: dataset.path().to_string(),
        source,
    })
}

/// Replace the record with the same id, or append it.
fn upsert<T: Identified + Clone>(items: &mut Vec<T>, record: &T) {
    match items.iter_mut().find(|item| item.id() == record.id()) {
        Some(existing) => *existing = record.clone(),
        None => items.push(record.clone()),
    }
}

pub struct RemoteStore {
    host: Arc<dyn FileHost>,
    cache: Arc<VersionCache>,
    recipes_retry: RetryPolicy,
    records_retry: RetryPolicy,
}

impl RemoteStore {
    #[must_use]
    pub fn new(host: Arc<dyn FileHost>, cache: Arc<VersionCache>) -> Self {
        Self {
            host,
            cache,
            recipes_retry: RECIPES_RETRY,
            records_retry: RECORD_RETRY,
        }
    }

    /// Override the retry policies (recipes, everything else).
    #[must_use]
    pub fn with_retry(mut self, recipes: RetryPolicy, records: RetryPolicy) -> Self {
        self.recipes_retry = recipes;
        self.records_retry = records;
        self
    }

    fn policy(&self, dataset: Dataset) -> RetryPolicy {
        match dataset {
            Dataset::Recipes => self.recipes_retry,
            _ => self.records_retry,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Read a dataset file, recording its version token.
    pub async fn get_file(
        &self,
        dataset: Dataset,
        bypass_cache: bool,
    ) -> Result<Option<RemoteFile>, RemoteError> {
        let file = self.host.read(dataset.path(), bypass_cache).await?;
        match &file {
            Some(f) => self.cache.record(dataset, &f.version),
            None => self.cache.forget(dataset),
        }
        tracing::debug!(
            dataset = dataset.name(),
            found = file.is_some(),
            bypass_cache,
            "read remote file"
        );
        Ok(file)
    }

    /// Load a dataset array. A missing file is an empty collection.
    pub async fn load<T: DeserializeOwned>(&self, dataset: Dataset) -> Result<Vec<T>, RemoteError> {
        Ok(self.load_with_version(dataset, false).await?.0)
    }

    async fn load_with_version<T: DeserializeOwned>(
        &self,
        dataset: Dataset,
        bypass_cache: bool,
    ) -> Result<(Vec<T>, Option<String>), RemoteError> {
        match self.get_file(dataset, bypass_cache).await? {
            Some(file) => Ok((parse_document(dataset, &file.content)?, Some(file.version))),
            None => Ok((Vec::new(), None)),
        }
    }

    /// The read-modify-write loop every remote mutation goes through.
    ///
    /// Each attempt reads the file fresh, hands the array to `mutate`, and
    /// writes the result against the version it read. `mutate` returns false
    /// when it changed nothing, in which case no write is made. Returns
    /// whether a write happened.
    pub async fn update<T, F>(
        &self,
        dataset: Dataset,
        message: &str,
        policy: RetryPolicy,
        mut mutate: F,
    ) -> Result<bool, RemoteError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnMut(&mut Vec<T>) -> bool + Send,
    {
        let mut attempt = 0;
        loop {
            let (mut items, version) = self.load_with_version::<T>(dataset, true).await?;
            if !mutate(&mut items) {
                return Ok(false);
            }
            let content = to_document(dataset, &items)?;

            match self
                .host
                .write(dataset.path(), &content, message, version.as_deref())
                .await
            {
                Ok(new_version) => {
                    self.cache.record(dataset, &new_version);
                    tracing::info!(
                        dataset = dataset.name(),
                        records = items.len(),
                        attempt,
                        "remote write committed"
                    );
                    if let Err(e) = self.get_file(dataset, true).await {
                        tracing::warn!(dataset = dataset.name(), error = %e, "could not refresh version after write");
                        self.cache.forget(dataset);
                    }
                    return Ok(true);
                }
                Err(RemoteError::Conflict { .. }) => {
                    back_off(dataset, policy, &mut attempt).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replace a whole dataset with `items`. Records added concurrently by
    /// another writer are dropped; conflicts are still retried so the write
    /// always lands on the version it read.
    pub async fn save_data<T>(&self, dataset: Dataset, items: &[T], message: &str) -> Result<(), RemoteError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        self.update(dataset, message, self.policy(dataset), |current: &mut Vec<T>| {
            if current.is_empty() && items.is_empty() {
                return false;
            }
            *current = items.to_vec();
            true
        })
        .await
        .map(|_| ())
    }

    /// Delete a dataset file against the version just read, retrying on
    /// conflict. Returns false when the file did not exist.
    pub async fn delete_file(&self, dataset: Dataset, message: &str) -> Result<bool, RemoteError> {
        let policy = self.policy(dataset);
        let mut attempt = 0;
        loop {
            let Some(file) = self.get_file(dataset, true).await? else {
                return Ok(false);
            };
            match self.host.delete(dataset.path(), &file.version, message).await {
                Ok(()) => {
                    self.cache.forget(dataset);
                    tracing::info!(dataset = dataset.name(), attempt, "remote file deleted");
                    return Ok(true);
                }
                Err(RemoteError::Conflict { .. }) => {
                    back_off(dataset, policy, &mut attempt).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete every dataset file. The root marker stays. Returns how many
    /// files existed.
    pub async fn clear_all(&self) -> Result<usize, RemoteError> {
        let mut deleted = 0;
        for dataset in Dataset::ALL {
            if self
                .delete_file(dataset, &format!("Clear {}", dataset.name()))
                .await?
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub async fn save_record<T>(&self, dataset: Dataset, record: &T, message: &str) -> Result<(), RemoteError>
    where
        T: Identified + Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        self.update(dataset, message, self.policy(dataset), |items: &mut Vec<T>| {
            upsert(items, record);
            true
        })
        .await
        .map(|_| ())
    }

    /// Upsert many records in a single write.
    pub async fn save_records<T>(&self, dataset: Dataset, records: &[T], message: &str) -> Result<(), RemoteError>
    where
        T: Identified + Serialize + DeserializeOwned + Clone + Send + Sync,
    {
        if records.is_empty() {
            return Ok(());
        }
        self.update(dataset, message, self.policy(dataset), |items: &mut Vec<T>| {
            for record in records {
                upsert(items, record);
            }
            true
        })
        .await
        .map(|_| ())
    }

    pub async fn delete_record<T>(&self, dataset: Dataset, id: &str, message: &str) -> Result<bool, RemoteError>
    where
        T: Identified + Serialize + DeserializeOwned + Send + Sync,
    {
        self.update(dataset, message, self.policy(dataset), |items: &mut Vec<T>| {
            let before = items.len();
            items.retain(|item| item.id() != id);
            items.len() != before
        })
        .await
    }

    /// Create the dataset root marker if it does not exist. Returns true
    /// when the marker was created by this call.
    pub async fn ensure_root(&self) -> Result<bool, RemoteError> {
        if self.host.read(ROOT_MARKER_PATH, true).await?.is_some() {
            return Ok(false);
        }
        match self
            .host
            .write(ROOT_MARKER_PATH, "", "Initialize recipe data", None)
            .await
        {
            Ok(_) => {
                tracing::info!(path = ROOT_MARKER_PATH, "created remote data root");
                Ok(true)
            }
            // Someone else created it in the meantime.
            Err(RemoteError::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn find<T: Identified + DeserializeOwned>(&self, dataset: Dataset, id: &str) -> Result<Option<T>, RemoteError> {
        Ok(self
            .load::<T>(dataset)
            .await?
            .into_iter()
            .find(|item| item.id() == id))
    }
}

/// Count a conflicting attempt and wait before the next one, or give up once
/// the policy is spent.
async fn back_off(dataset: Dataset, policy: RetryPolicy, attempt: &mut u32) -> Result<(), RemoteError> {
    *attempt += 1;
    if *attempt >= policy.max_attempts.max(1) {
        tracing::warn!(dataset = dataset.name(), attempts = *attempt, "giving up after repeated conflicts");
        return Err(RemoteError::ConflictRetriesExhausted {
            dataset: dataset.name(),
            attempts: *attempt,
        });
    }
    let delay = policy.delay(*attempt - 1);
    tracing::warn!(
        dataset = dataset.name(),
        attempt = *attempt,
        delay_ms = delay.as_millis(),
        "remote write conflict, retrying"
    );
    tokio::time::sleep(delay).await;
    Ok(())
}

fn sort_by_title(recipes: &mut [Recipe]) {
    recipes.sort_by(|a, b| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl RecipeStore for RemoteStore {
    async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        Ok(self.find(Dataset::Recipes, id).await?)
    }

    async fn get_all_recipes(&self) -> Result<Vec<Recipe>> {
        let mut recipes: Vec<Recipe> = self.load(Dataset::Recipes).await?;
        sort_by_title(&mut recipes);
        Ok(recipes)
    }

    async fn save_recipe(&self, recipe: &Recipe) -> Result<()> {
        let message = format!("Save recipe: {}", recipe.title);
        Ok(self.save_record(Dataset::Recipes, recipe, &message).await?)
    }

    async fn delete_recipe(&self, id: &str) -> Result<bool> {
        let removed = self
            .delete_record::<Recipe>(Dataset::Recipes, id, &format!("Delete recipe {id}"))
            .await?;
        self.delete_record::<RecipeMetadata>(
            Dataset::Metadata,
            id,
            &format!("Delete metadata {id}"),
        )
        .await?;
        Ok(removed)
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<RecipeMetadata>> {
        Ok(self.find(Dataset::Metadata, id).await?)
    }

    async fn get_all_metadata(&self) -> Result<Vec<RecipeMetadata>> {
        Ok(self.load(Dataset::Metadata).await?)
    }

    async fn save_metadata(&self, metadata: &RecipeMetadata) -> Result<()> {
        let message = format!("Update metadata {}", metadata.id);
        Ok(self.save_record(Dataset::Metadata, metadata, &message).await?)
    }

    async fn get_recipe_with_metadata(&self, id: &str) -> Result<Option<RecipeWithMetadata>> {
        let Some(recipe) = self.get_recipe(id).await? else {
            return Ok(None);
        };
        let metadata = match self.get_metadata(id).await? {
            Some(m) => m,
            None => {
                let m = RecipeMetadata::new_default(id);
                self.save_metadata(&m).await?;
                m
            }
        };
        Ok(Some(RecipeWithMetadata { recipe, metadata }))
    }

    async fn get_all_recipes_with_metadata(&self) -> Result<Vec<RecipeWithMetadata>> {
        let recipes = self.get_all_recipes().await?;
        let mut by_id: HashMap<String, RecipeMetadata> = self
            .get_all_metadata()
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut created = Vec::new();
        let mut joined = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            let metadata = by_id.remove(&recipe.id).unwrap_or_else(|| {
                let m = RecipeMetadata::new_default(&recipe.id);
                created.push(m.clone());
                m
            });
            joined.push(RecipeWithMetadata { recipe, metadata });
        }
        self.save_records(Dataset::Metadata, &created, "Create default metadata")
            .await?;
        Ok(joined)
    }

    async fn get_planning(&self) -> Result<Vec<PlanningEntry>> {
        let mut entries: Vec<PlanningEntry> = self.load(Dataset::Planning).await?;
        entries.sort_by_key(|e| e.week_start);
        Ok(entries)
    }

    async fn get_planning_for_week(&self, week_start: NaiveDate) -> Result<Vec<PlanningEntry>> {
        let entries: Vec<PlanningEntry> = self.load(Dataset::Planning).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.week_start == week_start)
            .collect())
    }

    async fn save_planning_entry(&self, entry: &PlanningEntry) -> Result<()> {
        let message = format!("Plan {} {} {}", entry.date(), entry.slot, entry.recipe_id);
        Ok(self.save_record(Dataset::Planning, entry, &message).await?)
    }

    async fn delete_planning_entry(&self, id: &str) -> Result<bool> {
        Ok(self
            .delete_record::<PlanningEntry>(Dataset::Planning, id, &format!("Unplan {id}"))
            .await?)
    }

    async fn get_shopping_list(&self, id: &str) -> Result<Option<ShoppingList>> {
        Ok(self.find(Dataset::ShoppingLists, id).await?)
    }

    async fn get_shopping_lists(&self) -> Result<Vec<ShoppingList>> {
        Ok(self.load(Dataset::ShoppingLists).await?)
    }

    async fn save_shopping_list(&self, list: &ShoppingList) -> Result<()> {
        let message = format!("Save shopping list: {}", list.name);
        Ok(self.save_record(Dataset::ShoppingLists, list, &message).await?)
    }

    async fn delete_shopping_list(&self, id: &str) -> Result<bool> {
        Ok(self
            .delete_record::<ShoppingList>(
                Dataset::ShoppingLists,
                id,
                &format!("Delete shopping list {id}"),
            )
            .await?)
    }

    async fn export_all(&self) -> Result<ExportData> {
        Ok(ExportData::new(
            self.get_all_recipes().await?,
            self.get_all_metadata().await?,
            self.get_planning().await?,
            self.get_shopping_lists().await?,
        ))
    }

    /// Writes the four datasets one after another. A failure part way leaves
    /// the earlier datasets written; running the import again is safe.
    async fn import_all(&self, data: &ExportData) -> Result<ImportSummary> {
        self.save_records(Dataset::Recipes, &data.recipes, "Import recipes")
            .await?;
        self.save_records(Dataset::Metadata, &data.metadata, "Import metadata")
            .await?;
        self.save_records(Dataset::Planning, &data.planning, "Import planning")
            .await?;
        self.save_records(
            Dataset::ShoppingLists,
            &data.shopping_lists,
            "Import shopping lists",
        )
        .await?;
        tracing::info!(
            recipes = data.recipes.len(),
            metadata = data.metadata.len(),
            planning = data.planning.len(),
            shopping_lists = data.shopping_lists.len(),
            "imported bundle into remote"
        );
        Ok(ImportSummary::from_export(data))
    }

    async fn replace_all(&self, data: &ExportData) -> Result<ImportSummary> {
        self.save_data(Dataset::Recipes, &data.recipes, "Restore recipes")
            .await?;
        self.save_data(Dataset::Metadata, &data.metadata, "Restore metadata")
            .await?;
        self.save_data(Dataset::Planning, &data.planning, "Restore planning")
            .await?;
        self.save_data(
            Dataset::ShoppingLists,
            &data.shopping_lists,
            "Restore shopping lists",
        )
        .await?;
        tracing::info!(recipes = data.recipes.len(), "replaced remote datasets from bundle");
        Ok(ImportSummary::from_export(data))
    }
}
