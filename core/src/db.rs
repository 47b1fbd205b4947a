use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::models::{
    ExportData, ImportSummary, PlanningEntry, Recipe, RecipeMetadata, RecipeWithMetadata,
    ShoppingList,
};

const DATASET_TABLES: [&str; 4] = ["recipes", "metadata", "planning", "shopping_lists"];

pub struct Database {
    conn: Connection,
}

/// Serialize a record to its canonical JSON text. Every write goes through
/// here so only plain data ever reaches the database.
fn plain_copy<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize record")
}

fn decode<T: DeserializeOwned>(table: &str, data: &str) -> Result<T> {
    serde_json::from_str(data).with_context(|| format!("Corrupt row in '{table}'"))
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id TEXT PRIMARY KEY NOT NULL,
                    title TEXT NOT NULL,
                    data TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS metadata (
                    id TEXT PRIMARY KEY NOT NULL,
                    status TEXT NOT NULL,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS planning (
                    id TEXT PRIMARY KEY NOT NULL,
                    week_start TEXT NOT NULL,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS shopping_lists (
                    id TEXT PRIMARY KEY NOT NULL,
                    data TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_title ON recipes(title);
                CREATE INDEX IF NOT EXISTS idx_metadata_status ON metadata(status);
                CREATE INDEX IF NOT EXISTS idx_planning_week_start ON planning(week_start);

                CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row helpers ---

    fn fetch_one<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>> {
        let data: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT data FROM {table} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| decode(table, &d)).transpose()
    }

    fn fetch_all<T: DeserializeOwned>(
        &self,
        table: &str,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter().map(|d| decode(table, d)).collect()
    }

    fn delete_row(&self, table: &str, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
        Ok(rows > 0)
    }

    // --- Recipes ---

    pub fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        self.fetch_one("recipes", id)
    }

    pub fn get_all_recipes(&self) -> Result<Vec<Recipe>> {
        self.fetch_all(
            "recipes",
            "SELECT data FROM recipes ORDER BY title COLLATE NOCASE, id",
            &[],
        )
    }

    pub fn put_recipe(&self, recipe: &Recipe) -> Result<()> {
        let data = plain_copy(recipe)?;
        self.conn.execute(
            "INSERT INTO recipes (id, title, data, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title, data = excluded.data, updated_at = excluded.updated_at",
            params![
                recipe.id,
                recipe.title,
                data,
                recipe.updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Delete a recipe and its metadata together.
    pub fn delete_recipe(&self, id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = self.delete_row("recipes", id)?;
        self.delete_metadata(id)?;
        tx.commit()?;
        Ok(removed)
    }

    // --- Metadata ---

    pub fn get_metadata(&self, id: &str) -> Result<Option<RecipeMetadata>> {
        self.fetch_one("metadata", id)
    }

    pub fn get_all_metadata(&self) -> Result<Vec<RecipeMetadata>> {
        self.fetch_all("metadata", "SELECT data FROM metadata ORDER BY id", &[])
    }

    pub fn put_metadata(&self, metadata: &RecipeMetadata) -> Result<()> {
        let data = plain_copy(metadata)?;
        self.conn.execute(
            "INSERT INTO metadata (id, status, data)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data",
            params![metadata.id, metadata.status.as_str(), data],
        )?;
        Ok(())
    }

    pub fn delete_metadata(&self, id: &str) -> Result<bool> {
        self.delete_row("metadata", id)
    }

    /// Join a recipe with its metadata, creating and persisting default
    /// metadata the first time the recipe is read without any.
    pub fn get_recipe_with_metadata(&self, id: &str) -> Result<Option<RecipeWithMetadata>> {
        let Some(recipe) = self.get_recipe(id)? else {
            return Ok(None);
        };
        let metadata = match self.get_metadata(id)? {
            Some(m) => m,
            None => {
                let m = RecipeMetadata::new_default(id);
                self.put_metadata(&m)?;
                tracing::debug!(recipe = id, "created default metadata");
                m
            }
        };
        Ok(Some(RecipeWithMetadata { recipe, metadata }))
    }

    pub fn get_all_recipes_with_metadata(&self) -> Result<Vec<RecipeWithMetadata>> {
        let recipes = self.get_all_recipes()?;
        let mut by_id: HashMap<String, RecipeMetadata> = self
            .get_all_metadata()?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut joined = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            let metadata = match by_id.remove(&recipe.id) {
                Some(m) => m,
                None => {
                    let m = RecipeMetadata::new_default(&recipe.id);
                    self.put_metadata(&m)?;
                    m
                }
            };
            joined.push(RecipeWithMetadata { recipe, metadata });
        }
        Ok(joined)
    }

    // --- Planning ---

    pub fn get_all_planning(&self) -> Result<Vec<PlanningEntry>> {
        self.fetch_all(
            "planning",
            "SELECT data FROM planning ORDER BY week_start, rowid",
            &[],
        )
    }

    pub fn get_planning_for_week(&self, week_start: NaiveDate) -> Result<Vec<PlanningEntry>> {
        let key = date_key(week_start);
        self.fetch_all(
            "planning",
            "SELECT data FROM planning WHERE week_start = ?1 ORDER BY rowid",
            &[&key],
        )
    }

    pub fn put_planning_entry(&self, entry: &PlanningEntry) -> Result<()> {
        let data = plain_copy(entry)?;
        self.conn.execute(
            "INSERT INTO planning (id, week_start, data)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET week_start = excluded.week_start, data = excluded.data",
            params![entry.id, date_key(entry.week_start), data],
        )?;
        Ok(())
    }

    pub fn delete_planning_entry(&self, id: &str) -> Result<bool> {
        self.delete_row("planning", id)
    }

    // --- Shopping lists ---

    pub fn get_shopping_list(&self, id: &str) -> Result<Option<ShoppingList>> {
        self.fetch_one("shopping_lists", id)
    }

    pub fn get_all_shopping_lists(&self) -> Result<Vec<ShoppingList>> {
        self.fetch_all(
            "shopping_lists",
            "SELECT data FROM shopping_lists ORDER BY rowid",
            &[],
        )
    }

    pub fn put_shopping_list(&self, list: &ShoppingList) -> Result<()> {
        let data = plain_copy(list)?;
        self.conn.execute(
            "INSERT INTO shopping_lists (id, data)
             VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
            params![list.id, data],
        )?;
        Ok(())
    }

    pub fn delete_shopping_list(&self, id: &str) -> Result<bool> {
        self.delete_row("shopping_lists", id)
    }

    // --- Bulk ---

    pub fn export_all(&self) -> Result<ExportData> {
        Ok(ExportData::new(
            self.get_all_recipes()?,
            self.get_all_metadata()?,
            self.get_all_planning()?,
            self.get_all_shopping_lists()?,
        ))
    }

    fn put_bundle(&self, data: &ExportData) -> Result<()> {
        for recipe in &data.recipes {
            self.put_recipe(recipe)?;
        }
        for metadata in &data.metadata {
            self.put_metadata(metadata)?;
        }
        for entry in &data.planning {
            self.put_planning_entry(entry)?;
        }
        for list in &data.shopping_lists {
            self.put_shopping_list(list)?;
        }
        Ok(())
    }

    fn delete_datasets(&self) -> Result<()> {
        for table in DATASET_TABLES {
            self.conn.execute(&format!("DELETE FROM {table}"), [])?;
        }
        Ok(())
    }

    /// Upsert every record of the bundle in one transaction.
    pub fn import_all(&self, data: &ExportData) -> Result<ImportSummary> {
        let tx = self.conn.unchecked_transaction()?;
        self.put_bundle(data)?;
        tx.commit().context("Failed to commit import")?;
        Ok(ImportSummary::from_export(data))
    }

    /// Replace the four dataset tables with the bundle in one transaction.
    pub fn replace_all(&self, data: &ExportData) -> Result<ImportSummary> {
        let tx = self.conn.unchecked_transaction()?;
        self.delete_datasets()?;
        self.put_bundle(data)?;
        tx.commit().context("Failed to commit restore")?;
        Ok(ImportSummary::from_export(data))
    }

    /// Wipe the four dataset tables atomically. Settings are kept.
    pub fn clear_all(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.delete_datasets()?;
        tx.commit()?;
        Ok(())
    }

    // --- User Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM user_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        HistoryEntry, Ingredient, MealSlot, NewRecipe, RecipeStatus, ShoppingItem,
    };

    fn sample_recipe(title: &str) -> Recipe {
        NewRecipe {
            title: title.to_string(),
            servings: Some(4),
            ingredients: vec![Ingredient {
                name: "farine".to_string(),
                quantity: 250.0,
                unit: "g".to_string(),
                group: None,
            }],
            steps: vec!["Mélanger".to_string()],
            ..NewRecipe::default()
        }
        .into_recipe()
        .unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn sample_list() -> ShoppingList {
        ShoppingList::new(
            "Courses",
            vec![ShoppingItem {
                id: "i1".to_string(),
                name: "lait".to_string(),
                quantity: Some(1.0),
                unit: Some("l".to_string()),
                checked: false,
                category: Some("Produits laitiers".to_string()),
                recipes: None,
            }],
        )
    }

    fn populated_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let crepes = sample_recipe("Crêpes");
        let soupe = sample_recipe("Soupe");
        db.put_recipe(&crepes).unwrap();
        db.put_recipe(&soupe).unwrap();
        let mut meta = RecipeMetadata::new_default(&crepes.id);
        meta.status = RecipeStatus::Validated;
        meta.add_tag("dessert");
        meta.history.push(HistoryEntry {
            date: monday(),
            notes: Some("parfait".to_string()),
        });
        db.put_metadata(&meta).unwrap();
        db.put_planning_entry(&PlanningEntry::new(monday(), 1, MealSlot::Dinner, &crepes.id).unwrap())
            .unwrap();
        db.put_shopping_list(&sample_list()).unwrap();
        db
    }

    #[test]
    fn test_put_and_get_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = sample_recipe("Tarte");
        db.put_recipe(&recipe).unwrap();
        assert_eq!(db.get_recipe(&recipe.id).unwrap(), Some(recipe));
        assert!(db.get_recipe("missing").unwrap().is_none());
    }

    #[test]
    fn test_put_recipe_replaces() {
        let db = Database::open_in_memory().unwrap();
        let mut recipe = sample_recipe("Tarte");
        db.put_recipe(&recipe).unwrap();
        recipe.title = "Tarte fine".to_string();
        recipe.touch();
        db.put_recipe(&recipe).unwrap();
        let all = db.get_all_recipes().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Tarte fine");
    }

    #[test]
    fn test_get_all_recipes_sorted_by_title() {
        let db = Database::open_in_memory().unwrap();
        for title in ["soupe", "Brioche", "artichauts"] {
            db.put_recipe(&sample_recipe(title)).unwrap();
        }
        let titles: Vec<String> = db
            .get_all_recipes()
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["artichauts", "Brioche", "soupe"]);
    }

    #[test]
    fn test_delete_recipe_cascades_to_metadata() {
        let db = Database::open_in_memory().unwrap();
        let recipe = sample_recipe("Tarte");
        db.put_recipe(&recipe).unwrap();
        db.put_metadata(&RecipeMetadata::new_default(&recipe.id))
            .unwrap();

        assert!(db.delete_recipe(&recipe.id).unwrap());
        assert!(db.get_recipe(&recipe.id).unwrap().is_none());
        assert!(db.get_metadata(&recipe.id).unwrap().is_none());
        assert!(!db.delete_recipe(&recipe.id).unwrap());
    }

    #[test]
    fn test_recipe_with_metadata_lazily_created() {
        let db = Database::open_in_memory().unwrap();
        let recipe = sample_recipe("Tarte");
        db.put_recipe(&recipe).unwrap();
        assert!(db.get_metadata(&recipe.id).unwrap().is_none());

        let joined = db.get_recipe_with_metadata(&recipe.id).unwrap().unwrap();
        assert_eq!(joined.metadata.status, RecipeStatus::ToTest);
        assert!(joined.metadata.tags.is_empty());
        // Persisted at read time.
        assert_eq!(
            db.get_metadata(&recipe.id).unwrap(),
            Some(joined.metadata.clone())
        );

        assert!(db.get_recipe_with_metadata("missing").unwrap().is_none());
    }

    #[test]
    fn test_all_recipes_with_metadata_fills_gaps() {
        let db = populated_db();
        let joined = db.get_all_recipes_with_metadata().unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].metadata.status, RecipeStatus::Validated);
        assert_eq!(joined[1].metadata.status, RecipeStatus::ToTest);
        assert_eq!(db.get_all_metadata().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_metadata_keeps_recipe() {
        let db = populated_db();
        let meta = db.get_all_metadata().unwrap().remove(0);
        assert!(db.delete_metadata(&meta.id).unwrap());
        assert!(!db.delete_metadata(&meta.id).unwrap());
        assert!(db.get_recipe(&meta.id).unwrap().is_some());
        // The next combined read recreates defaults.
        let joined = db.get_recipe_with_metadata(&meta.id).unwrap().unwrap();
        assert_eq!(joined.metadata.status, RecipeStatus::ToTest);
    }

    #[test]
    fn test_planning_by_week() {
        let db = Database::open_in_memory().unwrap();
        let next_monday = NaiveDate::from_ymd_opt(2024, 6, 17).unwrap();
        let a = PlanningEntry::new(monday(), 0, MealSlot::Lunch, "r1").unwrap();
        let b = PlanningEntry::new(monday(), 3, MealSlot::Dinner, "r2").unwrap();
        let c = PlanningEntry::new(next_monday, 0, MealSlot::Lunch, "r3").unwrap();
        for entry in [&a, &b, &c] {
            db.put_planning_entry(entry).unwrap();
        }

        let week = db.get_planning_for_week(monday()).unwrap();
        assert_eq!(week, vec![a.clone(), b]);
        assert_eq!(db.get_all_planning().unwrap().len(), 3);

        assert!(db.delete_planning_entry(&a.id).unwrap());
        assert!(!db.delete_planning_entry(&a.id).unwrap());
        assert_eq!(db.get_planning_for_week(monday()).unwrap().len(), 1);
    }

    #[test]
    fn test_shopping_list_crud() {
        let db = Database::open_in_memory().unwrap();
        let mut list = sample_list();
        db.put_shopping_list(&list).unwrap();
        list.toggle_item("i1").unwrap();
        db.put_shopping_list(&list).unwrap();

        let stored = db.get_shopping_list(&list.id).unwrap().unwrap();
        assert!(stored.items[0].checked);
        assert_eq!(db.get_all_shopping_lists().unwrap().len(), 1);
        assert!(db.delete_shopping_list(&list.id).unwrap());
        assert!(db.get_all_shopping_lists().unwrap().is_empty());
    }

    #[test]
    fn test_export_import_roundtrip() {
        let source = populated_db();
        let export = source.export_all().unwrap();
        assert_eq!(export.recipes.len(), 2);
        assert_eq!(export.metadata.len(), 1);

        let target = Database::open_in_memory().unwrap();
        let summary = target.import_all(&export).unwrap();
        assert_eq!(summary.recipes_imported, 2);
        assert_eq!(summary.planning_imported, 1);

        let again = target.export_all().unwrap();
        assert_eq!(again.recipes, export.recipes);
        assert_eq!(again.metadata, export.metadata);
        assert_eq!(again.planning, export.planning);
        assert_eq!(again.shopping_lists, export.shopping_lists);
    }

    #[test]
    fn test_import_upserts_without_duplicates() {
        let db = populated_db();
        let export = db.export_all().unwrap();
        db.import_all(&export).unwrap();
        db.import_all(&export).unwrap();
        let after = db.export_all().unwrap();
        assert_eq!(after.recipes.len(), 2);
        assert_eq!(after.planning.len(), 1);
        assert_eq!(after.shopping_lists.len(), 1);
    }

    #[test]
    fn test_replace_all_drops_records_missing_from_bundle() {
        let db = populated_db();
        let kept = sample_recipe("Gardée");
        let bundle = ExportData::new(vec![kept.clone()], Vec::new(), Vec::new(), Vec::new());

        let summary = db.replace_all(&bundle).unwrap();
        assert_eq!(summary.recipes_imported, 1);
        let after = db.export_all().unwrap();
        assert_eq!(after.recipes, vec![kept]);
        assert!(after.metadata.is_empty());
        assert!(after.planning.is_empty());
        assert!(after.shopping_lists.is_empty());
    }

    #[test]
    fn test_clear_all_keeps_settings() {
        let db = populated_db();
        db.set_setting("remote.token", "abc").unwrap();
        db.clear_all().unwrap();
        assert!(db.export_all().unwrap().is_empty());
        assert_eq!(db.get_setting("remote.token").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_user_settings_set_get() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting("test_key", "test_value").unwrap();
        let val = db.get_setting("test_key").unwrap();
        assert_eq!(val.as_deref(), Some("test_value"));
        assert!(db.get_setting("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_user_settings_upsert_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting("key", "value1").unwrap();
        db.set_setting("key", "value2").unwrap();
        assert_eq!(db.get_setting("key").unwrap().as_deref(), Some("value2"));
        assert!(db.delete_setting("key").unwrap());
        assert!(db.get_setting("key").unwrap().is_none());
        // Deleting again returns false
        assert!(!db.delete_setting("key").unwrap());
    }

    #[test]
    fn test_migration_sets_user_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
        // Running again is a no-op.
        db.migrate().unwrap();
    }

    #[test]
    fn test_corrupt_row_reports_table() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO shopping_lists (id, data) VALUES ('x', 'not json')",
                [],
            )
            .unwrap();
        let err = db.get_shopping_list("x").unwrap_err();
        assert!(err.to_string().contains("shopping_lists"));
    }
}
