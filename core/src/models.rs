use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Format version written into every export bundle.
pub const EXPORT_VERSION: i64 = 1;

/// Serving count used when a recipe does not say how many it feeds.
pub const DEFAULT_SERVINGS: u32 = 4;

/// Records that are addressed by an opaque string id inside a dataset.
pub trait Identified {
    fn id(&self) -> &str;
}

#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// --- Recipes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: f64,
    /// Canonical unit token; empty means a plain count.
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Either a `data:` URL with the inlined bytes or an external URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<u32>,
    pub servings: u32,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipe {
    /// Bump `updated_at`, guaranteeing it moves forward even if the clock did not.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::milliseconds(1)
        };
    }
}

impl Identified for Recipe {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Fields supplied by the creation and URL-import flows.
#[derive(Debug, Clone, Default)]
pub struct NewRecipe {
    pub title: String,
    pub source: Option<String>,
    pub image: Option<String>,
    pub prep_time: Option<u32>,
    pub cook_time: Option<u32>,
    pub servings: Option<u32>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
    pub notes: Option<String>,
}

impl NewRecipe {
    pub fn into_recipe(self) -> Result<Recipe> {
        let now = Utc::now();
        let recipe = Recipe {
            id: new_id(),
            title: self.title.trim().to_string(),
            source: self.source,
            image: self.image,
            prep_time: self.prep_time,
            cook_time: self.cook_time,
            servings: self.servings.unwrap_or(DEFAULT_SERVINGS),
            ingredients: self.ingredients,
            steps: self.steps,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        };
        validate_recipe(&recipe)?;
        Ok(recipe)
    }
}

pub fn validate_recipe(recipe: &Recipe) -> Result<()> {
    if recipe.id.trim().is_empty() {
        bail!("Recipe id must not be empty");
    }
    if recipe.title.trim().is_empty() {
        bail!("Recipe title must not be empty");
    }
    if recipe.servings == 0 {
        bail!("Servings must be at least 1");
    }
    for ingredient in &recipe.ingredients {
        if !ingredient.quantity.is_finite() || ingredient.quantity < 0.0 {
            bail!(
                "Ingredient '{}' has an invalid quantity ({})",
                ingredient.name,
                ingredient.quantity
            );
        }
    }
    Ok(())
}

// --- Metadata ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecipeStatus {
    #[default]
    ToTest,
    Testing,
    Validated,
    Archived,
}

impl RecipeStatus {
    pub const ALL: [RecipeStatus; 4] = [
        RecipeStatus::ToTest,
        RecipeStatus::Testing,
        RecipeStatus::Validated,
        RecipeStatus::Archived,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecipeStatus::ToTest => "to-test",
            RecipeStatus::Testing => "testing",
            RecipeStatus::Validated => "validated",
            RecipeStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for RecipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase().replace('_', "-");
        RecipeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == lower)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid status '{s}'. Must be one of: to-test, testing, validated, archived"
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeMetadata {
    /// Same id as the owning recipe.
    pub id: String,
    #[serde(default)]
    pub status: RecipeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl RecipeMetadata {
    #[must_use]
    pub fn new_default(recipe_id: &str) -> Self {
        Self {
            id: recipe_id.to_string(),
            status: RecipeStatus::ToTest,
            rating: None,
            tags: BTreeSet::new(),
            history: Vec::new(),
        }
    }

    /// Returns false when the tag was already present or is blank.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = fold_tag(tag);
        if tag.is_empty() {
            return false;
        }
        self.tags.insert(tag)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(&fold_tag(tag))
    }

    pub fn set_rating(&mut self, rating: Option<u8>) -> Result<()> {
        if let Some(r) = rating {
            validate_rating(r)?;
        }
        self.rating = rating;
        Ok(())
    }
}

impl Identified for RecipeMetadata {
    fn id(&self) -> &str {
        &self.id
    }
}

#[must_use]
pub fn fold_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

pub fn validate_rating(rating: u8) -> Result<()> {
    if !(1..=5).contains(&rating) {
        bail!("Rating must be between 1 and 5 (got {rating})");
    }
    Ok(())
}

pub fn validate_metadata(metadata: &RecipeMetadata) -> Result<()> {
    if metadata.id.trim().is_empty() {
        bail!("Metadata id must not be empty");
    }
    if let Some(r) = metadata.rating {
        validate_rating(r)?;
    }
    if metadata.tags.iter().any(|t| *t != fold_tag(t)) {
        bail!("Tags must be trimmed and lowercase");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeWithMetadata {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub metadata: RecipeMetadata,
}

/// Browse filter over recipes joined with their metadata.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub status: Option<RecipeStatus>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

impl RecipeFilter {
    #[must_use]
    pub fn matches(&self, item: &RecipeWithMetadata) -> bool {
        if let Some(status) = self.status {
            if item.metadata.status != status {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !item.metadata.tags.contains(&fold_tag(tag)) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty() && !item.recipe.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

// --- Weekly planning ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Lunch,
    Dinner,
}

impl MealSlot {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lunch" | "dejeuner" | "déjeuner" => Ok(MealSlot::Lunch),
            "dinner" | "diner" | "dîner" => Ok(MealSlot::Dinner),
            _ => bail!("Invalid meal slot '{s}'. Must be one of: lunch, dinner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningEntry {
    pub id: String,
    /// Monday of the ISO week.
    pub week_start: NaiveDate,
    /// 0 = Monday .. 6 = Sunday.
    pub day: u8,
    pub slot: MealSlot,
    pub recipe_id: String,
}

impl PlanningEntry {
    pub fn new(week_start: NaiveDate, day: u8, slot: MealSlot, recipe_id: &str) -> Result<Self> {
        let entry = Self {
            id: new_id(),
            week_start,
            day,
            slot,
            recipe_id: recipe_id.to_string(),
        };
        validate_planning_entry(&entry)?;
        Ok(entry)
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.week_start + Duration::days(i64::from(self.day))
    }

    #[must_use]
    pub fn occupies(&self, week_start: NaiveDate, day: u8, slot: MealSlot) -> bool {
        self.week_start == week_start && self.day == day && self.slot == slot
    }
}

impl Identified for PlanningEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Monday of the ISO week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn validate_planning_entry(entry: &PlanningEntry) -> Result<()> {
    if entry.week_start.weekday() != Weekday::Mon {
        bail!(
            "Week start {} is not a Monday",
            entry.week_start.format("%Y-%m-%d")
        );
    }
    if entry.day > 6 {
        bail!("Day offset must be between 0 (Monday) and 6 (Sunday)");
    }
    if entry.recipe_id.trim().is_empty() {
        bail!("Planning entry must reference a recipe");
    }
    Ok(())
}

// --- Shopping lists ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShoppingListStatus {
    #[default]
    Active,
    Completed,
    Archived,
}

impl ShoppingListStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ShoppingListStatus::Active => "active",
            ShoppingListStatus::Completed => "completed",
            ShoppingListStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ShoppingListStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShoppingListStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(ShoppingListStatus::Active),
            "completed" => Ok(ShoppingListStatus::Completed),
            "archived" => Ok(ShoppingListStatus::Archived),
            _ => bail!("Invalid list status '{s}'. Must be one of: active, completed, archived"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Titles of the recipes this line was aggregated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipes: Option<Vec<String>>,
}

impl Identified for ShoppingItem {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ShoppingListStatus,
    #[serde(default)]
    pub items: Vec<ShoppingItem>,
}

impl ShoppingList {
    #[must_use]
    pub fn new(name: &str, items: Vec<ShoppingItem>) -> Self {
        Self {
            id: new_id(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
            updated_at: None,
            status: ShoppingListStatus::Active,
            items,
        }
    }

    /// Flip the checked flag of an item; returns the new state.
    pub fn toggle_item(&mut self, item_id: &str) -> Result<bool> {
        let Some(item) = self.items.iter_mut().find(|i| i.id == item_id) else {
            bail!("Item '{item_id}' not found in list '{}'", self.name);
        };
        item.checked = !item.checked;
        let checked = item.checked;
        self.updated_at = Some(Utc::now());
        Ok(checked)
    }
}

impl Identified for ShoppingList {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn validate_shopping_list(list: &ShoppingList) -> Result<()> {
    if list.name.trim().is_empty() {
        bail!("Shopping list name must not be empty");
    }
    for item in &list.items {
        if item.name.trim().is_empty() {
            bail!("Shopping item names must not be empty");
        }
        if let Some(q) = item.quantity {
            if !q.is_finite() || q < 0.0 {
                bail!("Shopping item '{}' has an invalid quantity", item.name);
            }
        }
    }
    Ok(())
}

// --- Export / Import ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: i64,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
    #[serde(default)]
    pub metadata: Vec<RecipeMetadata>,
    #[serde(default)]
    pub planning: Vec<PlanningEntry>,
    #[serde(default)]
    pub shopping_lists: Vec<ShoppingList>,
}

impl ExportData {
    #[must_use]
    pub fn new(
        recipes: Vec<Recipe>,
        metadata: Vec<RecipeMetadata>,
        planning: Vec<PlanningEntry>,
        shopping_lists: Vec<ShoppingList>,
    ) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            recipes,
            metadata,
            planning,
            shopping_lists,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
            && self.metadata.is_empty()
            && self.planning.is_empty()
            && self.shopping_lists.is_empty()
    }
}

pub fn validate_export(data: &ExportData) -> Result<()> {
    if data.version != EXPORT_VERSION {
        bail!(
            "Unsupported export version {} (expected {EXPORT_VERSION})",
            data.version
        );
    }
    for recipe in &data.recipes {
        validate_recipe(recipe)?;
    }
    for metadata in &data.metadata {
        validate_metadata(metadata)?;
    }
    for entry in &data.planning {
        validate_planning_entry(entry)?;
    }
    for list in &data.shopping_lists {
        validate_shopping_list(list)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct ImportSummary {
    pub recipes_imported: usize,
    pub metadata_imported: usize,
    pub planning_imported: usize,
    pub shopping_lists_imported: usize,
}

impl ImportSummary {
    #[must_use]
    pub fn from_export(data: &ExportData) -> Self {
        Self {
            recipes_imported: data.recipes.len(),
            metadata_imported: data.metadata.len(),
            planning_imported: data.planning.len(),
            shopping_lists_imported: data.shopping_lists.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_new_recipe() -> NewRecipe {
        NewRecipe {
            title: "  Tarte aux pommes ".to_string(),
            servings: Some(6),
            ingredients: vec![Ingredient {
                name: "pommes".to_string(),
                quantity: 4.0,
                unit: String::new(),
                group: None,
            }],
            steps: vec!["Éplucher les pommes".to_string()],
            ..NewRecipe::default()
        }
    }

    #[test]
    fn test_new_recipe_generates_identity() {
        let recipe = sample_new_recipe().into_recipe().unwrap();
        assert_eq!(recipe.title, "Tarte aux pommes");
        assert!(!recipe.id.is_empty());
        assert_eq!(recipe.created_at, recipe.updated_at);
        let other = sample_new_recipe().into_recipe().unwrap();
        assert_ne!(recipe.id, other.id);
    }

    #[test]
    fn test_new_recipe_default_servings() {
        let mut new = sample_new_recipe();
        new.servings = None;
        assert_eq!(new.into_recipe().unwrap().servings, DEFAULT_SERVINGS);
    }

    #[test]
    fn test_new_recipe_empty_title_rejected() {
        let mut new = sample_new_recipe();
        new.title = "   ".to_string();
        assert!(new.into_recipe().is_err());
    }

    #[test]
    fn test_new_recipe_zero_servings_rejected() {
        let mut new = sample_new_recipe();
        new.servings = Some(0);
        assert!(new.into_recipe().is_err());
    }

    #[test]
    fn test_validate_recipe_negative_quantity() {
        let mut recipe = sample_new_recipe().into_recipe().unwrap();
        recipe.ingredients[0].quantity = -1.0;
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_touch_strictly_increases() {
        let mut recipe = sample_new_recipe().into_recipe().unwrap();
        // Push updated_at into the future so the clock cannot catch up.
        recipe.updated_at = Utc::now() + Duration::hours(1);
        let before = recipe.updated_at;
        recipe.touch();
        assert!(recipe.updated_at > before);
        let again = recipe.updated_at;
        recipe.touch();
        assert!(recipe.updated_at > again);
    }

    #[test]
    fn test_recipe_serializes_camel_case() {
        let mut recipe = sample_new_recipe().into_recipe().unwrap();
        recipe.prep_time = Some(15);
        let json = serde_json::to_value(&recipe).unwrap();
        assert_eq!(json["prepTime"], 15);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("cookTime").is_none());
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!(
            "to-test".parse::<RecipeStatus>().unwrap(),
            RecipeStatus::ToTest
        );
        assert_eq!(
            "Validated".parse::<RecipeStatus>().unwrap(),
            RecipeStatus::Validated
        );
        assert_eq!(
            "to_test".parse::<RecipeStatus>().unwrap(),
            RecipeStatus::ToTest
        );
        assert!("done".parse::<RecipeStatus>().is_err());
        assert_eq!(RecipeStatus::Archived.to_string(), "archived");
        assert_eq!(
            serde_json::to_value(RecipeStatus::ToTest).unwrap(),
            serde_json::json!("to-test")
        );
    }

    #[test]
    fn test_metadata_tags_case_folded() {
        let mut meta = RecipeMetadata::new_default("r1");
        assert!(meta.add_tag("  Dessert "));
        assert!(!meta.add_tag("DESSERT"));
        assert!(!meta.add_tag("   "));
        assert_eq!(meta.tags.len(), 1);
        assert!(meta.tags.contains("dessert"));
        assert!(meta.remove_tag("Dessert"));
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn test_metadata_rating_bounds() {
        let mut meta = RecipeMetadata::new_default("r1");
        assert!(meta.set_rating(Some(5)).is_ok());
        assert!(meta.set_rating(Some(0)).is_err());
        assert!(meta.set_rating(Some(6)).is_err());
        assert_eq!(meta.rating, Some(5));
        assert!(meta.set_rating(None).is_ok());
        assert_eq!(meta.rating, None);
    }

    #[test]
    fn test_metadata_deserializes_with_defaults() {
        let meta: RecipeMetadata = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert_eq!(meta.status, RecipeStatus::ToTest);
        assert!(meta.tags.is_empty());
        assert!(meta.history.is_empty());
    }

    #[test]
    fn test_week_start_is_monday() {
        let wednesday = NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert_eq!(week_start(wednesday), monday);
        assert_eq!(week_start(monday), monday);
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        assert_eq!(week_start(sunday), monday);
    }

    #[test]
    fn test_planning_entry_validation() {
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        assert!(PlanningEntry::new(monday, 6, MealSlot::Dinner, "r1").is_ok());
        assert!(PlanningEntry::new(monday, 7, MealSlot::Dinner, "r1").is_err());
        assert!(PlanningEntry::new(tuesday, 0, MealSlot::Lunch, "r1").is_err());
        assert!(PlanningEntry::new(monday, 0, MealSlot::Lunch, " ").is_err());
    }

    #[test]
    fn test_planning_entry_date_and_slot() {
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let entry = PlanningEntry::new(monday, 2, MealSlot::Lunch, "r1").unwrap();
        assert_eq!(entry.date(), NaiveDate::from_ymd_opt(2024, 6, 12).unwrap());
        assert!(entry.occupies(monday, 2, MealSlot::Lunch));
        assert!(!entry.occupies(monday, 2, MealSlot::Dinner));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["weekStart"], "2024-06-10");
        assert_eq!(json["slot"], "lunch");
    }

    #[test]
    fn test_meal_slot_parse() {
        assert_eq!("Lunch".parse::<MealSlot>().unwrap(), MealSlot::Lunch);
        assert_eq!("dîner".parse::<MealSlot>().unwrap(), MealSlot::Dinner);
        assert!("breakfast".parse::<MealSlot>().is_err());
    }

    #[test]
    fn test_shopping_list_toggle_item() {
        let item = ShoppingItem {
            id: "i1".to_string(),
            name: "farine".to_string(),
            quantity: Some(200.0),
            unit: Some("g".to_string()),
            checked: false,
            category: None,
            recipes: None,
        };
        let mut list = ShoppingList::new("Semaine", vec![item]);
        assert!(list.toggle_item("i1").unwrap());
        assert!(list.updated_at.is_some());
        assert!(!list.toggle_item("i1").unwrap());
        assert!(list.toggle_item("missing").is_err());
    }

    #[test]
    fn test_validate_shopping_list_empty_name() {
        let list = ShoppingList::new(" ", Vec::new());
        assert!(validate_shopping_list(&list).is_err());
    }

    #[test]
    fn test_recipe_filter() {
        let recipe = sample_new_recipe().into_recipe().unwrap();
        let mut metadata = RecipeMetadata::new_default(&recipe.id);
        metadata.add_tag("dessert");
        metadata.status = RecipeStatus::Validated;
        let item = RecipeWithMetadata { recipe, metadata };

        assert!(RecipeFilter::default().matches(&item));
        let by_status = RecipeFilter {
            status: Some(RecipeStatus::Validated),
            ..RecipeFilter::default()
        };
        assert!(by_status.matches(&item));
        let wrong_status = RecipeFilter {
            status: Some(RecipeStatus::Archived),
            ..RecipeFilter::default()
        };
        assert!(!wrong_status.matches(&item));
        let by_tag = RecipeFilter {
            tag: Some("Dessert".to_string()),
            ..RecipeFilter::default()
        };
        assert!(by_tag.matches(&item));
        let by_search = RecipeFilter {
            search: Some("POMMES".to_string()),
            ..RecipeFilter::default()
        };
        assert!(by_search.matches(&item));
        let miss = RecipeFilter {
            search: Some("poire".to_string()),
            ..RecipeFilter::default()
        };
        assert!(!miss.matches(&item));
    }

    #[test]
    fn test_export_bundle_format() {
        let data = ExportData::new(Vec::new(), Vec::new(), Vec::new(), Vec::new());
        assert!(data.is_empty());
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json.get("exportedAt").is_some());
        assert!(json["shoppingLists"].is_array());
        assert!(validate_export(&data).is_ok());
    }

    #[test]
    fn test_validate_export_wrong_version() {
        let mut data = ExportData::new(Vec::new(), Vec::new(), Vec::new(), Vec::new());
        data.version = 2;
        assert!(validate_export(&data).is_err());
    }
}
