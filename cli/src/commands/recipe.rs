use std::time::Duration;

use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use carnet_core::fetch::{DEFAULT_RELAYS, RelayChain, RelayFetcher};
use carnet_core::models::{NewRecipe, Recipe, RecipeFilter, RecipeStatus};
use carnet_core::parser::parse_ingredient_line;
use carnet_core::service::DataService;

use super::helpers::{find_recipe, format_minutes, format_quantity, short_id, truncate};

/// Fields accepted by `recipe add`.
pub(crate) struct RecipeArgs {
    pub title: String,
    pub servings: Option<u32>,
    pub prep: Option<u32>,
    pub cook: Option<u32>,
    pub source: Option<String>,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub notes: Option<String>,
}

pub(crate) async fn resolve_recipe(service: &DataService, query: &str) -> Result<Recipe> {
    let recipes = service.get_all_recipes().await?;
    find_recipe(&recipes, query).cloned()
}

pub(crate) async fn cmd_recipe_add(service: &DataService, args: RecipeArgs, json: bool) -> Result<()> {
    let new = NewRecipe {
        title: args.title,
        source: args.source,
        image: None,
        prep_time: args.prep,
        cook_time: args.cook,
        servings: args.servings,
        ingredients: args
            .ingredients
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| parse_ingredient_line(l))
            .collect(),
        steps: args
            .steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        notes: args.notes,
    };
    let recipe = service.create_recipe(new).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!(
            "Created recipe: {} (id: {})",
            recipe.title,
            short_id(&recipe.id)
        );
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_import(
    service: &DataService,
    url: &str,
    relays: Vec<String>,
    timeout_secs: u64,
    json: bool,
) -> Result<()> {
    let relays = if relays.is_empty() {
        DEFAULT_RELAYS.iter().map(ToString::to_string).collect()
    } else {
        relays
    };
    let fetcher = RelayFetcher::new(RelayChain::new(relays, Duration::from_secs(timeout_secs)))?;

    let recipe = service
        .import_recipe_from_url(&fetcher, url, |stage| {
            if !json {
                eprintln!("{stage}...");
            }
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!(
            "Imported \"{}\" (id: {}): {} ingredients, {} steps",
            recipe.title,
            short_id(&recipe.id),
            recipe.ingredients.len(),
            recipe.steps.len()
        );
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_list(
    service: &DataService,
    status: Option<&str>,
    tag: Option<String>,
    search: Option<String>,
    json: bool,
) -> Result<()> {
    let filter = RecipeFilter {
        status: status.map(str::parse::<RecipeStatus>).transpose()?,
        tag,
        search,
    };
    let recipes = service.list_recipes(&filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }
    if recipes.is_empty() {
        eprintln!("No recipes found. Add one with `carnet recipe add` or `carnet recipe import`.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Rating")]
        rating: String,
        #[tabled(rename = "Tags")]
        tags: String,
        #[tabled(rename = "Time")]
        time: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| {
            let total = match (r.recipe.prep_time, r.recipe.cook_time) {
                (None, None) => None,
                (prep, cook) => Some(prep.unwrap_or(0) + cook.unwrap_or(0)),
            };
            RecipeRow {
                id: short_id(&r.recipe.id).to_string(),
                title: truncate(&r.recipe.title, 40),
                status: r.metadata.status.to_string(),
                rating: r
                    .metadata
                    .rating
                    .map_or("-".to_string(), |n| "*".repeat(usize::from(n))),
                tags: truncate(
                    &r.metadata.tags.iter().cloned().collect::<Vec<_>>().join(", "),
                    30,
                ),
                time: format_minutes(total),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(5..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_recipe_show(service: &DataService, query: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(service, query).await?;
    let Some(detail) = service.get_recipe_with_metadata(&recipe.id).await? else {
        bail!("Recipe '{query}' not found");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let r = &detail.recipe;
    let m = &detail.metadata;
    println!("{} (id: {})", r.title, r.id);
    println!(
        "  Servings: {}  Prep: {}  Cook: {}",
        r.servings,
        format_minutes(r.prep_time),
        format_minutes(r.cook_time)
    );
    print!("  Status: {}", m.status);
    if let Some(rating) = m.rating {
        print!("  Rating: {rating}/5");
    }
    println!();
    if !m.tags.is_empty() {
        println!(
            "  Tags: {}",
            m.tags.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if let Some(ref source) = r.source {
        println!("  Source: {source}");
    }

    if !r.ingredients.is_empty() {
        #[derive(Tabled)]
        struct IngredientRow {
            #[tabled(rename = "Qty")]
            quantity: String,
            #[tabled(rename = "Unit")]
            unit: String,
            #[tabled(rename = "Ingredient")]
            name: String,
            #[tabled(rename = "Group")]
            group: String,
        }

        let rows: Vec<IngredientRow> = r
            .ingredients
            .iter()
            .map(|i| IngredientRow {
                quantity: format_quantity(i.quantity),
                unit: i.unit.clone(),
                name: truncate(&i.name, 40),
                group: i.group.clone().unwrap_or_default(),
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(0..1)).with(Alignment::right()))
            .to_string();
        println!("\n{table}");
    }

    if !r.steps.is_empty() {
        println!();
        for (i, step) in r.steps.iter().enumerate() {
            println!("{:>3}. {step}", i + 1);
        }
    }
    if let Some(ref notes) = r.notes {
        println!("\nNotes: {notes}");
    }
    if !m.history.is_empty() {
        println!("\nCooked:");
        for entry in &m.history {
            match entry.notes {
                Some(ref n) => println!("  {}  {n}", entry.date.format("%Y-%m-%d")),
                None => println!("  {}", entry.date.format("%Y-%m-%d")),
            }
        }
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_edit(
    service: &DataService,
    query: &str,
    title: Option<String>,
    servings: Option<u32>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let mut recipe = resolve_recipe(service, query).await?;
    if title.is_none() && servings.is_none() && notes.is_none() {
        bail!("Nothing to change. Use --title, --servings or --notes");
    }
    if let Some(title) = title {
        recipe.title = title;
    }
    if let Some(servings) = servings {
        recipe.servings = servings;
    }
    if let Some(notes) = notes {
        recipe.notes = Some(notes).filter(|n| !n.trim().is_empty());
    }
    let saved = service.update_recipe(recipe).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!("Updated {}", saved.title);
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_delete(service: &DataService, query: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(service, query).await?;
    let deleted = service.delete_recipe(&recipe.id).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": recipe.id, "found": deleted }));
    } else {
        println!("Deleted recipe {}", recipe.title);
    }
    Ok(())
}
