use anyhow::Result;
use chrono::NaiveDate;

use carnet_core::models::{RecipeMetadata, RecipeStatus};
use carnet_core::service::DataService;

use super::recipe::resolve_recipe;

fn print_metadata(title: &str, metadata: &RecipeMetadata, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(metadata)?);
        return Ok(());
    }
    let rating = metadata
        .rating
        .map_or("unrated".to_string(), |r| format!("{r}/5"));
    println!("{title}: {} ({rating})", metadata.status);
    if !metadata.tags.is_empty() {
        println!(
            "  Tags: {}",
            metadata.tags.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(())
}

pub(crate) async fn cmd_status(service: &DataService, query: &str, status: &str, json: bool) -> Result<()> {
    let status: RecipeStatus = status.parse()?;
    let recipe = resolve_recipe(service, query).await?;
    let metadata = service.set_status(&recipe.id, status).await?;
    print_metadata(&recipe.title, &metadata, json)
}

pub(crate) async fn cmd_rate(
    service: &DataService,
    query: &str,
    rating: Option<u8>,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(service, query).await?;
    let metadata = service.set_rating(&recipe.id, rating).await?;
    print_metadata(&recipe.title, &metadata, json)
}

pub(crate) async fn cmd_tag(
    service: &DataService,
    query: &str,
    tag: &str,
    remove: bool,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(service, query).await?;
    let metadata = if remove {
        service.remove_tag(&recipe.id, tag).await?
    } else {
        service.add_tag(&recipe.id, tag).await?
    };
    print_metadata(&recipe.title, &metadata, json)
}

pub(crate) async fn cmd_cooked(
    service: &DataService,
    query: &str,
    date: NaiveDate,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(service, query).await?;
    let metadata = service.record_cooked(&recipe.id, date, notes).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    } else {
        println!(
            "Recorded {} as cooked on {} ({} times in total)",
            recipe.title,
            date.format("%Y-%m-%d"),
            metadata.history.len()
        );
    }
    Ok(())
}
