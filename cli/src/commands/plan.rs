use anyhow::{Result, bail};
use chrono::NaiveDate;
use tabled::{Table, Tabled, settings::Style};

use carnet_core::models::{MealSlot, week_start};
use carnet_core::service::DataService;

use super::helpers::{day_name, find_by_id, parse_day, short_id, truncate};
use super::recipe::resolve_recipe;

pub(crate) async fn cmd_plan_add(
    service: &DataService,
    date: NaiveDate,
    day: &str,
    slot: &str,
    query: &str,
    json: bool,
) -> Result<()> {
    let day = parse_day(day)?;
    let slot: MealSlot = slot.parse()?;
    let recipe = resolve_recipe(service, query).await?;
    let entry = service.plan_meal(date, day, slot, &recipe.id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Planned {} for {} {} ({})",
            recipe.title,
            day_name(entry.day),
            entry.slot,
            entry.date().format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub(crate) async fn cmd_plan_remove(service: &DataService, id: &str, json: bool) -> Result<()> {
    let entries = service.get_planning().await?;
    let entry = find_by_id(&entries, id, "planning entry")?;
    if !service.unplan(&entry.id).await? {
        bail!("Planning entry '{id}' was already removed");
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": entry.id }));
    } else {
        println!(
            "Removed {} {} ({})",
            day_name(entry.day),
            entry.slot,
            entry.date().format("%Y-%m-%d")
        );
    }
    Ok(())
}

pub(crate) async fn cmd_plan_show(service: &DataService, date: NaiveDate, json: bool) -> Result<()> {
    let meals = service.planned_week(date).await?;
    let monday = week_start(date);

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }
    if meals.is_empty() {
        eprintln!(
            "Nothing planned for the week of {}. Use `carnet plan add` to plan a meal.",
            monday.format("%Y-%m-%d")
        );
        return Ok(());
    }

    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Day")]
        day: &'static str,
        #[tabled(rename = "Meal")]
        slot: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
    }

    let rows: Vec<PlanRow> = meals
        .iter()
        .map(|m| PlanRow {
            id: short_id(&m.entry.id).to_string(),
            date: m.entry.date().format("%Y-%m-%d").to_string(),
            day: day_name(m.entry.day),
            slot: m.entry.slot.to_string(),
            recipe: m
                .recipe
                .as_ref()
                .map_or("(deleted recipe)".to_string(), |r| truncate(&r.title, 40)),
        })
        .collect();

    println!("Week of {}", monday.format("%Y-%m-%d"));
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}
