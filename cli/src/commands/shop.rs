use anyhow::{Result, bail};
use chrono::NaiveDate;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use carnet_core::models::{ShoppingList, ShoppingListStatus};
use carnet_core::service::DataService;

use super::helpers::{find_by_id, find_list, format_quantity, short_id, truncate};

fn print_list(list: &ShoppingList) {
    println!(
        "{} ({}, id: {}, created {})",
        list.name,
        list.status,
        short_id(&list.id),
        list.created_at.format("%Y-%m-%d")
    );
    if list.items.is_empty() {
        println!("  (empty)");
        return;
    }

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "")]
        checked: &'static str,
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "For")]
        recipes: String,
    }

    let rows: Vec<ItemRow> = list
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| ItemRow {
            idx: i + 1,
            checked: if item.checked { "[x]" } else { "[ ]" },
            name: truncate(&item.name, 35),
            quantity: match (item.quantity, item.unit.as_deref()) {
                (Some(q), Some(u)) => format!("{} {u}", format_quantity(q)),
                (Some(q), None) => format_quantity(q),
                (None, _) => String::new(),
            },
            category: item.category.clone().unwrap_or_default(),
            recipes: truncate(&item.recipes.clone().unwrap_or_default().join(", "), 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) async fn cmd_shop_generate(
    service: &DataService,
    name: &str,
    week: NaiveDate,
    json: bool,
) -> Result<()> {
    let list = service.generate_shopping_list(name, week).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        print_list(&list);
    }
    Ok(())
}

pub(crate) async fn cmd_shop_list(service: &DataService, json: bool) -> Result<()> {
    let mut lists = service.get_shopping_lists().await?;
    lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    if json {
        println!("{}", serde_json::to_string_pretty(&lists)?);
        return Ok(());
    }
    if lists.is_empty() {
        eprintln!("No shopping lists. Generate one with `carnet shop generate <name>`.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ListRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Items")]
        items: String,
        #[tabled(rename = "Created")]
        created: String,
    }

    let rows: Vec<ListRow> = lists
        .iter()
        .map(|l| ListRow {
            id: short_id(&l.id).to_string(),
            name: truncate(&l.name, 30),
            status: l.status.to_string(),
            items: format!(
                "{}/{}",
                l.items.iter().filter(|i| i.checked).count(),
                l.items.len()
            ),
            created: l.created_at.format("%Y-%m-%d").to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_shop_show(service: &DataService, query: &str, json: bool) -> Result<()> {
    let lists = service.get_shopping_lists().await?;
    let list = find_list(&lists, query)?;
    if json {
        println!("{}", serde_json::to_string_pretty(list)?);
    } else {
        print_list(list);
    }
    Ok(())
}

/// Toggle an item, addressed by its row number in `shop show` or its id.
pub(crate) async fn cmd_shop_check(
    service: &DataService,
    list_query: &str,
    item_query: &str,
    json: bool,
) -> Result<()> {
    let lists = service.get_shopping_lists().await?;
    let list = find_list(&lists, list_query)?;
    let item = match item_query.trim().parse::<usize>() {
        Ok(n) if n >= 1 && n <= list.items.len() => &list.items[n - 1],
        Ok(n) => bail!("List '{}' has no item #{n}", list.name),
        Err(_) => find_by_id(&list.items, item_query, "item")?,
    };
    let checked = service.toggle_item(&list.id, &item.id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "list": list.id, "item": item.id, "checked": checked })
        );
    } else {
        let mark = if checked { "Checked" } else { "Unchecked" };
        println!("{mark} {}", item.name);
    }
    Ok(())
}

pub(crate) async fn cmd_shop_status(
    service: &DataService,
    list_query: &str,
    status: &str,
    json: bool,
) -> Result<()> {
    let status: ShoppingListStatus = status.parse()?;
    let lists = service.get_shopping_lists().await?;
    let list = find_list(&lists, list_query)?;
    let updated = service.set_list_status(&list.id, status).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!("{} is now {}", updated.name, updated.status);
    }
    Ok(())
}

pub(crate) async fn cmd_shop_delete(service: &DataService, list_query: &str, json: bool) -> Result<()> {
    let lists = service.get_shopping_lists().await?;
    let list = find_list(&lists, list_query)?;
    service.delete_shopping_list(&list.id).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": list.id }));
    } else {
        println!("Deleted shopping list {}", list.name);
    }
    Ok(())
}
