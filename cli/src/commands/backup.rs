use std::path::Path;

use anyhow::{Context, Result};

use carnet_core::models::ExportData;
use carnet_core::service::DataService;

pub(crate) async fn cmd_export(service: &DataService, path: &Path, json: bool) -> Result<()> {
    let data = service.export_all().await?;
    let mut text = serde_json::to_string_pretty(&data)?;
    text.push('\n');
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "file": path.display().to_string(),
                "recipes": data.recipes.len(),
                "metadata": data.metadata.len(),
                "planning": data.planning.len(),
                "shopping_lists": data.shopping_lists.len(),
            })
        );
    } else {
        println!("Exported to {}\n", path.display());
        println!("  Recipes:        {}", data.recipes.len());
        println!("  Metadata:       {}", data.metadata.len());
        println!("  Planned meals:  {}", data.planning.len());
        println!("  Shopping lists: {}", data.shopping_lists.len());
    }
    Ok(())
}

pub(crate) async fn cmd_import(
    service: &DataService,
    path: &Path,
    replace: bool,
    json: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let data: ExportData = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a carnet export file", path.display()))?;

    let summary = if replace {
        service.restore_all(&data).await?
    } else {
        service.import_all(&data).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        if replace {
            println!("Restore complete; records missing from the backup were removed.\n");
        } else {
            println!("Import complete.\n");
        }
        println!("  Recipes:        {}", summary.recipes_imported);
        println!("  Metadata:       {}", summary.metadata_imported);
        println!("  Planned meals:  {}", summary.planning_imported);
        println!("  Shopping lists: {}", summary.shopping_lists_imported);
    }
    Ok(())
}
