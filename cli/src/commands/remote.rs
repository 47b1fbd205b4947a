use anyhow::{Result, bail};

use carnet_core::remote::RemoteConfig;
use carnet_core::service::{DataService, MigrationOutcome};

pub(crate) struct RemoteArgs {
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
    pub token: String,
    pub api_base: Option<String>,
}

pub(crate) fn cmd_remote_configure(service: &DataService, args: RemoteArgs, json: bool) -> Result<()> {
    let mut config = RemoteConfig::new(&args.owner, &args.repo, &args.token);
    if let Some(branch) = args.branch {
        config.branch = branch.trim().to_string();
    }
    if let Some(api_base) = args.api_base {
        config.api_base = api_base.trim().to_string();
    }
    service.configure_remote(&config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!(
            "Remote storage enabled: {}/{} ({})",
            config.owner, config.repo, config.branch
        );
        println!("Existing local data stays local until you run `carnet remote migrate`.");
    }
    Ok(())
}

pub(crate) fn cmd_remote_disconnect(service: &DataService, json: bool) -> Result<()> {
    let removed = service.disconnect_remote()?;

    if json {
        println!("{}", serde_json::json!({ "disconnected": removed }));
    } else if removed {
        println!("Remote storage disabled. Commands now use the local database.");
    } else {
        eprintln!("No remote storage was configured.");
    }
    Ok(())
}

pub(crate) fn cmd_remote_status(service: &DataService, json: bool) -> Result<()> {
    let config = service.remote_config()?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "backend": if config.is_some() { "remote" } else { "local" }, "remote": config })
        );
    } else if let Some(c) = config {
        println!("Backend: remote");
        println!("  Repository: {}/{}", c.owner, c.repo);
        println!("  Branch:     {}", c.branch);
        println!("  API:        {}", c.api_base);
    } else {
        println!("Backend: local");
    }
    Ok(())
}

pub(crate) async fn cmd_remote_migrate(service: &DataService, json: bool) -> Result<()> {
    if !service.is_remote()? {
        bail!("Configure remote storage first with `carnet remote configure`");
    }
    let outcome = service.migrate_to_remote().await?;

    match outcome {
        MigrationOutcome::NothingToMigrate => {
            if json {
                println!("{}", serde_json::json!({ "migrated": false }));
            } else {
                println!("The local database is empty; nothing to migrate.");
            }
        }
        MigrationOutcome::Migrated(summary) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "migrated": true, "summary": summary })
                );
            } else {
                println!("Migration complete.\n");
                println!("  Recipes:        {}", summary.recipes_imported);
                println!("  Metadata:       {}", summary.metadata_imported);
                println!("  Planned meals:  {}", summary.planning_imported);
                println!("  Shopping lists: {}", summary.shopping_lists_imported);
                println!("\nLocal data was kept. Remove it with `carnet clear-local --yes`.");
            }
        }
    }
    Ok(())
}

pub(crate) async fn cmd_remote_clear(service: &DataService, confirmed: bool, json: bool) -> Result<()> {
    if !confirmed {
        bail!("This deletes every recipe, plan and list in the repository. Re-run with --yes to confirm");
    }
    let deleted = service.clear_remote().await?;

    if json {
        println!("{}", serde_json::json!({ "deleted_files": deleted }));
    } else if deleted == 0 {
        println!("The repository held no carnet data.");
    } else {
        println!("Deleted {deleted} data file(s) from the repository.");
    }
    Ok(())
}

pub(crate) fn cmd_clear_local(service: &DataService, confirmed: bool, json: bool) -> Result<()> {
    if !confirmed {
        bail!("This deletes every local recipe, plan and list. Re-run with --yes to confirm");
    }
    service.clear_local()?;
    service.clear_remote_cache();

    if json {
        println!("{}", serde_json::json!({ "cleared": true }));
    } else {
        println!("Local data cleared.");
    }
    Ok(())
}
