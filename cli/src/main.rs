mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    RecipeArgs, RemoteArgs, cmd_clear_local, cmd_cooked, cmd_export, cmd_import, cmd_plan_add,
    cmd_plan_remove, cmd_plan_show, cmd_rate, cmd_recipe_add, cmd_recipe_delete, cmd_recipe_edit,
    cmd_recipe_import, cmd_recipe_list, cmd_recipe_show, cmd_remote_clear, cmd_remote_configure,
    cmd_remote_disconnect, cmd_remote_migrate, cmd_remote_status, cmd_shop_check,
    cmd_shop_delete, cmd_shop_generate, cmd_shop_list, cmd_shop_show, cmd_shop_status,
    cmd_status, cmd_tag, parse_date,
};
use crate::config::Config;
use carnet_core::fetch::DEFAULT_RELAY_TIMEOUT;
use carnet_core::service::DataService;

#[derive(Parser)]
#[command(
    name = "carnet",
    version,
    about = "A recipe notebook: collect, plan, shop",
    long_about = "A recipe notebook: collect recipes from the web, plan the week, \
                  build shopping lists. Data lives in a local database or, once \
                  configured, in a Git repository you own."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Set the status of a recipe: to-test, testing, validated, archived
    Status {
        /// Recipe id, id prefix or title
        recipe: String,
        /// New status
        status: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rate a recipe from 1 to 5 (omit the rating to clear it)
    Rate {
        /// Recipe id, id prefix or title
        recipe: String,
        /// Rating (1-5)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add or remove a recipe tag
    Tag {
        /// Recipe id, id prefix or title
        recipe: String,
        #[command(subcommand)]
        action: TagAction,
    },
    /// Record that a recipe was cooked
    Cooked {
        /// Recipe id, id prefix or title
        recipe: String,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// How it went
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan meals for the week
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Shopping lists
    Shop {
        #[command(subcommand)]
        command: ShopCommands,
    },
    /// Write every recipe, plan and list to a backup file
    Export {
        /// Destination file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load a backup file, replacing records with the same ids
    Import {
        /// Backup file written by `carnet export`
        file: PathBuf,
        /// Remove every record the backup does not contain
        #[arg(long)]
        replace: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store data in a GitHub repository instead of the local database
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Delete all local recipes, plans and lists (remote settings are kept)
    ClearLocal {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Add a recipe by hand
    Add {
        /// Recipe title
        title: String,
        /// Number of servings (default: 4)
        #[arg(short, long)]
        servings: Option<u32>,
        /// Preparation time in minutes
        #[arg(long)]
        prep: Option<u32>,
        /// Cooking time in minutes
        #[arg(long)]
        cook: Option<u32>,
        /// Where the recipe comes from
        #[arg(long)]
        source: Option<String>,
        /// Ingredient line, repeatable (e.g. "200 g de farine", "2 cups flour")
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,
        /// Step, repeatable, in order
        #[arg(long = "step")]
        steps: Vec<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a web page
    Import {
        /// Page URL
        url: String,
        /// Relay template, repeatable, tried in order ({url} or {encoded})
        #[arg(long = "relay")]
        relays: Vec<String>,
        /// Seconds allowed per relay attempt
        #[arg(long, default_value_t = DEFAULT_RELAY_TIMEOUT.as_secs())]
        timeout: u64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Only recipes with this status
        #[arg(long)]
        status: Option<String>,
        /// Only recipes with this tag
        #[arg(long)]
        tag: Option<String>,
        /// Title contains
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe
    Show {
        /// Recipe id, id prefix or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a recipe's title, servings or notes
    Edit {
        /// Recipe id, id prefix or title
        recipe: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        servings: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe and its metadata
    Delete {
        /// Recipe id, id prefix or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// Add a tag
    Add {
        tag: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a tag
    Remove {
        tag: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Put a recipe in a meal slot, replacing what was there
    Add {
        /// Any date in the target week (YYYY-MM-DD or today/tomorrow)
        date: String,
        /// Day: 0-6 (Monday = 0) or a day name
        day: String,
        /// Meal: lunch or dinner
        slot: String,
        /// Recipe id, id prefix or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a planned meal
    Remove {
        /// Planning entry id or id prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the week containing a date (default: this week)
    Show {
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShopCommands {
    /// Build a shopping list from the recipes planned for a week
    Generate {
        /// List name
        name: String,
        /// Any date in the week (default: this week)
        #[arg(long)]
        week: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List shopping lists, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a shopping list
    Show {
        /// List id or id prefix
        list: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check or uncheck an item
    Check {
        /// List id or id prefix
        list: String,
        /// Item number as shown by `shop show`, or item id
        item: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a list's status: active, completed, archived
    Status {
        /// List id or id prefix
        list: String,
        status: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a shopping list
    Delete {
        /// List id or id prefix
        list: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Store data in a GitHub repository from now on
    Configure {
        /// Repository owner
        #[arg(long)]
        owner: String,
        /// Repository name
        #[arg(long)]
        repo: String,
        /// Branch (default: main)
        #[arg(long)]
        branch: Option<String>,
        /// Access token with contents write permission
        #[arg(long, env = "CARNET_REMOTE_TOKEN", hide_env_values = true)]
        token: String,
        /// API base URL, for GitHub Enterprise
        #[arg(long)]
        api_base: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Go back to the local database
    Disconnect {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which backend is active
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy all local data to the configured repository
    Migrate {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the data files from the configured repository
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = DataService::new(&config.db_path)?;
    tracing::debug!(db = %config.db_path.display(), "opened local database");

    match cli.command {
        Commands::Recipe { command } => match command {
            RecipeCommands::Add {
                title,
                servings,
                prep,
                cook,
                source,
                ingredients,
                steps,
                notes,
                json,
            } => {
                let args = RecipeArgs {
                    title,
                    servings,
                    prep,
                    cook,
                    source,
                    ingredients,
                    steps,
                    notes,
                };
                cmd_recipe_add(&service, args, json).await
            }
            RecipeCommands::Import {
                url,
                relays,
                timeout,
                json,
            } => cmd_recipe_import(&service, &url, relays, timeout, json).await,
            RecipeCommands::List {
                status,
                tag,
                search,
                json,
            } => cmd_recipe_list(&service, status.as_deref(), tag, search, json).await,
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(&service, &recipe, json).await,
            RecipeCommands::Edit {
                recipe,
                title,
                servings,
                notes,
                json,
            } => cmd_recipe_edit(&service, &recipe, title, servings, notes, json).await,
            RecipeCommands::Delete { recipe, json } => {
                cmd_recipe_delete(&service, &recipe, json).await
            }
        },
        Commands::Status {
            recipe,
            status,
            json,
        } => cmd_status(&service, &recipe, &status, json).await,
        Commands::Rate {
            recipe,
            rating,
            json,
        } => cmd_rate(&service, &recipe, rating, json).await,
        Commands::Tag { recipe, action } => match action {
            TagAction::Add { tag, json } => cmd_tag(&service, &recipe, &tag, false, json).await,
            TagAction::Remove { tag, json } => cmd_tag(&service, &recipe, &tag, true, json).await,
        },
        Commands::Cooked {
            recipe,
            date,
            notes,
            json,
        } => cmd_cooked(&service, &recipe, parse_date(date)?, notes, json).await,
        Commands::Plan { command } => match command {
            PlanCommands::Add {
                date,
                day,
                slot,
                recipe,
                json,
            } => cmd_plan_add(&service, parse_date(Some(date))?, &day, &slot, &recipe, json).await,
            PlanCommands::Remove { id, json } => cmd_plan_remove(&service, &id, json).await,
            PlanCommands::Show { date, json } => {
                cmd_plan_show(&service, parse_date(date)?, json).await
            }
        },
        Commands::Shop { command } => match command {
            ShopCommands::Generate { name, week, json } => {
                cmd_shop_generate(&service, &name, parse_date(week)?, json).await
            }
            ShopCommands::List { json } => cmd_shop_list(&service, json).await,
            ShopCommands::Show { list, json } => cmd_shop_show(&service, &list, json).await,
            ShopCommands::Check { list, item, json } => {
                cmd_shop_check(&service, &list, &item, json).await
            }
            ShopCommands::Status { list, status, json } => {
                cmd_shop_status(&service, &list, &status, json).await
            }
            ShopCommands::Delete { list, json } => cmd_shop_delete(&service, &list, json).await,
        },
        Commands::Export { file, json } => cmd_export(&service, &file, json).await,
        Commands::Import {
            file,
            replace,
            json,
        } => cmd_import(&service, &file, replace, json).await,
        Commands::Remote { command } => match command {
            RemoteCommands::Configure {
                owner,
                repo,
                branch,
                token,
                api_base,
                json,
            } => cmd_remote_configure(
                &service,
                RemoteArgs {
                    owner,
                    repo,
                    branch,
                    token,
                    api_base,
                },
                json,
            ),
            RemoteCommands::Disconnect { json } => cmd_remote_disconnect(&service, json),
            RemoteCommands::Status { json } => cmd_remote_status(&service, json),
            RemoteCommands::Migrate { json } => cmd_remote_migrate(&service, json).await,
            RemoteCommands::Clear { yes, json } => cmd_remote_clear(&service, yes, json).await,
        },
        Commands::ClearLocal { yes, json } => cmd_clear_local(&service, yes, json),
    }
}
