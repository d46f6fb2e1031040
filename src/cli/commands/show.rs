//! Show command - summarize the cache database

use crate::cli::args::{OutputFormat, ShowArgs};
use crate::cli::commands::Database;
use crate::config::Config;
use crate::error::CacheResult;
use crate::state::GlobalCacheState;
use console::style;
use serde::Serialize;
use uuid::Uuid;

/// Database summary
#[derive(Debug, Serialize)]
struct Summary {
    identifier: Uuid,
    cell_id: u32,
    last_change_number: u32,
    packages: usize,
    access_tokens: usize,
    expired_packages: usize,
    bad_bots: usize,
    card_counts: usize,
    servers: usize,
}

impl Summary {
    fn of(state: &GlobalCacheState) -> Self {
        let document = state.to_document();
        let now = chrono::Utc::now();

        Self {
            identifier: document.identifier,
            cell_id: document.cell_id,
            last_change_number: document.last_change_number,
            packages: document.packages_data.len(),
            access_tokens: document.packages_access_tokens.len(),
            expired_packages: document
                .packages_data
                .values()
                .filter(|record| record.is_expired_at(now))
                .count(),
            bad_bots: document.bad_bot_ids.len(),
            card_counts: document.card_counts_per_game.len(),
            servers: document.server_list.servers.len(),
        }
    }
}

/// Execute the show command
pub async fn execute(args: ShowArgs, config: &Config) -> CacheResult<()> {
    let database = Database::open(config).await?;
    let summary = Summary::of(database.state());

    let printed: CacheResult<()> = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&summary)
            .map(|json| println!("{}", json))
            .map_err(Into::into),
        OutputFormat::Plain => {
            println!("{}", summary.identifier);
            Ok(())
        }
        OutputFormat::Table => {
            print_table(&summary, database.path());
            Ok(())
        }
    };

    database.close().await;
    printed
}

fn print_table(summary: &Summary, path: Option<&std::path::Path>) {
    if let Some(path) = path {
        println!("{} {}", style("Database").bold(), path.display());
    }
    println!("{}", "-".repeat(48));

    let rows = [
        ("Identifier", summary.identifier.to_string()),
        ("Cell ID", summary.cell_id.to_string()),
        ("Last change number", summary.last_change_number.to_string()),
        (
            "Packages",
            format!("{} ({} expired)", summary.packages, summary.expired_packages),
        ),
        ("Access tokens", summary.access_tokens.to_string()),
        ("Bad bots", summary.bad_bots.to_string()),
        ("Card counts", summary.card_counts.to_string()),
        ("Servers", summary.servers.to_string()),
    ];

    for (key, value) in rows {
        println!("{:<20} {}", style(key).dim(), value);
    }
}
