//! Lookup command - membership query against cached packages

use crate::cli::args::{LookupArgs, OutputFormat};
use crate::cli::commands::Database;
use crate::config::Config;
use crate::error::CacheResult;
use console::style;

/// Execute the lookup command
pub async fn execute(args: LookupArgs, config: &Config) -> CacheResult<()> {
    let database = Database::open(config).await?;
    let result = print_matches(&args, &database);
    database.close().await;
    result
}

fn print_matches(args: &LookupArgs, database: &Database) -> CacheResult<()> {
    let packages = database.state().packages();

    let candidates = if args.packages.is_empty() {
        packages.package_ids()
    } else {
        args.packages.clone()
    };

    let mut found: Vec<u32> = packages
        .lookup_by_group(args.group, candidates, args.limit)?
        .into_iter()
        .collect();
    found.sort_unstable();

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&found)?),
        OutputFormat::Plain => {
            for package_id in &found {
                println!("{}", package_id);
            }
        }
        OutputFormat::Table => {
            println!("{}", style("PACKAGE").bold());
            for package_id in &found {
                println!("{}", package_id);
            }
            println!();
            println!("{} package(s) grant {}", found.len(), args.group);
        }
    }

    Ok(())
}
