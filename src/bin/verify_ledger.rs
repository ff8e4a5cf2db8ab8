use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use tracing::{error, info};

use access_ledger::audit::{find_tampered_entries, verify_chain};
use access_ledger::database::Database;
use access_ledger::storage::LedgerStore;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("verify-ledger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Verify the integrity of a durable access ledger")
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .env("ACCESS_LEDGER__DATABASE__URL")
                .help("SQLite URL of the ledger database")
                .required(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("List every entry whose hash does not recompute"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress output except errors"),
        )
        .get_matches();

    let Some(database_url) = matches.get_one::<String>("database-url") else {
        anyhow::bail!("--database-url is required");
    };
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Verifying ledger at {}", database_url);
    let database = Database::new(database_url, 1).await?;
    let entries = database.all_entries().await?;
    let verification = verify_chain(&entries);

    if verbose {
        for index in find_tampered_entries(&entries) {
            println!("tampered: entry {} ({})", index, entries[index].id);
        }
    }

    if let Some(broken) = &verification.first_broken {
        error!("{}", verification.summary());
        eprintln!("first broken index: {} ({})", broken.index, broken.reason);
        std::process::exit(1);
    }

    if !quiet {
        println!("✓ {}", verification.summary());
    }

    Ok(())
}
