use std::sync::Arc;

use anyhow::{Result, Context};
use clap::Parser;
use log::{info, error};

use mailcsv::config::Config;
use mailcsv::database::{Database, RelationalStore};
use mailcsv::imap_client::ImapClient;
use mailcsv::scanner::Scanner;
use mailcsv::sink::Sink;

#[derive(Parser)]
#[command(name = "mailcsv")]
#[command(about = "Saves CSV attachments of subscription emails to disk and/or PostgreSQL")]
#[command(version = "0.1.0")]
struct Args {
    /// Parameters as NAME:VALUE (e.g. WORKING_MODE:BOTH); missing ones are read from the environment
    params: Vec<String>,

    /// Scan and parse without writing anything or changing message flags
    #[arg(short, long)]
    dry_run: bool,

    /// Check the configuration without connecting
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenv::dotenv().ok();

    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_args(&args.params) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    if args.check_config {
        println!("✅ Configuration valid!");
        println!("📧 IMAP: {}@{}:{} folder '{}'",
                 config.imap.username, config.imap.server, config.imap.port, config.imap.folder);
        println!("💾 Working mode: {}", config.mode);
        if let Some(dir) = &config.destination_dir {
            println!("📁 Destination folder: {}", dir.display());
        }
        if let Some(db) = &config.database {
            println!("🗄️  Database: {}@{}:{}/{}", db.username, db.host, db.port, db.database);
        }
        return Ok(());
    }

    if args.dry_run {
        info!("🧪 Starting in DRY-RUN mode");
    } else {
        info!("🚀 Starting mail attachment loader");
    }

    match run(&config, args.dry_run).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("❌ {:#}", e);
            Err(e)
        }
    }
}

async fn run(config: &Config, dry_run: bool) -> Result<()> {
    let store = config.database
        .as_ref()
        .map(|db| Arc::new(Database::new(db)) as Arc<dyn RelationalStore>);

    let sink = Sink::from_config(config, store)?;
    let scanner = Scanner::new(sink, dry_run)?;

    let mailbox = ImapClient::open(&config.imap)
        .await
        .context("Unable to open the mailbox")?;

    let today = chrono::Local::now().date_naive();
    let summary = scanner.run(Box::new(mailbox), today).await?;

    if summary.failed > 0 {
        info!("{} message(s) could not be saved and will be retried next run", summary.failed);
    }
    Ok(())
}
