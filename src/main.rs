//! dualbase - maintenance commands over the persistence layer
//!
//! Usage:
//! ```bash
//! dualbase sweep-expired
//! dualbase expiring-soon --days 3
//! dualbase --config dualbase.toml stats
//! ```

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use dualbase::DatabaseContext;
use dualbase::config::{DatabaseConfig, load_config};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "dualbase")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file; takes precedence over the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Soft-delete every report past its expiry
    SweepExpired,

    /// List active reports expiring within the next N days
    ExpiringSoon {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Report counts and total revenue
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    dualbase::logging::init("dualbase=info");

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DatabaseConfig::from_env()?,
    };

    let mut context = DatabaseContext::from_config(&config)?;
    info!(backend = %context.backend(), "database context ready");
    let mut connection_errors = context.take_connection_errors();

    let outcome = tokio::select! {
        result = run(&context, cli.command) => result,
        Some(message) = next_connection_error(&mut connection_errors) => Err(anyhow!(message)),
    };

    context.close().await?;
    outcome
}

async fn next_connection_error(
    errors: &mut Option<mpsc::Receiver<String>>,
) -> Option<String> {
    match errors {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn run(context: &DatabaseContext, command: Command) -> Result<()> {
    match command {
        Command::SweepExpired => {
            let swept = context.reports().soft_delete_expired().await?;
            println!("{} expired report(s) soft-deleted", swept);
        }
        Command::ExpiringSoon { days } => {
            let reports = context.reports().list_expiring_soon(days).await?;
            if reports.is_empty() {
                println!("no reports expire within {} day(s)", days);
            }
            for report in reports {
                println!(
                    "{}  {}  {}  {}",
                    report.expires_at.format("%Y-%m-%d %H:%M"),
                    report.report_id,
                    report.user_id,
                    report.subject
                );
            }
        }
        Command::Stats => {
            let (active, deleted, revenue) = futures::try_join!(
                context.reports().count_all(),
                context.reports().count_deleted(),
                context.payments().get_total_revenue()
            )?;
            println!("backend:          {}", context.backend());
            println!("active reports:   {}", active);
            println!("deleted reports:  {}", deleted);
            println!("revenue (minor):  {}", revenue);
        }
    }
    Ok(())
}
