//! Task Manager
//!
//! A multi-user to-do web application with a JSON API and daily email
//! reports.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use task_manager::cli::{Cli, Command, CreateUserArgs};
use task_manager::config::Config;
use task_manager::db::Database;
use task_manager::reports::{self, LogMailer, Mailer};
use task_manager::error::ApiError;
use task_manager::web;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Build the level filter: `RUST_LOG` when set, else the `--verbose` level.
fn env_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()))
}

fn init_logging(cli: &Cli) -> Result<()> {
    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(cli.verbose))
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(cli.verbose))
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(env_filter(cli.verbose))
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn open_database(config: &Config) -> Result<Arc<Database>> {
    config.ensure_db_dir()?;
    info!(path = %config.server.db_path.display(), "Opening database");
    Ok(Arc::new(Database::open(&config.server.db_path)?))
}

async fn serve(config: Config) -> Result<()> {
    let db = open_database(&config)?;
    let server_config = Arc::new(config.server.clone());

    let (server_shutdown, addr) = web::start_server(Arc::clone(&db), server_config).await?;
    info!(%addr, "Server started");

    let scheduler = if config.reports.enabled {
        let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);
        Some(reports::start_report_scheduler(
            Arc::clone(&db),
            mailer,
            config.email.clone(),
        ))
    } else {
        info!("Report scheduler disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = server_shutdown.send(());
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    Ok(())
}

fn create_user(config: &Config, args: CreateUserArgs) -> Result<()> {
    let new_user = args.into_new_user().map_err(|errors| {
        let err = ApiError::from(errors);
        anyhow::anyhow!(
            "Invalid {}: {}",
            err.field.as_deref().unwrap_or("input"),
            err.message
        )
    })?;
    let db = open_database(config)?;
    let user = db.create_user(new_user)?;
    println!("Created user {} (id {})", user.username, user.id);
    Ok(())
}

async fn send_reports(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let sent = reports::run_reports_at(&db, &LogMailer, &config.email, Local::now()).await?;
    println!("Sent {} report(s)", sent);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let mut config = Config::load_with_env(cli.config.as_deref().map(Path::new))?;

    // Override paths from CLI arguments
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }

    match cli.command {
        Some(Command::CreateUser(args)) => create_user(&config, args),
        Some(Command::SendReports) => send_reports(&config).await,
        Some(Command::Serve(args)) => {
            if let Some(port) = args.port {
                config.server.port = port;
            }
            serve(config).await
        }
        None => serve(config).await,
    }
}
