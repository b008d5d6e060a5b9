use std::sync::Arc;

use clap::{Parser, Subcommand};

mod analytics;
mod app;
mod auth;
mod config;
mod loader;
mod sales;
mod state;

use crate::auth::repo::PgUserStore;
use crate::auth::services::{ensure_admin, AdminBootstrap};
use crate::loader::{Encoding, LoadOptions, DEFAULT_SOURCE};
use crate::sales::{FactStore, PgFactStore};

#[derive(Debug, Parser)]
#[command(name = "superstore", version, about = "Superstore sales dashboard backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Apply database migrations.
    CreateDb,
    /// Create the administrative account if it does not exist yet.
    CreateAdmin {
        #[arg(long, env = "ADMIN_USERNAME", default_value = "admin")]
        username: String,
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Bulk-load the sales CSV into the fact table.
    LoadCsv {
        /// File path or http(s) URL.
        #[arg(default_value = DEFAULT_SOURCE)]
        source: String,
        #[arg(long, default_value_t = loader::services::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Keep existing rows instead of wiping the table first.
        #[arg(long)]
        append: bool,
        #[arg(long, value_enum, default_value_t = Encoding::Latin1)]
        encoding: Encoding,
    },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "superstore=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn serve() -> anyhow::Result<()> {
    let app_state = state::AppState::init().await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&app_state.db).await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }

    app::serve(app::build_app(app_state)).await
}

async fn create_db() -> anyhow::Result<()> {
    let db = state::connect(&config::database_url()?).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("database schema is up to date");
    Ok(())
}

async fn create_admin(username: &str, password: &str) -> anyhow::Result<()> {
    let db = state::connect(&config::database_url()?).await?;
    let users = PgUserStore::new(db);
    match ensure_admin(&users, username.trim(), password).await? {
        AdminBootstrap::Created(user) => {
            tracing::info!(user_id = %user.id, username = %user.username, "admin ready")
        }
        AdminBootstrap::AlreadyExists => tracing::info!(%username, "admin left unchanged"),
    }
    Ok(())
}

async fn load_csv(source: &str, encoding: Encoding, options: LoadOptions) -> anyhow::Result<()> {
    let db = state::connect(&config::database_url()?).await?;
    let store = Arc::new(PgFactStore::new(db)) as Arc<dyn FactStore>;
    let report = loader::run(store, source, encoding, options).await?;

    tracing::info!(
        rows_attempted = report.rows_attempted,
        rows_inserted = report.rows_inserted,
        rows_skipped = report.rows_skipped,
        rows_rolled_back = report.rows_rolled_back,
        batches_committed = report.batches_committed,
        batches_failed = report.batches_failed,
        dates_coerced = report.dates_coerced,
        wiped = report.wiped,
        "load report"
    );
    for failure in &report.errors {
        tracing::warn!(
            line = failure.line,
            order_id = failure.order_id.as_deref().unwrap_or(""),
            reason = %failure.reason,
            "row not loaded"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::CreateDb => create_db().await,
        Command::CreateAdmin { username, password } => create_admin(&username, &password).await,
        Command::LoadCsv {
            source,
            batch_size,
            append,
            encoding,
        } => load_csv(&source, encoding, LoadOptions { batch_size, append }).await,
    }
}
