use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use luxemart_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    events::{Event, EventSender},
    AppState,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Operational tasks for a LuxeMart deployment
#[derive(Parser, Debug)]
#[command(name = "luxemart-admin", version, about)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create an administrator, or promote an existing account
    CreateAdmin(CreateAdminArgs),
    /// Insert the sample catalog when no products exist
    SeedDemo,
}

#[derive(Args, Debug)]
struct CreateAdminArgs {
    #[arg(long)]
    email: String,
    #[arg(long, default_value = "Administrator")]
    name: String,
    /// Only used when the account does not exist yet
    #[arg(long, env = "LUXEMART_ADMIN_PASSWORD")]
    password: String,
}

#[derive(Serialize)]
struct Report {
    command: &'static str,
    detail: serde_json::Value,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;

        Ok(Self {
            config,
            db: Arc::new(db_pool),
        })
    }

    fn app_state(&self) -> AppState {
        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "luxemart_admin", event = ?event, "received async event");
            }
        });
        AppState::new(
            self.db.clone(),
            self.config.clone(),
            EventSender::new(event_tx),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    let report = match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("migrations failed")?;
            Report {
                command: "migrate",
                detail: serde_json::json!({ "status": "up to date" }),
            }
        }
        Commands::CreateAdmin(args) => {
            let state = context.app_state();
            let admin = state
                .services
                .users
                .ensure_admin(&args.email, &args.name, &args.password)
                .await
                .context("failed to create admin")?;
            Report {
                command: "create-admin",
                detail: serde_json::json!({ "id": admin.id, "email": admin.email }),
            }
        }
        Commands::SeedDemo => {
            let state = context.app_state();
            let inserted = state
                .services
                .catalog
                .seed_demo_catalog()
                .await
                .context("failed to seed demo catalog")?;
            Report {
                command: "seed-demo",
                detail: serde_json::json!({ "inserted": inserted }),
            }
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {}", report.command, report.detail);
    }
    Ok(())
}
