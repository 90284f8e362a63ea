use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carbon_ledger::{api, config::ServerConfig, db};

#[derive(Parser)]
#[command(name = "carbon-ledger")]
#[command(about = "Carbon-emission accounting for multi-step project forms")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API (overrides CARBON_LEDGER_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides CARBON_LEDGER_BIND)
        #[arg(short, long)]
        bind: Option<String>,

        /// SQLite database file (overrides CARBON_LEDGER_DATABASE)
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Apply pending database migrations and exit
    Migrate {
        /// SQLite database file (overrides CARBON_LEDGER_DATABASE)
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "carbon_ledger=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(config: &ServerConfig) -> anyhow::Result<db::Database> {
    let db = match &config.database {
        Some(path) => db::Database::open(path.clone())?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let db = open_database(&config)?;
    let app = api::create_router_with_config(db, &config);

    let address = config.address();
    tracing::info!("Starting carbon-ledger server on {}", address);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("carbon-ledger server listening on http://{}", address);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = ServerConfig::from_env();

    match cli.command {
        Some(Commands::Serve {
            port,
            bind,
            database,
        }) => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if database.is_some() {
                config.database = database;
            }
            serve(config).await?;
        }
        Some(Commands::Migrate { database }) => {
            if database.is_some() {
                config.database = database;
            }
            open_database(&config)?;
            tracing::info!("Database is up to date");
        }
        None => serve(config).await?,
    }

    Ok(())
}
