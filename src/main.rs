use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use finca::auth::{self, session};
use finca::config::{Cli, Command, Config};
use finca::db;
use finca::media::LocalAssetStore;
use finca::state::{AppState, DbPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::IssueToken { username } => {
            let user_id = {
                let conn = pool.get()?;
                auth::ensure_user(&conn, &username)?
            };
            let token = session::create_session(&pool, user_id, config.auth.session_hours)?;
            tracing::info!(user_id, "Issued session for {}", username);
            println!("{token}");
            Ok(())
        }
        Command::Serve => serve(pool, config).await,
    }
}

async fn serve(pool: DbPool, config: Config) -> anyhow::Result<()> {
    let assets = LocalAssetStore::new(config.uploads_path(), config.public_url());
    let state = AppState {
        db: pool,
        config: config.clone(),
        assets: Arc::new(assets),
    };

    let app = finca::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
