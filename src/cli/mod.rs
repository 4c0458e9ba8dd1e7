use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::app::{app, AppState};
use crate::auth::{generate_jwt, Claims};
use crate::config::{self, AppConfig};
use crate::database::manager::DatabaseManager;
use crate::database::memory::MemoryStore;
use crate::database::schema;
use crate::database::store::{PgStore, StoreGateway};

#[derive(Parser)]
#[command(name = "aula")]
#[command(about = "Aula - academic records API with audited mutations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Port to listen on (defaults to API_PORT / PORT)")]
        port: Option<u16>,

        #[arg(long, help = "Use the in-memory store instead of PostgreSQL")]
        memory: bool,
    },

    #[command(about = "Create missing entity and audit tables")]
    Migrate,

    #[command(about = "Mint a JWT signed with the configured secret")]
    Token {
        #[arg(long, help = "User recorded as usuario_modificador")]
        usuario: String,

        #[arg(long, help = "Role checked against SECURITY_ADMIN_ROLES")]
        rol: String,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::config().clone();

    match cli.command {
        Commands::Serve { port, memory } => serve(config, port, memory).await,
        Commands::Migrate => migrate(&config).await,
        Commands::Token { usuario, rol } => {
            let claims = Claims::new(usuario, rol, config.security.jwt_expiry_hours)?;
            let token = generate_jwt(&claims, &config.security.jwt_secret)?;
            println!("{}", token);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, port: Option<u16>, memory: bool) -> anyhow::Result<()> {
    info!("Starting Aula API in {:?} mode", config.environment);
    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set to serve authenticated routes");
    }

    let database = if memory {
        None
    } else {
        let manager = DatabaseManager::connect(&config.database)
            .await
            .context("failed to open the database pool")?;
        manager.health_check().await.context("database did not answer a ping")?;
        if config.database.auto_migrate {
            schema::migrate(manager.pool()).await.context("failed to apply schema")?;
        }
        Some(manager)
    };

    let store: Arc<dyn StoreGateway> = match &database {
        Some(manager) => Arc::new(PgStore::new(manager.pool().clone())),
        None => {
            info!("Using in-memory store; data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let port = port.unwrap_or(config.api.port);
    let router = app(AppState::new(store, config));

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Aula API listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(manager) = database {
        manager.close().await;
    }
    info!("Shutdown complete");
    Ok(())
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let manager = DatabaseManager::connect(&config.database).await?;
    let result = schema::migrate(manager.pool()).await;
    manager.close().await;
    result?;
    println!("Schema is up to date");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, draining connections");
}
