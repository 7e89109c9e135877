//! Blogline - a blogging backend

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blogline::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        DatabasePool,
        repositories::{
            SessionRepository, SqlxBlogRepository, SqlxInteractionRepository,
            SqlxSessionRepository, SqlxUserRepository,
        },
    },
    services::{BlogService, HttpAiService, TokenIssuer, UserService},
};

/// How often expired sessions are purged
const SESSION_CLEANUP_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blogline=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Blogline...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    config.validate()?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let blog_repo = SqlxBlogRepository::boxed(pool.clone());
    let interaction_repo = SqlxInteractionRepository::boxed(pool.clone());

    // Initialize services
    let op_timeout = Duration::from_secs(config.database.operation_timeout_secs);
    let tokens = Arc::new(TokenIssuer::from_config(&config.auth));
    let ai = Arc::new(HttpAiService::new(config.ai.clone())?);
    if config.ai.api_key.is_none() {
        tracing::warn!("No AI API key configured; suggestions use the built-in fallback");
    }

    let user_service = Arc::new(UserService::new(
        user_repo,
        session_repo.clone(),
        tokens,
        op_timeout,
    ));
    let blog_service = Arc::new(BlogService::new(
        blog_repo,
        interaction_repo,
        ai,
        op_timeout,
    ));

    // Purge expired sessions in the background
    {
        let sessions = session_repo.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match sessions.delete_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Removed {} expired sessions", n),
                    Err(e) => tracing::warn!("Session cleanup failed: {:#}", e),
                }
            }
        });
    }

    let state = AppState {
        user_service,
        blog_service,
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
