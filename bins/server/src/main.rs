//! Steerco API Server
//!
//! Main entry point for the change request governance service.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use steerco_api::{AppState, create_router};
use steerco_db::{connect_with, governance_engine};
use steerco_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "steerco=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Connect to database
    let db = connect_with(&config.database).await?;
    info!("Connected to database");

    let engine = governance_engine(db, &config.governance)?;
    info!(
        audit_enabled = config.governance.audit_enabled,
        legacy_group_membership = config.governance.legacy_group_membership,
        quorum_mode = %config.governance.quorum_mode,
        "Governance engine configured"
    );

    let jwt_service = JwtService::new(JwtConfig::from_settings(&config.jwt));

    let state = AppState {
        governance: Arc::new(engine),
        jwt_service: Arc::new(jwt_service),
    };

    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
