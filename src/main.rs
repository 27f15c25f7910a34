use anyhow::{bail, Context, Result};
use tracing::info;
use urie::api::{create_router, AppState};
use urie::config::UrieConfig;
use urie::seed::seed_demo;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "urie=info".into()),
        )
        .init();

    let config = UrieConfig::load().context("Failed to load configuration")?;

    match std::env::args().nth(1).as_deref() {
        None | Some("serve") => serve(config).await,
        Some("seed") => seed(config),
        Some(other) => bail!("Unknown command '{}' (expected 'serve' or 'seed')", other),
    }
}

async fn serve(config: UrieConfig) -> Result<()> {
    info!("Urie starting...");

    let bind_addr = config.server.bind_addr.clone();
    let state = AppState::from_config(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}

fn seed(config: UrieConfig) -> Result<()> {
    let state = AppState::from_config(config)?;
    match seed_demo(&state.store)? {
        Some(summary) => {
            info!(
                agency = %summary.agency_slug,
                users = ?summary.users,
                campaign = %summary.campaign,
                content_tasks = summary.content_tasks,
                "Seed completed"
            );
        }
        None => info!("Seed skipped: store is not empty"),
    }
    Ok(())
}
