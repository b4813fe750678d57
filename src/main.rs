use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use billing_rs::config::Config;
use billing_rs::store::{BillingStore, MemoryStore, PgStore};
use billing_rs::{build_app, db};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,billing_rs=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env()?;
    tracing::info!("config loaded");

    let store: Arc<dyn BillingStore> = match cfg.store_backend.as_str() {
        "memory" => {
            tracing::warn!("using in-memory store, state will not survive restart");
            Arc::new(MemoryStore::new())
        }
        "postgres" => {
            let database_url = cfg
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL is required when STORE_BACKEND=postgres")?;
            let pool = db::create_pool(database_url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("db connected + migrations applied");
            Arc::new(PgStore::new(pool))
        }
        other => return Err(format!("unknown STORE_BACKEND: {other}").into()),
    };

    let app = build_app(store, &cfg);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
