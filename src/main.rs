//! Kumbukkal pepper nursery backend.

use anyhow::{Context, Result};
use nursery_backend::auth::TokenKeys;
use nursery_backend::bus::EventBus;
use nursery_backend::config::Config;
use nursery_backend::gateway::razorpay::RazorpayGateway;
use nursery_backend::http::{router, AppState};
use nursery_backend::notify::{LogMailer, Mailer, Notifier, ResendMailer};
use nursery_backend::services::{accounts, summary};
use nursery_backend::storage::FsBlobStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await.context("connecting to postgres")?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will not be published");
                None
            }
        },
        None => None,
    };

    let mailer: Arc<dyn Mailer> = match config.resend_api_key.as_deref() {
        Some(key) => Arc::new(ResendMailer::new(key, config.mail_from.as_str())?),
        None => {
            tracing::warn!("RESEND_API_KEY not set, mail is logged instead of sent");
            Arc::new(LogMailer)
        }
    };

    if let Some(bootstrap) = &config.admin_bootstrap {
        if accounts::bootstrap_admin(&db, bootstrap).await? {
            tracing::info!(email = %bootstrap.email, "Admin account created");
        }
    }

    tokio::fs::create_dir_all(&config.upload_dir).await.context("creating upload directory")?;
    let state = AppState {
        db,
        gateway: Arc::new(RazorpayGateway::new(config.razorpay_key_id.as_str(), config.razorpay_key_secret.as_str())?),
        notifier: Notifier::new(mailer, config.admin_email.as_str()),
        bus: EventBus::new(nats),
        blobs: Arc::new(FsBlobStore::new(config.upload_dir.clone(), &config.public_base_url)),
        tokens: TokenKeys::new(&config.jwt_secret, config.jwt_ttl_hours),
        config: Arc::new(config),
    };

    summary::spawn_scheduler(state.clone());

    let port = state.config.port;
    let app = router(state);
    tracing::info!("🚀 Nursery backend listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?, app).await?;
    Ok(())
}
