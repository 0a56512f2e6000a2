//! services/client/src/bin/client.rs
//!
//! Headless client: restores the previous session, keeps the question cache in
//! sync with the backend and reports session changes until interrupted.

use client_lib::{
    adapters::{DbAdapter, FileLocalStore, HostedAuthAdapter, OpenAiAnswerAdapter},
    config::Config,
    error::ClientError,
};
use async_openai::{config::OpenAIConfig, Client};
use fitqa_core::{AppStore, StorePorts};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting client...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let local_store = Arc::new(FileLocalStore::new(config.local_store_path.clone()));
    info!("Local store at {}", local_store.path().display());

    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| ClientError::Internal(format!("Failed to build HTTP client: {}", e)))?;
    let auth_adapter = Arc::new(HostedAuthAdapter::new(
        http,
        &config.supabase_url,
        config.supabase_anon_key.clone(),
        local_store.clone(),
    ));

    let openai_config = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());
    let answer_adapter = Arc::new(OpenAiAnswerAdapter::new(
        Client::with_config(openai_config),
        config.ai_model.clone(),
    ));

    // --- 4. Build the Shared Store ---
    let store = Arc::new(
        AppStore::new(StorePorts {
            remote: db_adapter,
            auth: auth_adapter,
            answers: answer_adapter,
            local: local_store,
        })
        .with_page_size(config.question_page_size),
    );

    store.restore().await;
    match store.session().await {
        Some(session) if session.is_guest => info!(user_id = %session.id, "Running as guest"),
        Some(session) => info!(user_id = %session.id, email = %session.email, "Running as signed-in user"),
        None => info!("No session; waiting for sign-in"),
    }
    info!(questions = store.questions().await.len(), "Question cache loaded");

    // --- 5. Start Background Sync ---
    let auth_watch = store.watch_auth();
    let sync = store.start_sync();

    let mut sessions = store.session_watch();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
            changed = sessions.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = sessions.borrow_and_update().clone();
                match session {
                    Some(session) => info!(user_id = %session.id, "Session started"),
                    None => info!("Session ended"),
                }
            }
        }
    }

    // --- 6. Shut Down ---
    info!("Shutting down...");
    sync.stop().await;
    auth_watch.abort();
    Ok(())
}
