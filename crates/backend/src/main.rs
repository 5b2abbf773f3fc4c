use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod classifier;
mod config;
pub mod error;
mod handlers;
mod mailbox;
mod pacing;
mod pubsub;
mod services;
mod sheets;

use crate::auth::ServiceAccount;
use crate::classifier::OpenAiClassifier;
use crate::config::Config;
use crate::handlers::{AppState, WatchTarget};
use crate::mailbox::GmailClient;
use crate::pacing::TokioPacer;
use crate::services::{MessageOutcome, Pipeline};
use crate::sheets::SheetsStore;

#[derive(Parser)]
#[command(name = "application-tracker")]
#[command(about = "Classify job application emails and record them in a spreadsheet")]
#[command(
    long_about = "Without a mode switch the tracker serves the Pub/Sub push webhook.\n\n\
    -T classifies the most recent inbox message, -S backfills the sheet from the whole inbox."
)]
struct Cli {
    /// Classify the most recent inbox message and exit.
    #[arg(short = 'T', long, conflicts_with = "scan")]
    test_classification: bool,

    /// Scan every inbox message for past applications and exit.
    #[arg(short = 'S', long)]
    scan: bool,

    /// TOML configuration file; environment variables override its values.
    #[arg(long, value_name = "FILE", env = "TRACKER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "application_tracker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("TLS crypto provider already installed");
    }

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    let pipeline = Arc::new(build_pipeline(&config).await?);

    if cli.test_classification {
        match pipeline.classify_latest().await? {
            Some(MessageOutcome::Appended(record)) => tracing::info!(
                "Recorded application: {} / {} / {}",
                record.company,
                record.role,
                record.date_applied
            ),
            Some(outcome) => tracing::info!("Nothing recorded: {:?}", outcome),
            None => {}
        }
        return Ok(());
    }

    if cli.scan {
        let report = pipeline.scan_inbox().await?;
        if let Some(e) = report.aborted {
            return Err(e).context("Inbox scan stopped early");
        }
        return Ok(());
    }

    if config.google.watch_topic.is_empty() {
        tracing::warn!("GMAIL_WATCH_TOPIC not set, /refresh will fail");
    }

    let state = AppState::new(
        pipeline,
        WatchTarget {
            topic: config.google.watch_topic.clone(),
            label_ids: config.google.watch_label_ids.clone(),
        },
    );
    let app = handlers::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wire the Google, classifier and Sheets adapters into a pipeline.
async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let account = ServiceAccount::from_file(&config.google.service_account_key).await?;
    tracing::info!(
        "Using service account {} on behalf of {}",
        account.client_email(),
        config.google.impersonate_user
    );

    let mailbox = GmailClient::impersonating(&account, &config.google.impersonate_user).await?;

    let sheets_auth = auth::authenticator(&account, None)
        .await
        .context("Failed to build Sheets authenticator")?;
    let store = SheetsStore::new(sheets_auth, config.sheets.clone())?;

    let classifier = OpenAiClassifier::new(config.classifier.clone())?;

    let settings = config.pipeline_settings();
    tracing::info!(
        "Pipeline: {} denied senders, {:?} scan delay, {} classifier attempt(s), webhook dedupe {}",
        settings.filter.denied().len(),
        settings.message_delay,
        settings.retry.attempts(),
        settings.webhook_dedupe
    );

    Ok(Pipeline::new(
        Arc::new(mailbox),
        Arc::new(classifier),
        Arc::new(store),
        Arc::new(TokioPacer),
        settings,
    ))
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
