//! `hirewire-watch` -- follow one job posting's bulk screening from a terminal.
//!
//! Logs in with an existing token, opens the push channel, watches the
//! posting, and prints every client event as a JSON line until Ctrl-C.
//!
//! # Environment variables
//!
//! | Variable           | Required | Description                                 |
//! |--------------------|----------|---------------------------------------------|
//! | `HIREWIRE_TOKEN`   | yes      | Session token from the recruiting backend   |
//! | `HIREWIRE_JOB_ID`  | yes      | Job posting to watch                        |
//! | `HIREWIRE_USER_ID` | no       | Recorded on the session for log context     |
//!
//! Connection settings are read by [`ClientConfig::from_env`].

use anyhow::Context;
use hirewire_client::config::ClientConfig;
use hirewire_client::screening::PipelineStages;
use hirewire_client::session::{Session, SessionCredentials};
use hirewire_core::types::DbId;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hirewire_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;
    let token = std::env::var("HIREWIRE_TOKEN").context("HIREWIRE_TOKEN is required")?;
    let job_posting_id: DbId = std::env::var("HIREWIRE_JOB_ID")
        .context("HIREWIRE_JOB_ID is required")?
        .parse()
        .context("HIREWIRE_JOB_ID must be a valid integer")?;
    let user_id = match std::env::var("HIREWIRE_USER_ID") {
        Ok(raw) => Some(
            raw.parse::<DbId>()
                .context("HIREWIRE_USER_ID must be a valid integer")?,
        ),
        Err(_) => None,
    };

    tracing::info!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        job_posting_id,
        "Starting hirewire-watch",
    );

    let session = Session::login(config, SessionCredentials { token, user_id });
    let mut events = session.subscribe();
    session.connect().await;
    let controller = session.watch(job_posting_id, PipelineStages::default()).await;

    let job = controller.current().await;
    tracing::info!(
        status = job.status.as_str(),
        percentage = job.percentage,
        "Initial screening state",
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if let Err(e) = session.check_channel().await {
                        tracing::error!(error = %e, "{}", e.user_message());
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.logout().await;
    Ok(())
}
