mod api;
mod audit;
mod backend;
mod command;
mod config;
mod error;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::api::accessverifier::AccessVerifier;
use crate::api::client::ApiClient;
use crate::api::discover::DiscoverClient;
use crate::api::token::TokenClient;
use crate::backend::SocketBackend;
use crate::command::args::{parse_command, Principal};
use crate::command::readwriter::ReadWriter;
use crate::command::{CommandContext, Outcome};
use crate::config::Config;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "gitgate", about = "Access gateway for Git-over-SSH operations")]
#[command(group(ArgGroup::new("principal").required(true).multiple(false)))]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/gitgate/config.yaml")]
    config: String,

    /// Authorized-key identifier of the caller.
    #[arg(long, group = "principal")]
    key_id: Option<String>,

    /// Username of the caller.
    #[arg(long, group = "principal")]
    username: Option<String>,

    /// Numeric user identifier of the caller.
    #[arg(long, group = "principal")]
    user_id: Option<u64>,

    /// Operation to execute; defaults to $SSH_ORIGINAL_COMMAND.
    #[arg(long)]
    command: Option<String>,
}

impl Cli {
    fn principal(&self) -> Result<Principal> {
        if let Some(id) = &self.key_id {
            Ok(Principal::KeyId(id.clone()))
        } else if let Some(name) = &self.username {
            Ok(Principal::Username(name.clone()))
        } else if let Some(id) = self.user_id {
            Ok(Principal::UserId(id))
        } else {
            // clap enforces the group; this is unreachable in practice.
            anyhow::bail!("one of --key-id, --username, --user-id is required")
        }
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cancel `token` on SIGINT or SIGTERM so in-flight authority and store
/// calls abort cleanly instead of being killed mid-write.
fn watch_shutdown_signals(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("received SIGINT"),
            () = terminate => tracing::info!("received SIGTERM"),
        }
        token.cancel();
    });
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn build_context(config: &Config, principal: Principal) -> Result<CommandContext> {
    let secret = config.authority.resolve_secret()?;
    let api = Arc::new(ApiClient::new(
        config.authority.base_url.clone(),
        secret,
        config.authority.request_timeout(),
    )?);

    Ok(CommandContext {
        principal,
        verifier: AccessVerifier::new(Arc::clone(&api)),
        tokens: TokenClient::new(Arc::clone(&api)),
        discover: DiscoverClient::new(api),
        backend: Arc::new(SocketBackend::new(&config.backend)),
    })
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;

    // ---- Request-scoped state ----
    let principal = cli.principal()?;
    let raw_command = match &cli.command {
        Some(command) => command.clone(),
        None => std::env::var("SSH_ORIGINAL_COMMAND").unwrap_or_default(),
    };
    let trace_id = uuid::Uuid::new_v4().to_string();

    let cancel = CancellationToken::new();
    watch_shutdown_signals(cancel.clone());

    let ctx = build_context(&config, principal)?;

    tracing::debug!(correlation_id = %trace_id, command = %raw_command, "handling operation");

    // ---- Pipeline ----
    let mut streams = ReadWriter::stdio();
    let outcome = match parse_command(&raw_command) {
        Ok(op) => command::dispatch(&ctx, &op, &mut streams, &trace_id, &cancel).await,
        Err(err) => Outcome::failure(err),
    };

    // ---- Audit ----
    if let Some(record) = &outcome.audit {
        audit::emit(&trace_id, record);
    }

    // ---- Exit ----
    match outcome.result {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.is_cancelled() {
                tracing::info!(correlation_id = %trace_id, "operation cancelled before completion");
            }
            let message = format!("{err}\n");
            streams
                .err_output
                .write_all(message.as_bytes())
                .await
                .context("failed to write error to session stream")?;
            streams.err_output.flush().await.ok();
            std::process::exit(1);
        }
    }
}
