//! embedplug CLI entry point.
//!
//! This binary is the composition root for the workspace. It runs in one of
//! two modes:
//!
//! | Subcommand | Side | Behaviour |
//! |------------|------|-----------|
//! | `serve` | plugin | Serves a [`hashing::HashingEmbedder`]; must be launched by a host |
//! | `embed` | host | Launches a plugin, embeds one text, prints a JSON array |
//!
//! Observability is wired once in [`telemetry::init`] and always writes to
//! stderr.
//!
//! ```text
//! embedplug embed --plugin "$(command -v embedplug)" --plugin-arg serve "hello world"
//! ```

mod hashing;
mod telemetry;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use embedding::{Embedding, EmbeddingPlugin, EMBEDDING_PLUGIN};
use plugin_core::CallContext;
use plugin_rpc::PluginClient;

use crate::hashing::HashingEmbedder;
use crate::telemetry::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "embedplug", version, about = "Run or call an embedding plugin")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t, env = "EMBEDPLUG_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the demo hashing embedder as a plugin.
    Serve(ServeArgs),
    /// Embed TEXT using a plugin binary.
    Embed(EmbedArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Length of every produced vector.
    #[arg(long, default_value = "64")]
    dimensions: NonZeroUsize,
}

#[derive(Debug, Args)]
struct EmbedArgs {
    /// Plugin executable to launch.
    #[arg(long)]
    plugin: PathBuf,

    /// Argument passed to the plugin executable; repeatable.
    #[arg(long = "plugin-arg", allow_hyphen_values = true)]
    plugin_args: Vec<String>,

    /// Abandon the call after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    text: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = telemetry::init(cli.log_format)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    let result = match cli.command {
        Command::Serve(args) => serve(args, shutdown).await,
        Command::Embed(args) => embed(args, shutdown).await,
    };

    telemetry.shutdown();
    result
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
        Err(err) => warn!(error = %err, "cannot listen for interrupts"),
    }
}

async fn serve(args: ServeArgs, shutdown: CancellationToken) -> anyhow::Result<()> {
    let embedder = HashingEmbedder::new(args.dimensions);
    info!(dimensions = embedder.dimensions(), "serving hashing embedder");

    plugin_rpc::serve(EmbeddingPlugin::serve_config(Arc::new(embedder)), shutdown)
        .await
        .context("plugin server failed")
}

async fn embed(args: EmbedArgs, shutdown: CancellationToken) -> anyhow::Result<()> {
    let config = EmbeddingPlugin::client_config(args.plugin.clone()).with_args(args.plugin_args);
    let client = PluginClient::launch(config)
        .await
        .with_context(|| format!("failed to launch plugin {}", args.plugin.display()))?;

    let result = embed_with(&client, &args.text, args.timeout_ms, shutdown).await;

    if let Err(err) = client.kill().await {
        warn!(error = %err, "failed to stop plugin process");
    }

    let vector = result?;
    println!("{}", serde_json::to_string(&vector)?);
    Ok(())
}

async fn embed_with(
    client: &PluginClient,
    text: &str,
    timeout_ms: Option<u64>,
    shutdown: CancellationToken,
) -> anyhow::Result<Vec<f32>> {
    let embedder = client.dispense::<Arc<dyn Embedding>>(EMBEDDING_PLUGIN)?;

    let mut ctx = CallContext::with_cancellation(shutdown);
    if let Some(ms) = timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(ms));
    }

    info!(correlation_id = %ctx.correlation_id(), "embedding text");
    let vector = embedder.embed(&ctx, text).await?;
    Ok(vector)
}
