use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mapsync::prelude::*;

/// mapsync real-time map synchronization server
#[derive(Parser, Debug)]
#[command(name = "mapsync", version, about = "mapsync real-time map synchronization server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "MAPSYNC_BIND", default_value = "0.0.0.0:9191")]
    bind: String,

    /// Client id every connection must present
    #[arg(long, env = "CLIENT_ID")]
    client_id: String,

    /// Client secret every connection must present
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Seconds between heartbeat pings
    #[arg(long, env = "MAPSYNC_PING_INTERVAL_SECS", default_value_t = 10)]
    ping_interval_secs: u64,

    /// Seconds a client may take to finish the WebSocket upgrade
    #[arg(long, env = "MAPSYNC_HANDSHAKE_TIMEOUT_SECS", default_value_t = 10)]
    handshake_timeout_secs: u64,

    /// Outbound frames buffered per connection
    #[arg(long, env = "MAPSYNC_MAILBOX_CAPACITY", default_value_t = 256)]
    mailbox_capacity: usize,

    /// JSON file of character assets to seed the in-memory store
    #[arg(long, env = "MAPSYNC_ASSETS")]
    assets: Option<PathBuf>,

    /// Enable structured JSON logging
    #[arg(long, env = "MAPSYNC_JSON_LOGS")]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mapsync=info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    tracing::info!("mapsync v{} starting", env!("CARGO_PKG_VERSION"));

    let store = match &args.assets {
        Some(path) => MemoryAssetStore::load(path).await?,
        None => MemoryAssetStore::new(),
    };

    let server = MapsyncServerBuilder::new()
        .bind(&args.bind)
        .credentials(ClientCredentials::new(args.client_id, args.client_secret))
        .heartbeat(HeartbeatConfig::with_interval(Duration::from_secs(
            args.ping_interval_secs,
        )))
        .handshake_timeout(Duration::from_secs(args.handshake_timeout_secs))
        .mailbox(MailboxConfig {
            capacity: args.mailbox_capacity,
            ..MailboxConfig::default()
        })
        .build(store)
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("ctrl-c received");
        })
        .await?;

    Ok(())
}
