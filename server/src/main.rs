use clap::Parser;
use lockstep_relay::{AppState, Library};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fan-out relay and video library for lockstep viewers.
#[derive(Parser, Debug)]
#[command(name = "lockstep-relay", version)]
struct Args {
    /// Port to listen on
    #[arg(long, env = "LOCKSTEP_PORT", default_value_t = 3000)]
    port: u16,

    /// Directory scanned for videos
    #[arg(long, env = "LOCKSTEP_MEDIA_DIR", default_value = ".")]
    media_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockstep_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let app_state = AppState::new(Library::new(args.media_dir));

    if let Err(err) = lockstep_relay::rescan(&app_state).await {
        tracing::warn!("Initial scan failed: {}", err);
    }

    lockstep_relay::run(args.port, app_state).await
}
