mod player;

use anyhow::Context;
use clap::Parser;
use lockstep_core::backoff::{Backoff, RetryPolicy};
use lockstep_core::{
    CatalogClient, LocalCommand, Position, SyncConfig, Synchronizer, TransportChannel, Video,
    VideoId,
};
use player::SimulatedPlayer;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Terminal viewer that stays in step with the other viewers.
#[derive(Parser, Debug)]
#[command(name = "lockstep-cli", version)]
struct Args {
    /// Relay websocket endpoint
    #[arg(long, env = "LOCKSTEP_RELAY", default_value = "ws://127.0.0.1:3000/ws")]
    relay: Url,

    /// Catalog base URL
    #[arg(long, env = "LOCKSTEP_CATALOG", default_value = "http://127.0.0.1:3000")]
    catalog: Url,

    /// Lead time added to outgoing play messages, in milliseconds
    #[arg(long, default_value_t = 100)]
    grace_ms: u64,

    /// Video to select on startup (defaults to the first in the catalog)
    #[arg(long)]
    video: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Input {
    Command(LocalCommand),
    List,
    Scan,
    Quit,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or("");
    let arg = words.next();
    let input = match (verb, arg) {
        ("play", None) => Input::Command(LocalCommand::Play),
        ("pause", None) => Input::Command(LocalCommand::Pause),
        ("seek", Some(secs)) => {
            let position = secs
                .parse::<f64>()
                .ok()
                .and_then(Position::from_secs)
                .ok_or_else(|| format!("not a position: {secs}"))?;
            Input::Command(LocalCommand::Seek(position))
        }
        ("select", Some(id)) => {
            let id = id.parse::<u64>().map_err(|_| format!("not a video id: {id}"))?;
            Input::Command(LocalCommand::Select(VideoId(id)))
        }
        ("list", None) => Input::List,
        ("scan", None) => Input::Scan,
        ("quit" | "exit", None) => Input::Quit,
        _ => return Err(format!("unknown command: {}", line.trim())),
    };
    if words.next().is_some() {
        return Err(format!("unexpected arguments: {}", line.trim()));
    }
    Ok(input)
}

/// Hand a command to the synchronizer task. Returns `false` once the task
/// has stopped.
fn submit(commands: &mpsc::UnboundedSender<LocalCommand>, cmd: LocalCommand) -> bool {
    if commands.send(cmd).is_err() {
        warn!(?cmd, "synchronizer stopped; command not applied");
        return false;
    }
    true
}

fn print_videos(videos: &[Video]) {
    println!("--- {} videos ---", videos.len());
    for video in videos {
        println!("{:>4}  {}", video.id, video.display_name);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockstep_cli=info,lockstep_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // 1. Catalog, retried until the server answers
    let catalog = CatalogClient::new(args.catalog).context("building catalog client")?;
    let mut videos = catalog
        .videos_retrying(&RetryPolicy::default())
        .await
        .context("fetching videos")?;
    print_videos(&videos);

    // 2. Synchronizer wired to the relay
    let mut transport = TransportChannel::new(args.relay, Backoff::default());
    let frames = transport
        .inbound()
        .context("relay frames already taken")?;
    let config = SyncConfig {
        grace: Duration::from_millis(args.grace_ms),
    };
    let sync = Synchronizer::new(SimulatedPlayer::default(), transport.outbound(), config);

    let (commands, command_rx) = mpsc::unbounded_channel();
    let session = tokio::spawn(sync.run(frames, command_rx));

    let initial = args.video.map(VideoId).or_else(|| videos.first().map(|v| v.id));
    if let Some(id) = initial {
        info!(video_id = %id, "selecting initial video");
        println!("Watching video {}", id);
        if !submit(&commands, LocalCommand::Select(id)) {
            anyhow::bail!("synchronizer stopped before the initial video was selected");
        }
    } else {
        warn!("catalog is empty; use `scan` then `select <id>`");
    }

    // 3. Local intents from stdin
    println!("Commands: list | scan | select <id> | play | pause | seek <secs> | quit");
    let scan_policy = RetryPolicy {
        max_attempts: Some(3),
        ..Default::default()
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_input(&line) {
            Ok(Input::Command(cmd)) => {
                if !submit(&commands, cmd) {
                    break;
                }
            }
            Ok(Input::List) => print_videos(&videos),
            Ok(Input::Scan) => match catalog.scan_retrying(&scan_policy).await {
                Ok(found) => {
                    videos = found;
                    print_videos(&videos);
                }
                Err(err) => warn!(error = %err, "scan failed"),
            },
            Ok(Input::Quit) => {
                info!("quitting");
                break;
            }
            Err(err) => println!("{err}"),
        }
    }

    drop(commands);
    session.await.context("synchronizer task failed")?;
    transport.shutdown().await;
    Ok(())
}
