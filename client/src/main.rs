use clap::Parser;
use client::input::parse_keys;
use client::network::{self, KeySource};
use client::reconciler::ReconcileConfig;
use log::info;
use shared::{FrameConfig, MatchRules};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Play a local match against AI with no server
    #[arg(long)]
    solo: bool,

    /// AI opponents in solo mode
    #[arg(long, default_value = "1")]
    opponents: u32,

    /// AI teammates in solo mode
    #[arg(long, default_value = "0")]
    teammates: u32,

    /// Game-clock speed multiplier in solo mode
    #[arg(long, default_value = "1.0")]
    clock_speed: f32,

    /// Share of the local error corrected per snapshot in normal play
    #[arg(long, default_value = "0.25")]
    correction: f32,

    /// Print the court to the terminal instead of logging the score
    #[arg(long)]
    draw: bool,
}

/// Reads whitespace-separated key names from stdin, one batch per line.
fn spawn_stdin_reader() -> KeySource {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            for key in parse_keys(&line) {
                if tx.send(key).await.is_err() {
                    return;
                }
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let keys = spawn_stdin_reader();
    info!("Controls: w/a/s/d move, k shoot, j pass, l shove, add ! for turbo (d!)");

    if args.solo {
        let frame = FrameConfig {
            ai_interval_ms: 100,
            rules: MatchRules {
                clock_speed: args.clock_speed,
                ..MatchRules::default()
            },
            ..FrameConfig::authority()
        };
        return network::run_solo(keys, args.draw, frame, args.teammates, args.opponents).await;
    }

    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let reconcile = ReconcileConfig {
        normal_play_strength: args.correction.clamp(0.0, 1.0),
        ..ReconcileConfig::default()
    };
    let mut client =
        network::Client::new(&args.server, args.fake_ping, args.draw, reconcile, keys).await?;

    client.run().await?;

    Ok(())
}
