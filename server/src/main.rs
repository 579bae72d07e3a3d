use clap::Parser;
use log::{error, info};
use server::coordinator::{Coordinator, CoordinatorConfig};
use server::network::Server;
use server::session::SessionHandle;
use shared::rules::BasicRules;
use shared::{FrameConfig, MatchRules, PlayerId, Team};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Simulation frames per second
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,
    /// Milliseconds between snapshot broadcasts
    #[clap(short, long, default_value = "50")]
    broadcast_ms: u64,
    /// Maximum number of connected players
    #[clap(short, long, default_value = "8")]
    max_clients: usize,
    /// Game-clock speed multiplier
    #[clap(long, default_value = "1.0")]
    clock_speed: f32,
    /// Minimum milliseconds between AI decisions, 0 for every frame
    #[clap(long, default_value = "100")]
    ai_interval_ms: u64,
    /// Position jump between broadcasts that counts as a drift snap
    #[clap(long, default_value = "6.0")]
    drift_threshold: f32,
    /// Updates the post-snap recovery hint stays up
    #[clap(long, default_value = "8")]
    post_snap_ticks: u32,
    /// Computer players added to each team at startup
    #[clap(long, default_value = "0", value_parser = clap::value_parser!(u32).range(0..=MAX_AI_PER_TEAM as i64))]
    ai_players: u32,
    /// Seconds of silence before the coordinator role moves on
    #[clap(long, default_value = "5")]
    heartbeat_timeout: u64,
}

/// A full team is five players.
const MAX_AI_PER_TEAM: u32 = 5;

/// AI ids count down from the top so they never meet client ids.
fn ai_roster(per_team: u32) -> Vec<(PlayerId, Team)> {
    (0..per_team.min(MAX_AI_PER_TEAM))
        .flat_map(|n| {
            [
                (PlayerId::MAX - 2 * n, Team::Home),
                (PlayerId::MAX - 2 * n - 1, Team::Away),
            ]
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let rules = MatchRules {
        clock_speed: args.clock_speed,
        ..MatchRules::default()
    };
    let tick_rate = args.tick_rate.max(1);
    let frame = FrameConfig {
        ai_interval_ms: args.ai_interval_ms,
        frame_delay_ms: 1000 / tick_rate as u64,
        rules: rules.clone(),
        ..FrameConfig::authority()
    };
    let config = CoordinatorConfig {
        broadcast_interval_ms: args.broadcast_ms,
        drift_threshold: args.drift_threshold,
        post_snap_recovery_ticks: args.post_snap_ticks,
        ..CoordinatorConfig::default()
    };

    let mut coordinator = Coordinator::new(config, frame, BasicRules::new().with_rules(&rules));
    for (id, team) in ai_roster(args.ai_players) {
        coordinator.add_ai_player(id, team);
    }
    coordinator.start_match();

    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / tick_rate as f64);
    let session = SessionHandle::new(args.heartbeat_timeout * 1000);

    let mut server = Server::new(&address, tick_duration, args.max_clients, coordinator, session).await?;

    info!("Running at {} Hz, broadcasting every {} ms", tick_rate, args.broadcast_ms);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
