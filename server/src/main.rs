use clap::Parser;
use log::info;
use server::catalog::InMemoryCatalog;
use server::clock::SystemClock;
use server::context::GameContext;
use server::fanout::ChannelFanout;
use server::game::GameStateMachine;
use server::network::{Server, ServerOptions};
use server::store::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Deadline poll interval in milliseconds
    #[arg(short, long, default_value = "100")]
    tick_ms: u64,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "256")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "30")]
    client_timeout_secs: u64,

    /// Seconds after the deadline during which late guesses still count
    #[arg(long, default_value = "3")]
    grace_secs: u64,

    /// Seed for challenge selection and join codes
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let (fanout, notifications) = ChannelFanout::new();
    let mut ctx = GameContext::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryCatalog::new()),
        Arc::new(fanout),
        Arc::new(SystemClock),
    )
    .with_grace_ms(args.grace_secs * 1000);
    if let Some(seed) = args.seed {
        ctx = ctx.with_seed(seed);
    }

    let seeded = ctx.catalog().ensure_seeded().await?;
    info!("Catalog ready ({} events loaded)", seeded);

    let options = ServerOptions {
        tick_duration: Duration::from_millis(args.tick_ms.max(1)),
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.client_timeout_secs),
    };
    let address = format!("{}:{}", args.host, args.port);
    let game = GameStateMachine::new(Arc::new(ctx));
    let mut server = Server::new(&address, options, game, notifications).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
