use clap::Parser;
use client::input::HELP;
use client::network::{Client, Intent};
use log::info;
use shared::{GameLength, GuessTime, ScoringMode, SessionConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name in the session
    #[arg(short = 'n', long)]
    name: String,

    /// Join code of the session to join
    #[arg(short = 'c', long, conflicts_with = "create")]
    code: Option<String>,

    /// Host a new session instead of joining one
    #[arg(long)]
    create: bool,

    /// Scoring mode for a new session (high_score, closest_wins)
    #[arg(long, default_value = "high_score")]
    mode: ScoringMode,

    /// Game length for a new session (short, medium, long)
    #[arg(long, default_value = "medium")]
    length: GameLength,

    /// Seconds per guessing round (15, 20 or 30)
    #[arg(long, default_value = "15")]
    guess_time: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let intent = match (args.code, args.create) {
        (Some(code), _) => Intent::Join {
            code,
            name: args.name,
        },
        (None, true) => {
            let guess_time = GuessTime::try_from(args.guess_time)?;
            Intent::Create {
                name: args.name,
                config: SessionConfig::preset(args.mode, args.length, guess_time),
            }
        }
        (None, false) => return Err("pass --code <CODE> to join or --create to host".into()),
    };

    info!("Starting client...");
    println!("{}", HELP);

    let mut client = Client::new(&args.server, intent).await?;
    client.run().await?;

    Ok(())
}
