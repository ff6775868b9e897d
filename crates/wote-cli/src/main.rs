//! wote CLI
//!
//! Thin wrapper around wote-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Create a new topic (generates the admin private key)
//! wote create
//!
//! # Resume an admin session with an existing private key
//! wote admin <private_key_hex>
//!
//! # Post a message with the shared content secret
//! wote post <secret_hex> "hello"
//!
//! # Vote for a post
//! wote vote <secret_hex> <id>
//!
//! # Remove a post
//! wote remove <secret_hex> <id>
//! ```
//!
//! `create` and `admin` keep running, printing the board as events arrive,
//! until interrupted. The other commands publish one event and exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use wote_core::{
    cast_vote, post_message, remove_post, AdminSession, BoardEvent, GossipConfig,
    GossipTransport, Identity, Topic, Transport,
};

/// How long one-shot commands wait for a gossip neighbor before publishing
const NEIGHBOR_WAIT: Duration = Duration::from_secs(10);

/// wote - P2P posting and voting
#[derive(Parser)]
#[command(name = "wote")]
#[command(version = "0.1.0")]
#[command(about = "wote - P2P posting and voting")]
#[command(
    long_about = "A peer-to-peer posting and voting application. Topics are derived from an \
                  admin's private key; anyone holding the shared content secret can post, \
                  vote, and remove."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.wote/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Bootstrap peer endpoint id (hex), repeatable
    #[arg(short, long, global = true)]
    peer: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new topic and run the admin session
    Create {
        /// Optional private key (hex); generated when absent
        private_key: Option<String>,
    },

    /// Run an admin session for an existing private key
    Admin {
        /// The admin private key (hex)
        private_key: String,
    },

    /// Post a message to a topic
    Post {
        /// The shared content secret (hex)
        secret: String,
        /// The message text
        message: String,
    },

    /// Vote for a post
    Vote {
        /// The shared content secret (hex)
        secret: String,
        /// Identifier of the post
        id: String,
    },

    /// Remove a post
    Remove {
        /// The shared content secret (hex)
        secret: String,
        /// Identifier of the post
        id: String,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.wote/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wote")
        .join("data")
}

/// Parse a peer endpoint id from hex string
fn parse_endpoint_id(s: &str) -> Result<iroh::EndpointId> {
    let bytes = hex::decode(s).map_err(|e| anyhow::anyhow!("Invalid hex format: {}", e))?;
    if bytes.len() != 32 {
        anyhow::bail!("Endpoint ID must be 32 bytes (got {})", bytes.len());
    }
    let mut array = [0u8; 32];
    array.copy_from_slice(&bytes);
    iroh::PublicKey::from_bytes(&array).map_err(|e| anyhow::anyhow!("Invalid public key: {}", e))
}

async fn connect(cli_data_dir: Option<PathBuf>, peers: &[String]) -> Result<GossipTransport> {
    let data_dir = cli_data_dir.unwrap_or_else(default_data_dir);

    let mut config = GossipConfig::new(data_dir);
    for peer in peers {
        config.bootstrap.push(parse_endpoint_id(peer)?);
    }

    Ok(GossipTransport::connect(config).await?)
}

fn print_identity(identity: &Identity) {
    println!("Identity:");
    println!("  private key:    {}", identity.private_key_hex());
    println!("  public key:     {}", identity.public_key_hex());
    println!(
        "  content secret: {}  (share this with participants)",
        identity.content_secret_hex()
    );
    println!("  content topic:  {}", identity.content_topic());
    println!("  admin secret:   {}", identity.admin_secret_hex());
    println!("  admin topic:    {}", identity.admin_topic());
}

fn print_board(session: &AdminSession) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&session.board())?);
    Ok(())
}

/// Run an admin session until Ctrl-C, printing the board as events arrive.
async fn run_admin(transport: Arc<GossipTransport>, private_key_hex: Option<&str>) -> Result<()> {
    let core_transport: Arc<dyn Transport> = transport.clone();
    let session = AdminSession::create(core_transport, private_key_hex).await?;

    print_identity(session.identity());
    println!();
    println!("Node:");
    println!("  endpoint id: {}", hex::encode(transport.endpoint_id().as_bytes()));
    println!();
    println!("Board (Ctrl-C to exit):");
    print_board(&session)?;

    let mut events = session.subscribe_events();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Shutting down");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(BoardEvent::Message { id, .. }) => {
                        println!("message {}", id);
                        print_board(&session)?;
                    }
                    Ok(BoardEvent::Dropped { reason }) => {
                        eprintln!("dropped undecodable message: {}", reason);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    session.unsubscribe();
    Ok(())
}

/// Wait briefly for a gossip neighbor so a one-shot publish has somewhere
/// to go. Without peers the event still lands in the local history log.
async fn await_swarm(transport: &GossipTransport, secret_hex: &str, have_peers: bool) -> Result<()> {
    let topic = Topic::from_secret_hex(secret_hex)?;
    if have_peers && !transport.wait_for_neighbor(&topic, NEIGHBOR_WAIT).await? {
        eprintln!("warning: no gossip neighbor found; event stored locally only");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Create { private_key } => {
            // Validate key material before touching the network
            let identity = match private_key.as_deref() {
                Some(hex_key) => Identity::from_hex(hex_key)?,
                None => Identity::generate(),
            };
            let transport = Arc::new(connect(cli.data_dir, &cli.peer).await?);
            let key = identity.private_key_hex();
            run_admin(transport, Some(key.as_str())).await?;
        }

        Commands::Admin { private_key } => {
            Identity::from_hex(&private_key)?;
            let transport = Arc::new(connect(cli.data_dir, &cli.peer).await?);
            run_admin(transport, Some(private_key.as_str())).await?;
        }

        Commands::Post { secret, message } => {
            Topic::from_secret_hex(&secret)?;
            let transport = connect(cli.data_dir, &cli.peer).await?;
            await_swarm(&transport, &secret, !cli.peer.is_empty()).await?;
            let id = post_message(&transport, &secret, &message).await?;
            println!("posted {}", id);
            transport.shutdown().await?;
        }

        Commands::Vote { secret, id } => {
            Topic::from_secret_hex(&secret)?;
            let transport = connect(cli.data_dir, &cli.peer).await?;
            await_swarm(&transport, &secret, !cli.peer.is_empty()).await?;
            cast_vote(&transport, &secret, &id).await?;
            println!("voted for {}", id);
            transport.shutdown().await?;
        }

        Commands::Remove { secret, id } => {
            Topic::from_secret_hex(&secret)?;
            let transport = connect(cli.data_dir, &cli.peer).await?;
            await_swarm(&transport, &secret, !cli.peer.is_empty()).await?;
            remove_post(&transport, &secret, &id).await?;
            println!("removed {}", id);
            transport.shutdown().await?;
        }
    }

    Ok(())
}
