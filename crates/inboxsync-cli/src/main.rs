//! Inbox Sync CLI
//!
//! Thin wrapper around inboxsync-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Create an inbox for an offer (a fresh offer id if none is given)
//! inboxsync inbox create --offer 01HQ3K9Y2M4X5Z6A7B8C9D0E1F
//!
//! # Create the personal inbox
//! inboxsync inbox create --personal
//!
//! # List inboxes
//! inboxsync inbox list
//!
//! # Show the messages stored for an inbox
//! inboxsync messages <public_key>
//!
//! # Run one sync pass against a server
//! inboxsync sync --server https://chat.example.com/api/v1
//!
//! # Keep polling until interrupted
//! inboxsync serve --server https://chat.example.com/api/v1 --interval-secs 10
//! ```

mod remote_http;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use inboxsync_core::{
    Inbox, InboxOwner, LocalCrypto, MemoryRemote, MessagePayload, OfferId, RemoteInbox, Storage,
    SyncConfig, SyncEvent, SyncOrchestrator, SyncScheduler,
};
use tokio::sync::broadcast::error::RecvError;

use remote_http::{HttpRemoteInbox, DEFAULT_TIMEOUT};

/// Inbox Sync - encrypted mailbox synchronization
#[derive(Parser)]
#[command(name = "inboxsync")]
#[command(version = "0.1.0")]
#[command(about = "Inbox Sync - encrypted mailbox synchronization")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.inboxsync/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inbox management
    Inbox {
        #[command(subcommand)]
        action: InboxAction,
    },

    /// Show the messages stored for an inbox
    Messages {
        /// Inbox public key
        public_key: String,
    },

    /// Run a single sync pass
    Sync {
        /// Base URL of the inbox service (offline check if omitted)
        #[arg(short, long)]
        server: Option<String>,

        /// Only sync this inbox
        #[arg(short, long)]
        inbox: Option<String>,
    },

    /// Keep inboxes in sync until interrupted
    Serve {
        /// Base URL of the inbox service
        #[arg(short, long)]
        server: String,

        /// Push notifications are registered, so don't poll
        #[arg(long)]
        push_registered: bool,

        /// Seconds between polls
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
    },
}

#[derive(Subcommand)]
enum InboxAction {
    /// Create a new inbox with fresh keys
    Create {
        /// Offer the inbox belongs to
        #[arg(long, conflicts_with = "personal")]
        offer: Option<String>,

        /// Create the personal inbox instead of an offer inbox
        #[arg(long)]
        personal: bool,
    },

    /// List all inboxes
    List,

    /// Delete an inbox and its messages
    Delete {
        /// Inbox public key
        public_key: String,
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
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory (~/.inboxsync/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".inboxsync")
        .join("data")
}

fn owner_label(owner: &InboxOwner) -> String {
    match owner {
        InboxOwner::Offer(offer_id) => format!("offer {}", offer_id),
        InboxOwner::Profile => "personal".to_string(),
    }
}

fn format_time(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_message(message: &MessagePayload) {
    let direction = if message.is_contact { "<-" } else { "->" };
    let body = message
        .text
        .as_deref()
        .or(message.image.as_ref().map(|_| "[image]"))
        .unwrap_or("");
    println!(
        "  {} {} [{}] {}",
        format_time(message.time),
        direction,
        message.message_type,
        body
    );
}

fn build_orchestrator(
    storage: Arc<Storage>,
    server: Option<&str>,
    config: &SyncConfig,
) -> Result<Arc<SyncOrchestrator>> {
    let remote: Arc<dyn RemoteInbox> = match server {
        Some(url) => Arc::new(HttpRemoteInbox::new(url, DEFAULT_TIMEOUT)?),
        None => Arc::new(MemoryRemote::new()),
    };
    Ok(Arc::new(SyncOrchestrator::new(
        Arc::new(LocalCrypto::new()),
        remote,
        storage,
        config,
    )))
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::SyncFinished(report) => println!("Sync finished: {}", report),
        SyncEvent::ChatDeleted { public_key } => println!("Chat deleted: {}", public_key),
        SyncEvent::InboxSynced { public_key, merged } if *merged > 0 => {
            println!("{}: {} new message(s)", public_key, merged)
        }
        SyncEvent::InboxSynced { .. } => {}
        SyncEvent::InboxFailed {
            public_key,
            message,
            ..
        } => eprintln!("{}: {}", public_key, message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let storage = Arc::new(
        Storage::open_dir(&data_dir)
            .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?,
    );

    match cli.command {
        Commands::Inbox { action } => match action {
            InboxAction::Create { offer, personal } => {
                let inbox = if personal {
                    if storage.list_inboxes()?.iter().any(Inbox::is_personal) {
                        bail!("A personal inbox already exists");
                    }
                    Inbox::personal()
                } else {
                    let offer_id = match offer {
                        Some(s) => OfferId::from_string(&s)
                            .with_context(|| format!("Invalid offer id: {}", s))?,
                        None => OfferId::new(),
                    };
                    Inbox::for_offer(offer_id)
                };
                storage.save_inbox(&inbox)?;

                println!("Created inbox");
                println!("  Public key: {}", inbox.public_key);
                println!("  Owner: {}", owner_label(&inbox.owner));
            }

            InboxAction::List => {
                let inboxes = storage.list_inboxes()?;
                if inboxes.is_empty() {
                    println!("No inboxes found.");
                    println!();
                    println!("Create one with: inboxsync inbox create");
                } else {
                    println!("Inboxes ({}):", inboxes.len());
                    for inbox in inboxes {
                        let mut flags = String::new();
                        if inbox.keys.is_none() {
                            flags.push_str(" (no keys)");
                        }
                        if inbox.awaiting_registration {
                            flags.push_str(" (awaiting registration)");
                        }
                        println!(
                            "  {}  {}{}",
                            inbox.public_key,
                            owner_label(&inbox.owner),
                            flags
                        );
                    }
                }
            }

            InboxAction::Delete { public_key } => {
                if storage.load_inbox(&public_key)?.is_none() {
                    bail!("Inbox not found: {}", public_key);
                }
                storage.delete_inbox(&public_key)?;
                println!("Deleted inbox {}", public_key);
            }
        },

        Commands::Messages { public_key } => {
            if storage.load_inbox(&public_key)?.is_none() {
                bail!("Inbox not found: {}", public_key);
            }
            let messages = storage.list_messages(&public_key)?;
            if messages.is_empty() {
                println!("No messages.");
            } else {
                println!("Messages ({}):", messages.len());
                for message in &messages {
                    print_message(message);
                }
            }
        }

        Commands::Sync { server, inbox } => {
            if server.is_none() {
                println!("No server given, running offline check");
            }
            let orchestrator =
                build_orchestrator(storage, server.as_deref(), &SyncConfig::default())?;

            match inbox {
                Some(public_key) => {
                    let synced = orchestrator.sync_one(&public_key).await?;
                    if synced.did_delete_chat() {
                        println!("Chat deleted: {}", public_key);
                    }
                    println!(
                        "Synced {}: {} new message(s)",
                        public_key,
                        synced.payloads.len()
                    );
                }
                None => {
                    let mut events = orchestrator.subscribe();
                    let report = orchestrator.sync_all().await;
                    while let Ok(event) = events.try_recv() {
                        if !matches!(event, SyncEvent::SyncFinished(_)) {
                            print_event(&event);
                        }
                    }
                    println!("Sync finished: {}", report);
                    if report.failed > 0 {
                        bail!("{} inbox(es) failed to sync", report.failed);
                    }
                }
            }
        }

        Commands::Serve {
            server,
            push_registered,
            interval_secs,
        } => {
            if interval_secs == 0 {
                bail!("--interval-secs must be at least 1");
            }
            let config =
                SyncConfig::default().with_poll_interval(Duration::from_secs(interval_secs));
            let orchestrator = build_orchestrator(storage, Some(&server), &config)?;
            let scheduler = Arc::new(SyncScheduler::new(orchestrator.clone(), &config));
            let mut events = orchestrator.subscribe();

            println!("Serving inboxes from {}", server);
            if push_registered {
                println!("Push registered, polling disabled");
            } else {
                println!("Polling every {}s", interval_secs);
            }
            println!("Press Ctrl+C to stop");

            scheduler.start(push_registered);
            let first_pass = {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move { orchestrator.request_sync().await })
            };

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => print_event(&event),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Event stream lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        println!();
                        println!("Shutting down...");
                        break;
                    }
                }
            }
            scheduler.stop();
            first_pass.abort();
        }
    }

    Ok(())
}
