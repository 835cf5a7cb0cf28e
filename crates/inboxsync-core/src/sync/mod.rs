//! Inbox synchronization layer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncScheduler (polls while push is unavailable)                │
//! │  └── every interval ──▶ SyncOrchestrator::request_sync          │
//! │                                                                 │
//! │  SyncOrchestrator (one pass at a time)                          │
//! │  ├── lists syncable inboxes from the InboxStore                 │
//! │  ├── runs one InboxPipeline per inbox, concurrently             │
//! │  └── emits SyncEvents                                           │
//! │                                                                 │
//! │  InboxPipeline (per inbox)                                      │
//! │  └── challenge → sign → pull → decrypt → merge → delete-ack     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = Arc::new(SyncOrchestrator::new(crypto, remote, store, &config));
//! let mut events = orchestrator.subscribe();
//!
//! let scheduler = Arc::new(SyncScheduler::new(orchestrator.clone(), &config));
//! scheduler.start(false);
//!
//! while let Ok(event) = events.recv().await {
//!     if let SyncEvent::ChatDeleted { public_key } = event {
//!         println!("chat {} was deleted", public_key);
//!     }
//! }
//! ```

mod events;
mod orchestrator;
mod pipeline;
mod scheduler;

pub use events::{SyncEvent, SyncReport};
pub use orchestrator::SyncOrchestrator;
pub use pipeline::{InboxPipeline, SyncedInbox};
pub use scheduler::{SchedulerState, SyncScheduler};
