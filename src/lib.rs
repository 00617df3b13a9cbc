//! siteherd: a lifecycle supervisor for local website dev servers.
//!
//! Manages N independent website server processes: allocates each one a free
//! local port, starts it with retry and timeout guards, tracks its state
//! machine (`Stopped → Starting → Running → Stopping → Stopped`, with `Error`
//! reachable from any live state), and broadcasts lifecycle events to
//! subscribers.
//!
//! The entry point is [`Supervisor`], built over any [`ProcessHost`]
//! implementation. The crate ships [`CommandHost`], which runs one
//! configurable shell command per site; tests substitute mock hosts.
//!
//! # Example
//!
//! ```no_run
//! use siteherd::{CommandHost, EventBus, Supervisor};
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> siteherd::Result<()> {
//! let events = EventBus::default();
//! let host = Arc::new(CommandHost::new(
//!     "python3 -m http.server \"$PORT\"".to_string(),
//!     Duration::from_secs(5),
//!     events.clone(),
//! ));
//! let supervisor = Supervisor::builder(host).event_bus(events).build();
//!
//! let info = supervisor.start_server("blog", Path::new("/srv/sites/blog")).await?;
//! println!("blog running at {}", info.url.unwrap());
//! supervisor.stop_all_servers().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Cancellation
//!
//! Start and stop attempts are bounded by hard deadlines. A timed-out start
//! drops the in-process future but does not kill a child process the host
//! already spawned; such orphans are reaped by a later stop of the same
//! server or by [`Supervisor::cleanup_orphaned_servers`].

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod port;
pub mod retry;
pub mod state;
pub mod supervisor;
pub mod timeout;

pub use config::{Config, Settings, SiteConfig};
pub use error::{Error, Result};
pub use events::{EventBus, LogLevel, ServerEvent};
pub use host::{CommandHost, ProcessHandle, ProcessHost};
pub use port::PortAllocator;
pub use retry::RetryPolicy;
pub use state::{ServerInfo, ServerState};
pub use supervisor::{Supervisor, SupervisorBuilder};
