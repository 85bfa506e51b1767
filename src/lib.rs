//! Relaybox - message relay client library
//!
//! This library provides the client-side engine of a message relay: a user
//! sends messages to an operator channel and reads the answers.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Session authentication with ordered transport fallbacks
//! - `store`: Reconciled message set and its outbox/inbox views
//! - `sync`: Feed fetching and generation-ordered reconciliation
//! - `send`: Single-flight message and reply submission
//! - `view`: Tab and load state machine plus the published view model
//! - `session`: Per-session context tying the components together
//! - `api`: Backend abstraction and its HTTP implementation
//! - `host`: Popup bridge to the embedding host
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`, `commands`, `render`: Command-line front end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relaybox::host::TracingHost;
//! use relaybox::{Config, RelayClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/relaybox.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let client = RelayClient::from_config(config, Arc::new(TracingHost))?;
//!     let relay = client.connect("query_id=...&user=...&hash=...").await?;
//!     relay.sender().submit("Hello").await?;
//!     println!("{:?}", relay.view_model().outbox.messages);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod render;
pub mod send;
pub mod session;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod view;

// Re-export commonly used types
pub use auth::{Session, SessionAuthenticator};
pub use config::Config;
pub use error::{AuthError, FetchError, RelayError, Result, SendError};
pub use send::{SendOutcome, SendPipeline, SentConfirmation};
pub use session::{RelayClient, RelaySession};
pub use store::{Message, MessageStore};
pub use sync::SyncCoordinator;
pub use view::{Tab, ViewModel, ViewState};
