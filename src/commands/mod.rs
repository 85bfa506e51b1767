/*!
Command handlers for the CLI

Each handler authenticates, performs one action through the session
components and prints the resulting view model:

- `status` / `inbox` / `sent` - show a tab
- `send`  - submit a message
- `reply` - answer a pending message (admin)
- `stats` - show relay statistics (admin)
*/

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::cli::Commands;
use crate::config::Config;
use crate::error::Result;
use crate::render::{render, ConsoleHost};
use crate::send::{SendOutcome, SkipReason};
use crate::session::{RelayClient, RelaySession};
use crate::view::Tab;

/// Upper bound on waiting for diagnostic reports before the process exits
const TELEMETRY_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Authenticate and dispatch one CLI command
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `credential` - Init data from the host platform; empty if none was given
/// * `command` - Command to execute
///
/// # Errors
///
/// Fails when authentication fails, when a send or reply is rejected, or
/// when the command is not available to the session role.
pub async fn run(config: Config, credential: &str, command: Commands) -> Result<()> {
    let client = RelayClient::from_config(config, Arc::new(ConsoleHost))
        .context("Failed to initialize relay client")?;
    let relay = client
        .connect(credential)
        .await
        .context("Could not open a session")?;

    let result = dispatch(&relay, command).await;
    relay.flush_telemetry(TELEMETRY_FLUSH_TIMEOUT).await;
    result
}

async fn dispatch(relay: &RelaySession, command: Commands) -> Result<()> {
    match command {
        Commands::Status => {
            let tab = relay
                .view_model()
                .active_tab
                .unwrap_or(Tab::Outbox);
            show(relay, tab).await
        }
        Commands::Inbox => show(relay, Tab::Inbox).await,
        Commands::Sent => show(relay, Tab::Outbox).await,
        Commands::Stats => {
            if !relay.session().is_admin {
                bail!("Statistics are only available to admin sessions");
            }
            show(relay, Tab::Stats).await
        }
        Commands::Send { text } => {
            relay.sender().set_input(text);
            match relay.sender().submit_input().await? {
                SendOutcome::Skipped(SkipReason::Empty) => bail!("Message text is empty"),
                SendOutcome::Skipped(SkipReason::InFlight) => {
                    bail!("Another message is being sent")
                }
                SendOutcome::Sent(confirmation) => {
                    tracing::debug!("Confirmed {}", confirmation.reference());
                }
                SendOutcome::Replied(_) => {}
            }
            show(relay, Tab::Outbox).await
        }
        Commands::Reply { message_id, answer } => {
            if let SendOutcome::Skipped(_) = relay.sender().reply(message_id, &answer).await? {
                bail!("Answer text is empty");
            }
            show(relay, Tab::Inbox).await
        }
    }
}

async fn show(relay: &RelaySession, tab: Tab) -> Result<()> {
    relay.sync().activate_tab(tab).await;
    print!("{}", render(&relay.view_model(), tab));
    Ok(())
}
