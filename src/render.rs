//! Terminal rendering of view models
//!
//! The engine never formats output itself; it publishes [`ViewModel`]
//! snapshots. This module turns them into text for the CLI and provides a
//! [`HostBridge`] that prints popups to stderr.

use std::fmt;

use colored::Colorize;

use crate::host::{HostBridge, Popup, PopupKind};
use crate::store::Message;
use crate::view::{FeedPanel, FeedStatus, LoadState, StatsPanel, Tab, ViewModel};

/// Host that prints popups to stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleHost;

impl HostBridge for ConsoleHost {
    fn show_popup(&self, popup: Popup) {
        let title = match popup.kind {
            PopupKind::Info => popup.title.green().bold(),
            PopupKind::Error => popup.title.red().bold(),
        };
        eprintln!("{}: {}", title, popup.message);
    }
}

/// Render the header, tab bar and the panel of `tab`
pub fn render(model: &ViewModel, tab: Tab) -> String {
    Screen { model, tab }.to_string()
}

/// One rendered screen: a view model seen through one of its tabs
#[derive(Debug, Clone, Copy)]
pub struct Screen<'a> {
    pub model: &'a ViewModel,
    pub tab: Tab,
}

impl fmt::Display for Screen<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = self.model;
        let tab = self.tab;

        if let Some(header) = &model.header {
            write!(f, "{}", header.display_name.bold())?;
            if header.is_admin {
                write!(f, " {}", "[admin]".cyan())?;
            }
            if let Some(badge) = &header.badge {
                write!(f, " {}", format!("({} unanswered)", badge).yellow())?;
            }
            writeln!(f)?;
        }

        let tabs: Vec<String> = model
            .tabs
            .iter()
            .map(|t| {
                if *t == tab {
                    format!("[{}]", t.label()).bold().to_string()
                } else {
                    t.label().to_string()
                }
            })
            .collect();
        writeln!(f, "{}\n", tabs.join(" | "))?;

        match tab {
            Tab::Outbox => render_feed(f, &model.outbox, "No messages waiting for an answer")?,
            Tab::Inbox => render_feed(f, &model.inbox, "No answers yet")?,
            Tab::Stats => render_stats(f, &model.stats)?,
        }

        if model.compose.visible && tab == Tab::Outbox && !model.compose.text.is_empty() {
            let counter = if model.compose.warning {
                model.compose.counter.red().to_string()
            } else {
                model.compose.counter.dimmed().to_string()
            };
            writeln!(f, "\n> {} {}", model.compose.text, counter)?;
        }

        Ok(())
    }
}

fn render_feed(f: &mut fmt::Formatter<'_>, panel: &FeedPanel, empty: &str) -> fmt::Result {
    if panel.load == LoadState::Loading {
        return writeln!(f, "{}", "Loading...".dimmed());
    }
    if let FeedStatus::Failed(reason) = &panel.status {
        writeln!(f, "{}", format!("Could not load messages: {}", reason).red())?;
    }
    if panel.is_empty_state() {
        return writeln!(f, "{}", empty.dimmed());
    }
    for message in &panel.messages {
        render_message(f, message)?;
    }
    Ok(())
}

fn render_message(f: &mut fmt::Formatter<'_>, message: &Message) -> fmt::Result {
    let stamp = message
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    writeln!(
        f,
        "{} {} {}",
        message.reference().cyan(),
        stamp.dimmed(),
        message.text
    )?;

    if let Some(answer) = &message.answer {
        let by = answer.answered_by_name.as_deref().unwrap_or("Operator");
        writeln!(
            f,
            "    {} {} {}",
            format!("{}:", by).green(),
            answer.text,
            answer
                .answered_at
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .dimmed()
        )?;
    }
    Ok(())
}

fn render_stats(f: &mut fmt::Formatter<'_>, panel: &StatsPanel) -> fmt::Result {
    if panel.load == LoadState::Loading {
        return writeln!(f, "{}", "Loading...".dimmed());
    }
    let Some(stats) = &panel.stats else {
        let reason = match &panel.status {
            FeedStatus::Failed(reason) => reason.as_str(),
            _ => "not loaded",
        };
        return writeln!(f, "{}", format!("Statistics unavailable: {}", reason).red());
    };

    let rows = [
        ("Total messages", stats.total_messages),
        ("Messages today", stats.messages_today),
        ("Total users", stats.total_users),
        ("Active today", stats.active_users_today),
        ("Answers sent", stats.answers_sent),
        ("Bans issued", stats.bans_issued),
    ];
    for (label, value) in rows {
        writeln!(f, "{:<16} {}", label, value)?;
    }

    if !stats.top_users.is_empty() {
        writeln!(f, "\n{}", "Users".bold())?;
        for user in &stats.top_users {
            let handle = user
                .username
                .as_deref()
                .map(|u| format!(" @{}", u))
                .unwrap_or_default();
            let banned = if user.is_banned {
                " banned".red().to_string()
            } else {
                String::new()
            };
            writeln!(
                f,
                "  {}{} messages: {} unanswered: {}{}",
                user.first_name, handle, user.messages_count, user.unanswered_count, banned
            )?;
        }
    }
    Ok(())
}
