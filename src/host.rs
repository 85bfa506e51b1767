//! Host environment bridge
//!
//! The embedding host (a chat client's web view, a terminal, a test
//! harness) owns popups. The sync engine only asks for them through
//! [`HostBridge`].

use serde::Serialize;

/// Severity of a popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupKind {
    Info,
    Error,
}

/// A transient notification shown by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Popup {
    pub title: String,
    pub message: String,
    pub kind: PopupKind,
}

impl Popup {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind: PopupKind::Info,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            message: message.into(),
            kind: PopupKind::Error,
        }
    }
}

/// Capabilities the embedding host offers to the engine
#[cfg_attr(test, mockall::automock)]
pub trait HostBridge: Send + Sync + std::fmt::Debug {
    /// Show a popup; must not block
    fn show_popup(&self, popup: Popup);
}

/// Host that only writes popups to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHost;

impl HostBridge for TracingHost {
    fn show_popup(&self, popup: Popup) {
        match popup.kind {
            PopupKind::Info => tracing::info!("{}: {}", popup.title, popup.message),
            PopupKind::Error => tracing::warn!("{}: {}", popup.title, popup.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popup_constructors() {
        let info = Popup::info("Sent", "Message #1 sent!");
        assert_eq!(info.kind, PopupKind::Info);
        assert_eq!(info.title, "Sent");

        let err = Popup::error("Failed to send message");
        assert_eq!(err.kind, PopupKind::Error);
        assert_eq!(err.title, "Error");
    }

    #[test]
    fn test_mock_host_records_popup() {
        let mut host = MockHostBridge::new();
        host.expect_show_popup()
            .withf(|p| p.message == "hello")
            .times(1)
            .return_const(());
        host.show_popup(Popup::info("Note", "hello"));
    }
}
