//! Error types for the pagepilot-browser crate.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the CDP client and the layers built on it.
///
/// Semantic negatives (element not found, not editable, hidden, disabled)
/// are *not* errors; they are reported through [`crate::driver::ElementDescriptor`]
/// and [`crate::driver::InteractionOutcome`] so callers can tell "the page
/// said no" apart from "the protocol broke".
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to open the WebSocket channel to a DevTools target.
    #[error("failed to connect to DevTools target at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A command was issued while the channel was not in the Connected state.
    #[error("not connected (channel state: {state})")]
    NotConnected { state: &'static str },

    /// A command received no response within its deadline. The channel
    /// stays usable; only this command is abandoned.
    #[error("command '{method}' timed out after {duration:?}")]
    Timeout { method: String, duration: Duration },

    /// The channel died (read error, unparseable frame, or remote close)
    /// while this command was in flight. Fatal for the channel.
    #[error("channel closed while awaiting response to '{method}'")]
    ChannelClosed { method: String },

    /// A local protocol-level failure on the send path (serialization,
    /// WebSocket write error).
    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    /// Remote evaluation did not yield a plain value: the envelope carried
    /// an `error`, the script threw, or the nested result shape was wrong.
    /// `raw` is the envelope as received, for diagnostics.
    #[error("script evaluation failed: {detail}")]
    Evaluation {
        detail: String,
        raw: serde_json::Value,
    },
}

impl BrowserError {
    /// True when the failure happened below the script layer (the round
    /// trip itself failed), as opposed to the remote side answering with
    /// an evaluation failure. Transport failures call for a reconnect;
    /// evaluation failures call for a different script or selector.
    pub fn is_transport(&self) -> bool {
        !matches!(self, BrowserError::Evaluation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_failures_are_not_transport() {
        let err = BrowserError::Evaluation {
            detail: "script threw".into(),
            raw: serde_json::json!({ "id": 1 }),
        };
        assert!(!err.is_transport());
    }

    #[test]
    fn channel_level_failures_are_transport() {
        let closed = BrowserError::ChannelClosed {
            method: "Runtime.evaluate".into(),
        };
        assert!(closed.is_transport());

        let timeout = BrowserError::Timeout {
            method: "Runtime.evaluate".into(),
            duration: Duration::from_secs(10),
        };
        assert!(timeout.is_transport());
    }
}
