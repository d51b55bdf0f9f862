//! DevTools target discovery via the local debugging HTTP endpoint.
//!
//! Chrome started with `--remote-debugging-port=9222` serves a JSON array
//! of controllable targets at `http://127.0.0.1:9222/json`. Each entry
//! carries the WebSocket URL a [`crate::cdp::CdpClient`] can attach to.
//!
//! Discovery never raises: any failure (endpoint unreachable, non-2xx,
//! bad JSON) degrades to an empty list plus a logged diagnostic, and the
//! caller decides what to do about having no targets.

use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

/// Default debugging endpoint for a locally launched Chrome.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9222";

/// One controllable target as described by the `/json` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub target_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

impl TargetDescriptor {
    /// An ordinary page target: `type == "page"` and not one of Chrome's
    /// own DevTools UI pages.
    pub fn is_ordinary_page(&self) -> bool {
        self.target_type == "page" && !self.url.starts_with("devtools://")
    }
}

/// Queries the debugging endpoint for controllable targets.
pub struct TargetDiscovery {
    client: Client,
    base_url: String,
}

impl TargetDiscovery {
    /// Discovery against the default local endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_ENDPOINT)
    }

    /// Discovery against an explicit endpoint (for non-default ports and
    /// for testing with a mock server).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch and order the available targets.
    ///
    /// Only ordinary page targets are returned when any exist; the
    /// Chrome-internal pages are the fallback when nothing else is
    /// available, so the caller can still attach to *something*. All
    /// failures yield an empty list.
    pub async fn list_targets(&self) -> Vec<TargetDescriptor> {
        let url = format!("{}/json", self.base_url);

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, url = %url, "target discovery request failed");
                return Vec::new();
            }
        };

        if !resp.status().is_success() {
            warn!(status = %resp.status(), url = %url, "target discovery returned non-success status");
            return Vec::new();
        }

        let targets: Vec<TargetDescriptor> = match resp.json().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "target discovery returned unparseable JSON");
                return Vec::new();
            }
        };

        let ordered = order_targets(targets);
        for (i, t) in ordered.iter().enumerate() {
            info!(
                index = i,
                title = %t.title,
                target_type = %t.target_type,
                url = %t.url,
                "discovered target"
            );
        }
        ordered
    }
}

impl Default for TargetDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the preferred targets: ordinary pages when any exist, internal
/// pages only as a fallback. Non-page targets (service workers,
/// extensions) are dropped.
pub fn order_targets(targets: Vec<TargetDescriptor>) -> Vec<TargetDescriptor> {
    let (ordinary, internal): (Vec<_>, Vec<_>) = targets
        .into_iter()
        .filter(|t| t.target_type == "page")
        .partition(TargetDescriptor::is_ordinary_page);

    if ordinary.is_empty() {
        internal
    } else {
        ordinary
    }
}
