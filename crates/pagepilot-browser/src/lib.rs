//! Chrome DevTools Protocol automation client.
//!
//! Drives a live page in a Chrome started with
//! `--remote-debugging-port=9222`: finds a target, attaches over one
//! WebSocket channel, runs scripts in the page, and interacts with DOM
//! elements through retry-tolerant script templates.
//!
//! # Architecture
//!
//! - [`discovery`]: queries the `/json` debugging endpoint for targets
//!   and orders them (real pages before Chrome's own DevTools pages).
//! - [`cdp`]: the correlation engine. One WebSocket channel, id-based
//!   request/response pairing across concurrent callers, per-command
//!   timeouts, clean teardown.
//! - [`script`]: the execution primitive. Wraps a script body, evaluates
//!   it remotely, unwraps the two-level result envelope.
//! - [`driver`]: element interaction. Inspect, set text, click, each a
//!   script template with local interpretation of the structured result.
//!
//! # Example (conceptual)
//!
//! ```ignore
//! use pagepilot_browser::{PageDriver, TargetDiscovery};
//!
//! let targets = TargetDiscovery::new().list_targets().await;
//! let ws_url = targets[0].web_socket_debugger_url.clone().unwrap();
//! let driver = PageDriver::connect(&ws_url).await?;
//! driver.set_text("#message-input", "hello").await?;
//! driver.click("#send-btn > span").await?;
//! driver.close().await;
//! ```

pub mod cdp;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod script;

pub use cdp::{CdpClient, ChannelState, ResponseEnvelope};
pub use discovery::{TargetDescriptor, TargetDiscovery};
pub use driver::{ElementDescriptor, InteractionOutcome, PageDriver};
pub use error::BrowserError;
