//! pagepilot -- drive a live Chrome page over the DevTools protocol.
//!
//! Orchestrates the core library: discover a target (or take an explicit
//! WebSocket URL), connect, run one interaction or the type-then-click
//! demo sequence, and disconnect.

use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pagepilot_browser::{BrowserError, PageDriver, TargetDiscovery};

#[derive(Parser, Debug)]
#[command(name = "pagepilot", version, about)]
struct Cli {
    /// Explicit WebSocket debugger URL (skips discovery)
    #[arg(long, global = true)]
    url: Option<String>,

    /// DevTools debugging port for target discovery
    #[arg(long, global = true, default_value_t = 9222)]
    port: u16,

    /// Per-command response deadline in seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List discovered targets in preference order
    Targets,

    /// Locate an element and print what the page says about it
    Inspect {
        /// CSS selector, or a document.querySelector("...") js-path
        #[arg(long)]
        selector: String,
    },

    /// Set text on an editable element
    Type {
        #[arg(long)]
        selector: String,

        #[arg(long)]
        text: String,
    },

    /// Click an element
    Click {
        #[arg(long)]
        selector: String,
    },

    /// Type into an input, pause, then click a submit button
    Send {
        #[arg(long)]
        input_selector: String,

        #[arg(long)]
        button_selector: String,

        #[arg(long)]
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=pagepilot_browser=debug
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let discovery = TargetDiscovery::with_base_url(&format!("http://127.0.0.1:{}", cli.port));

    if let Commands::Targets = cli.command {
        let targets = discovery.list_targets().await;
        if targets.is_empty() {
            bail!("no debuggable targets found; is Chrome running with --remote-debugging-port={}?", cli.port);
        }
        for (i, t) in targets.iter().enumerate() {
            println!("{i}: {} [{}] {}", t.title, t.target_type, t.url);
        }
        return Ok(());
    }

    let ws_url = match &cli.url {
        Some(url) => url.clone(),
        None => {
            let targets = discovery.list_targets().await;
            let Some(target) = targets.first() else {
                bail!("no debuggable targets found; is Chrome running with --remote-debugging-port={}?", cli.port);
            };
            println!("connecting to: {} - {}", target.title, target.url);
            match &target.web_socket_debugger_url {
                Some(url) => url.clone(),
                None => bail!("target '{}' has no WebSocket debugger URL", target.title),
            }
        }
    };

    let driver = PageDriver::connect(&ws_url)
        .await?
        .with_timeout(Duration::from_secs(cli.timeout_secs));

    let result = run(&driver, &cli.command).await;
    driver.close().await;

    // Point at the right remedy: a dead round trip means reconnect, a
    // remote evaluation failure means fix the script or selector.
    if let Err(e) = &result {
        if let Some(err) = e.downcast_ref::<BrowserError>() {
            if err.is_transport() {
                eprintln!("hint: the channel round trip failed; reconnect and retry");
            } else {
                eprintln!("hint: the page rejected the script; check the selector");
            }
        }
    }
    result
}

async fn run(driver: &PageDriver, command: &Commands) -> anyhow::Result<()> {
    match command {
        Commands::Targets => unreachable!("handled before connecting"),

        Commands::Inspect { selector } => {
            let descriptor = driver.inspect(selector).await?;
            if !descriptor.found {
                match descriptor.error {
                    Some(error) => bail!("inspection script failed: {error}"),
                    None => bail!("no element matches selector"),
                }
            }
            println!("tag:      {}", descriptor.tag_name.as_deref().unwrap_or(""));
            println!("id:       {}", descriptor.id.as_deref().unwrap_or(""));
            println!("class:    {}", descriptor.class_name.as_deref().unwrap_or(""));
            println!("visible:  {}", descriptor.is_visible);
            println!("editable: {}", descriptor.is_content_editable);
            println!("disabled: {}", descriptor.is_disabled);
            println!("button:   {}", descriptor.is_button);
            println!("html:     {}", descriptor.inner_html.as_deref().unwrap_or(""));
            Ok(())
        }

        Commands::Type { selector, text } => {
            let outcome = driver.set_text(selector, text).await?;
            if !outcome.success {
                bail!("set text failed: {}", outcome.error.as_deref().unwrap_or("unknown"));
            }
            println!("text set; page content now contains the payload: {}",
                outcome.detail["match"].as_bool().unwrap_or(false));
            Ok(())
        }

        Commands::Click { selector } => {
            let outcome = driver.click(selector).await?;
            if !outcome.success {
                bail!("click failed: {}", outcome.error.as_deref().unwrap_or("unknown"));
            }
            println!("clicked {}", outcome.detail["elementInfo"]["tagName"].as_str().unwrap_or("element"));
            Ok(())
        }

        Commands::Send {
            input_selector,
            button_selector,
            text,
        } => {
            let typed = driver.set_text(input_selector, text).await?;
            if !typed.success {
                bail!("set text failed: {}", typed.error.as_deref().unwrap_or("unknown"));
            }

            // Give the page a beat to react to the input events before
            // submitting.
            tokio::time::sleep(Duration::from_secs(1)).await;

            let clicked = driver.click(button_selector).await?;
            if !clicked.success {
                bail!("click failed: {}", clicked.error.as_deref().unwrap_or("unknown"));
            }
            println!("sent");
            Ok(())
        }
    }
}
