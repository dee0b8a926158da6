//! wsb — chat client for the WebSocket-to-TCP bridge.
//!
//! Sends each prompt over its own connection, prints the streamed
//! responses, and optionally grades them against a reference transcript.

mod grade;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};
use wsb_client::{BridgeClient, ClientConfig};

/// Prefix the reference transcripts use for every response line.
const RESPONSE_PREFIX: &str = "> ";

/// wsb — bridge chat client
#[derive(Parser, Debug)]
#[command(name = "wsb", version, about = "Chat client for the WebSocket-to-TCP bridge")]
struct Cli {
    /// Bridge URL, e.g. ws://127.0.0.1:8080
    url: String,

    /// Prompts to send, one connection each
    #[arg(required = true)]
    messages: Vec<String>,

    /// Number of clients to run concurrently
    #[arg(short, long, default_value_t = 1)]
    clients: usize,

    /// Reference transcript to grade against (one response per line)
    #[arg(long)]
    expect: Option<PathBuf>,

    /// Seconds to wait for each response message
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the run passed (always `true` without `--expect`).
async fn run(cli: Cli) -> Result<bool> {
    let reference = cli
        .expect
        .as_deref()
        .map(grade::load_reference)
        .transpose()?;

    let config = ClientConfig {
        read_timeout: Duration::from_secs(cli.timeout),
        ..ClientConfig::default()
    };

    let sessions = (0..cli.clients.max(1)).map(|client| {
        let url = cli.url.clone();
        let messages = cli.messages.clone();
        let config = config.clone();
        async move { converse(client, &url, &messages, config).await }
    });
    let transcripts = futures_util::future::join_all(sessions)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    for (client, transcript) in transcripts.iter().enumerate() {
        for line in transcript {
            if transcripts.len() > 1 {
                println!("[client {client}] {line}");
            } else {
                println!("{line}");
            }
        }
    }

    let Some(reference) = reference else {
        return Ok(true);
    };
    let result = grade::grade(&transcripts, &reference);
    if let Some(m) = &result.mismatch {
        println!("Client {} response {}:", m.client, m.index);
        println!("Client Output:     {}", m.got.as_deref().unwrap_or("<none>"));
        println!("Reference Output:  {}", m.expected.as_deref().unwrap_or("<none>"));
    }
    println!("Final Score:       {}", result.score);
    Ok(result.passed())
}

/// One client: each prompt on a fresh connection, in order.
async fn converse(
    client: usize,
    url: &str,
    messages: &[String],
    config: ClientConfig,
) -> Result<Vec<String>> {
    let mut transcript = Vec::with_capacity(messages.len());
    for prompt in messages {
        let conn = BridgeClient::connect(url, config.clone())
            .await
            .with_context(|| format!("client {client}: cannot connect to {url}"))?;
        debug!(client, prompt = %prompt, "sending request");
        let response = conn
            .request(prompt)
            .await
            .with_context(|| format!("client {client}: request failed"))?;
        transcript.push(format!("{RESPONSE_PREFIX}{response}"));
    }
    Ok(transcript)
}
