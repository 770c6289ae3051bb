//! Command-line client for exercising a running relay by hand.
//!
//! Run with: cargo run -p relay-client -- --endpoint http://localhost:3000/api/mcp
//!
//! Opens the event stream, posts one message once the stream is up, and logs
//! the events that come back.

use std::{
    collections::HashSet,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use reqwest::{
    Url,
    header::{ACCEPT, USER_AGENT},
};
use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Parser, Debug)]
#[command(name = "relay-client")]
#[command(about = "Open a relay event stream and send a message through it")]
struct Args {
    /// Relay endpoint (e.g. https://example.com/api/mcp).
    #[arg(short, long)]
    endpoint: String,

    /// Client identifier. Generated when omitted.
    #[arg(short, long)]
    client: Option<String>,

    /// JSON message to send after connecting. Defaults to a minimal
    /// JSON-RPC initialize request.
    #[arg(short, long)]
    message: Option<String>,

    /// Close the stream after this many milliseconds.
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    duration: Option<u64>,

    /// Comma-separated list of additional event names to log.
    #[arg(short = 'E', long, value_delimiter = ',')]
    events: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let client_id = args
        .client
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let endpoint = Url::parse(&args.endpoint).context("Invalid endpoint URL")?;
    let stream_url = with_client_id(endpoint.clone(), &client_id);
    let message = read_message_payload(args.message.as_deref())?;
    let watched = watched_events(&args.events);

    info!("[SSE] Connecting to {stream_url}");

    let http = reqwest::Client::new();
    let response = http
        .get(stream_url)
        .header(USER_AGENT, "chat-relay-sample-client")
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .context("Failed to open event stream")?
        .error_for_status()
        .context("Event stream rejected")?;
    info!("[SSE] Connection established");

    let post = tokio::spawn(send_message(http, endpoint, client_id, message));

    let listening = listen(response, watched);
    match args.duration {
        Some(ms) => {
            if tokio::time::timeout(Duration::from_millis(ms), listening).await.is_err() {
                info!("[SSE] Closing after {ms}ms");
            }
        }
        None => listening.await,
    }

    if post.is_finished() {
        post.await.context("Message task panicked")??;
    } else {
        post.abort();
    }
    Ok(())
}

/// Set `client_id` on the endpoint, replacing any existing value.
fn with_client_id(mut url: Url, client_id: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "client_id")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("client_id", client_id);
    url
}

fn read_message_payload(raw: Option<&str>) -> anyhow::Result<Value> {
    let Some(raw) = raw else {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        return Ok(json!({
            "jsonrpc": "2.0",
            "id": format!("initialize-{millis}"),
            "method": "initialize",
            "params": {"capabilities": {}},
        }));
    };
    serde_json::from_str(raw).context("Provided message is not valid JSON")
}

fn watched_events(extra: &[String]) -> HashSet<String> {
    ["ready", "message"]
        .into_iter()
        .map(String::from)
        .chain(
            extra
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
        )
        .collect()
}

async fn send_message(
    http: reqwest::Client,
    endpoint: Url,
    client_id: String,
    message: Value,
) -> anyhow::Result<()> {
    info!(
        "[POST] Sending message: {}",
        serde_json::to_string_pretty(&message)?
    );
    let response = http
        .post(endpoint)
        .header(SESSION_HEADER, &client_id)
        .json(&json!({ "message": message }))
        .send()
        .await
        .context("POST failed")?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        error!("[POST] Error sending message: status {status}: {text}");
        anyhow::bail!("POST failed with status {status}: {text}");
    }

    let result: Value = response.json().await.unwrap_or_else(|_| json!({}));
    info!("[POST] Response: {result}");
    Ok(())
}

async fn listen(response: reqwest::Response, watched: HashSet<String>) {
    let mut parser = FrameParser::default();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("[SSE] Error: {e}");
                return;
            }
        };
        for frame in parser.push(&chunk) {
            if !watched.contains(&frame.event) {
                continue;
            }
            let data = serde_json::from_str::<Value>(&frame.data)
                .unwrap_or_else(|_| Value::String(frame.data.clone()));
            info!("[SSE] Event \"{}\": {data}", frame.event);
        }
    }
    info!("[SSE] Stream closed by server");
}

/// One parsed event-stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    event: String,
    data: String,
}

/// Incremental parser for `text/event-stream` bodies.
///
/// Bytes are buffered until a block is complete, so characters split across
/// chunks decode intact.
#[derive(Debug, Default)]
struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    /// Feed a chunk and return the frames it completed.
    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = Self::parse_block(&String::from_utf8_lossy(&block)) {
                frames.push(frame);
            }
        }
        frames
    }

    fn parse_block(block: &str) -> Option<Frame> {
        let mut event = None;
        let mut data: Vec<&str> = Vec::new();
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(Frame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: data.join("\n"),
        })
    }
}
