//! tabkeeper bridge — runs the policy engine against a browser over stdin/stdout.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//!
//! Browser → engine:
//!   event:    {"event":{"type":"tabCreated","tab":{...}}}
//!   message:  {"id":1, "message":"setWindowLabel", "params":{"windowId":3,"label":"Work"}}
//!   reply:    {"reply":7, "result":{...}} or {"reply":7, "error":...}
//!
//! Engine → browser:
//!   call:     {"call":7, "method":"tabs.get", "params":{"tabId":3}}
//!   response: {"id":1, "result":{...}}
//!
//! Logs go to stderr.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;

use tabkeeper::config::EngineConfig;
use tabkeeper::database::Database;
use tabkeeper::engine::PolicyEngine;
use tabkeeper::logging::init_logging;
use tabkeeper::rpc_handler::{handle_message, respond};
use tabkeeper::services::settings_store::{MemorySettingsStore, SettingsStore, SqliteSettingsStore};
use tabkeeper::services::stdio_host::StdioTabHost;
use tabkeeper::types::event::TabEvent;

/// Simple rate limiter for inbound messages: max requests per second.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            window_start: Instant::now(),
            request_count: 0,
            max_per_second,
        }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    fn check(&mut self) -> bool {
        if self.window_start.elapsed() >= Duration::from_secs(1) {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

fn open_store(config: &EngineConfig) -> Arc<dyn SettingsStore> {
    let path = config.database_path();
    let opened = std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| e.to_string())
        .and_then(|_| Database::open(&path).map_err(|e| e.to_string()));
    match opened {
        Ok(db) => {
            tracing::info!(path = %path.display(), "settings database opened");
            Arc::new(SqliteSettingsStore::new(Arc::new(db)))
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "settings database unavailable, using memory store");
            Arc::new(MemorySettingsStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::from_env();
    init_logging(&config.log)?;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = out_rx.recv().await {
            let line = format!("{}\n", frame);
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let host = Arc::new(StdioTabHost::new(out_tx.clone()));
    let engine = Arc::new(PolicyEngine::new(host.clone(), open_store(&config)));

    let _ = out_tx.send(json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}));

    // Host calls made during init are answered through the read loop below.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.init().await {
                tracing::warn!(error = %e, "engine init failed");
            }
        });
    }

    let mut rate_limiter = RateLimiter::new(200);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let frame: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let _ = out_tx.send(json!({"id": null, "error": format!("parse error: {}", e)}));
                continue;
            }
        };

        if frame.get("reply").is_some() {
            host.resolve_reply(&frame);
            continue;
        }

        if let Some(event) = frame.get("event") {
            match serde_json::from_value::<TabEvent>(event.clone()) {
                Ok(event) => {
                    let engine = engine.clone();
                    tokio::spawn(async move { engine.handle_event(&event).await });
                }
                Err(e) => tracing::warn!(error = %e, "unreadable event"),
            }
            continue;
        }

        let id = frame.get("id").cloned().unwrap_or(Value::Null);
        if !rate_limiter.check() {
            let _ = out_tx.send(json!({"id": id, "error": "rate limit exceeded"}));
            continue;
        }
        let message_type = frame.get("message").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let params = frame.get("params").cloned().unwrap_or(json!({}));
        let engine = engine.clone();
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let result = respond(handle_message(&engine, &message_type, &params).await);
            let _ = out_tx.send(json!({"id": id, "result": result}));
        });
    }

    tracing::info!("stdin closed, shutting down");
    engine.reset();
    drop(out_tx);
    drop(host);
    drop(engine);
    // Spawned tasks may still hold senders; give queued frames a moment to flush.
    let _ = tokio::time::timeout(Duration::from_millis(200), writer).await;
    Ok(())
}
