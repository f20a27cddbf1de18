//! JSON-lines envelope over stdin/stdout.
//!
//! One request per line: `{"id": ..., "tool": "...", "args": {...}}`.
//! One response per line: `{"id": ..., "result": ...}` or
//! `{"id": ..., "error": {"message": "..."}}`. The loop exits on EOF.

use crate::tools::ToolRegistry;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    args: Value,
}

pub async fn run(registry: Arc<ToolRegistry>) -> Result<()> {
    info!(tools = registry.names().len(), "stdio transport ready");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Envelope>(trimmed) {
            Ok(envelope) => {
                debug!(tool = %envelope.tool, "dispatching");
                let args = if envelope.args.is_null() {
                    json!({})
                } else {
                    envelope.args
                };
                match registry.dispatch(&envelope.tool, args).await {
                    Ok(result) => json!({"id": envelope.id, "result": result}),
                    Err(err) => json!({
                        "id": envelope.id,
                        "error": {"message": err.to_string()}
                    }),
                }
            }
            Err(err) => json!({
                "id": null,
                "error": {"message": format!("malformed request: {err}")}
            }),
        };

        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        stdout.write_all(&payload).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}
