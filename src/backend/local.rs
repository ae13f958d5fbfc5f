//! Local llama-server backend: one streaming `/completion` request against
//! a loopback HTTP endpoint, SSE chunks carrying incremental `content`.

use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use serde_json::json;

use crate::assemble::LineAssembler;
use crate::backend::{sse_data, ConnectionSlot, GenerationRequest, StreamStatus};
use crate::config::Config;
use crate::prompt;

#[derive(Debug, Default, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
}

pub struct LocalBackend {
    conn: ConnectionSlot,
    url: String,
}

impl LocalBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            conn: ConnectionSlot::new(config.stream_timeout),
            url: format!(
                "http://{}:{}/completion",
                config.llama_host, config.llama_port
            ),
        }
    }

    pub fn stream(
        &mut self,
        request: &GenerationRequest,
        out: &mut LineAssembler,
        stop: &AtomicBool,
    ) -> StreamStatus {
        let body = json!({
            "prompt": prompt::build_prompt(&request.query, &request.examples),
            "temperature": 0.7,
            "n_predict": 250,
            "stop": ["Request:", "Past commands:"],
            "stream": true,
            "cache_prompt": true,
        });

        // One retry on a fresh connection, then give up
        let mut resp = None;
        for attempt in 0..2 {
            let client = match self.conn.get() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("llama client build failed: {e}");
                    return StreamStatus::Failed;
                }
            };
            match client.post(&self.url).json(&body).send() {
                Ok(r) => {
                    resp = Some(r);
                    break;
                }
                Err(e) => {
                    tracing::warn!("llama connect attempt {} failed: {e}", attempt + 1);
                    self.conn.reset();
                }
            }
        }
        let Some(resp) = resp else {
            return StreamStatus::Failed;
        };

        let mut lines = BufReader::new(resp).lines();
        while !stop.load(Ordering::SeqCst) && !out.full() {
            let raw = match lines.next() {
                None => break,
                Some(Ok(l)) => l,
                Some(Err(e)) => {
                    tracing::error!("llama stream error: {e}");
                    self.conn.reset();
                    return StreamStatus::Failed;
                }
            };
            let Some(data) = sse_data(&raw) else {
                continue;
            };
            // Malformed chunks are skipped, never fatal
            let chunk: CompletionChunk = match serde_json::from_str(data) {
                Ok(c) => c,
                Err(_) => continue,
            };
            out.push(&chunk.content);
            if chunk.stop {
                break;
            }
        }

        // The trailing partial line counts, unless we were cancelled
        if stop.load(Ordering::SeqCst) {
            return StreamStatus::Cancelled;
        }
        out.flush();
        StreamStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_parses_content_and_stop() {
        let c: CompletionChunk =
            serde_json::from_str("{\"content\":\"ls\\n\",\"stop\":false}").unwrap();
        assert_eq!(c.content, "ls\n");
        assert!(!c.stop);

        let c: CompletionChunk = serde_json::from_str("{\"stop\":true}").unwrap();
        assert_eq!(c.content, "");
        assert!(c.stop);
    }
}
