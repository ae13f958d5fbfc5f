//! Anthropic messages backend: one streaming `/v1/messages` request,
//! typed SSE events, token usage logged per stream.

use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use zeroize::Zeroizing;

use crate::assemble::LineAssembler;
use crate::backend::{sse_data, ConnectionSlot, GenerationRequest, StreamStatus};
use crate::config::Config;
use crate::prompt;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    conn: ConnectionSlot,
    api_key: Zeroizing<String>,
    model: String,
    base_url: String,
}

impl AnthropicBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            conn: ConnectionSlot::new(config.stream_timeout),
            api_key: config
                .api_key
                .clone()
                .unwrap_or_else(|| Zeroizing::new(String::new())),
            model: config.model.clone(),
            base_url: "https://api.anthropic.com".into(),
        }
    }

    fn build_body(&self, request: &GenerationRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "max_tokens": 250,
            "system": prompt::SYSTEM_INSTRUCTION,
            "messages": [{
                "role": "user",
                "content": prompt::build_user_message(&request.query, &request.examples),
            }],
            "stream": true,
        })
    }

    pub fn stream(
        &mut self,
        request: &GenerationRequest,
        out: &mut LineAssembler,
        stop: &AtomicBool,
    ) -> StreamStatus {
        let body = self.build_body(request);

        let mut resp = None;
        for attempt in 0..2 {
            let client = match self.conn.get() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("anthropic client build failed: {e}");
                    return StreamStatus::Failed;
                }
            };
            let mut header =
                reqwest::header::HeaderValue::from_str(&self.api_key).unwrap_or_else(|_| {
                    reqwest::header::HeaderValue::from_static("")
                });
            header.set_sensitive(true);
            match client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", header)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
            {
                Ok(r) => {
                    // A refused request is not a transport fault; no retry
                    if !r.status().is_success() {
                        let status = r.status();
                        let text = r.text().unwrap_or_default();
                        let text = crate::util::truncate_bytes(&text, 512);
                        tracing::error!("anthropic API error {status}: {text}");
                        self.conn.reset();
                        return StreamStatus::Failed;
                    }
                    resp = Some(r);
                    break;
                }
                Err(e) => {
                    tracing::warn!("anthropic connect attempt {} failed: {e}", attempt + 1);
                    self.conn.reset();
                }
            }
        }
        let Some(resp) = resp else {
            return StreamStatus::Failed;
        };

        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;

        let mut lines = BufReader::new(resp).lines();
        while !stop.load(Ordering::SeqCst) && !out.full() {
            let raw = match lines.next() {
                None => break,
                Some(Ok(l)) => l,
                Some(Err(e)) => {
                    tracing::error!("anthropic stream error: {e}");
                    self.conn.reset();
                    return StreamStatus::Failed;
                }
            };
            let Some(data) = sse_data(&raw) else {
                continue;
            };
            if data == "[DONE]" {
                break;
            }
            let event: serde_json::Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(_) => continue,
            };
            match event["type"].as_str() {
                Some("message_start") => {
                    input_tokens = event["message"]["usage"]["input_tokens"]
                        .as_u64()
                        .unwrap_or(0);
                }
                Some("content_block_delta") => {
                    let delta = &event["delta"];
                    if delta["type"].as_str() == Some("text_delta") {
                        if let Some(text) = delta["text"].as_str() {
                            out.push(text);
                        }
                    }
                }
                Some("message_delta") => {
                    output_tokens = event["usage"]["output_tokens"].as_u64().unwrap_or(0);
                }
                Some("message_stop") => break,
                _ => {}
            }
        }

        tracing::info!(
            "anthropic usage: input {input_tokens} tokens, output {output_tokens} tokens, model {}",
            self.model
        );

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
    use crate::config::{BackendKind, Config};
    use std::path::PathBuf;
    use std::time::Duration;

    fn make_backend() -> AnthropicBackend {
        let config = Config {
            backend: BackendKind::Anthropic,
            api_key: Some(Zeroizing::new("test-key".into())),
            model: "claude-3-haiku".into(),
            llama_host: "127.0.0.1".into(),
            llama_port: 8080,
            read_timeout: Duration::from_millis(50),
            stream_timeout: Duration::from_secs(30),
            data_dir: PathBuf::from("/tmp"),
        };
        AnthropicBackend::new(&config)
    }

    #[test]
    fn body_shape() {
        let backend = make_backend();
        let body = backend.build_body(&GenerationRequest {
            query: "find large files".into(),
            examples: vec![],
        });
        assert_eq!(body["model"], "claude-3-haiku");
        assert_eq!(body["max_tokens"], 250);
        assert_eq!(body["stream"], true);
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[0]["content"], "Request: find large files\nCommands:");
    }

    #[test]
    fn body_includes_retrieved_examples() {
        let backend = make_backend();
        let body = backend.build_body(&GenerationRequest {
            query: "disk usage".into(),
            examples: vec!["du -sh .".into()],
        });
        let content = body["messages"][0]["content"].as_str().unwrap();
        assert!(content.starts_with("Relevant past commands for context:\n$ du -sh ."));
    }
}
