pub mod anthropic;
pub mod local;

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::assemble::LineAssembler;
use crate::config::{BackendKind, Config};

/// Terminal status of one backend stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Messages crossing the worker-thread → scheduler bridge. The producer
/// pushes candidates in emission order and exactly one `Done` at the end.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamItem {
    Candidate(String),
    Done(StreamStatus),
}

/// Inputs for one generation call: the client's request plus whatever the
/// retrieval gateway found.
pub struct GenerationRequest {
    pub query: String,
    pub examples: Vec<String>,
}

/// The two generation backends behind one streaming contract. Adding a
/// backend means adding a variant here, not branching on strings.
pub enum Backend {
    Local(local::LocalBackend),
    Anthropic(anthropic::AnthropicBackend),
}

impl Backend {
    pub fn from_config(config: &Config) -> Self {
        match config.backend {
            BackendKind::Local => Backend::Local(local::LocalBackend::new(config)),
            BackendKind::Anthropic => {
                Backend::Anthropic(anthropic::AnthropicBackend::new(config))
            }
        }
    }

    /// Stream raw model output into the assembler. Blocking; runs on a
    /// worker thread. `stop` is polled once per streamed line, so the
    /// producer may finish one more network read after cancellation.
    pub fn stream(
        &mut self,
        request: &GenerationRequest,
        out: &mut LineAssembler,
        stop: &AtomicBool,
    ) -> StreamStatus {
        match self {
            Backend::Local(b) => b.stream(request, out, stop),
            Backend::Anthropic(b) => b.stream(request, out, stop),
        }
    }
}

/// One persistent outbound connection per backend variant: built lazily,
/// reused across sessions, discarded on any transport failure.
pub(crate) struct ConnectionSlot {
    client: Option<reqwest::blocking::Client>,
    timeout: Duration,
}

impl ConnectionSlot {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: None,
            timeout,
        }
    }

    pub fn get(&mut self) -> reqwest::Result<&reqwest::blocking::Client> {
        if self.client.is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .connect_timeout(Duration::from_secs(5))
                .build()?;
            return Ok(self.client.insert(client));
        }
        Ok(self.client.as_ref().expect("client slot populated"))
    }

    pub fn reset(&mut self) {
        self.client = None;
    }
}

/// Strip the `data: ` prefix of a server-sent-event line, if present.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data: ")
}
