//! One client session end-to-end: read the query, retrieve examples,
//! stream candidates from the backend worker, write them to the client.
//!
//! The producer runs on a worker thread behind a bounded channel; this task
//! drains it cooperatively and never outlives its producer: every exit path
//! waits for the terminal sentinel (or channel close) and then joins the
//! worker before returning, so the registry can rely on the worker being
//! stopped once the session task completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use crate::assemble::LineAssembler;
use crate::backend::{GenerationRequest, StreamItem, StreamStatus};
use crate::server::Daemon;

/// Terminal state of a session, for logging only: the client always just
/// observes zero or more candidates followed by EOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Done,
    EmptyQuery,
    ReadTimeout,
    Cancelled,
    QueueTimeout,
    Error,
}

pub async fn run(daemon: Arc<Daemon>, stream: UnixStream, cancel: Arc<AtomicBool>) {
    let end = serve(&daemon, stream, &cancel).await;
    match end {
        SessionEnd::Done => tracing::debug!("session finished"),
        SessionEnd::EmptyQuery | SessionEnd::ReadTimeout => {}
        other => tracing::info!("session ended: {other:?}"),
    }
}

async fn serve(daemon: &Arc<Daemon>, stream: UnixStream, cancel: &Arc<AtomicBool>) -> SessionEnd {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    // The local client writes its whole request before connecting, so this
    // wait is short (configurable via ZAI_READ_TIMEOUT_MS).
    let mut line = String::new();
    let read = tokio::time::timeout(daemon.config.read_timeout, reader.read_line(&mut line)).await;
    match read {
        Err(_) => {
            tracing::warn!("client read timed out");
            let _ = write_half.shutdown().await;
            return SessionEnd::ReadTimeout;
        }
        Ok(Err(e)) => {
            tracing::error!("client read failed: {e}");
            let _ = write_half.shutdown().await;
            return SessionEnd::Error;
        }
        Ok(Ok(_)) => {}
    }
    let query = line.trim().to_string();
    if query.is_empty() {
        let _ = write_half.shutdown().await;
        return SessionEnd::EmptyQuery;
    }
    tracing::info!("query: {query:?} (backend: {:?})", daemon.config.backend);

    // Retrieval is storage I/O; keep it off the scheduler thread
    let examples = {
        let daemon = Arc::clone(daemon);
        let query = query.clone();
        tokio::task::spawn_blocking(move || daemon.retrieve(&query))
            .await
            .unwrap_or_default()
    };
    tracing::info!("retrieved examples: {examples:?}");

    let (tx, mut rx) = mpsc::channel::<StreamItem>(16);
    let producer = {
        let daemon = Arc::clone(daemon);
        let stop = Arc::clone(cancel);
        let request = GenerationRequest { query, examples };
        tokio::task::spawn_blocking(move || {
            let mut assembler = LineAssembler::new(tx.clone());
            let status = match daemon.backend.lock() {
                Ok(mut backend) => backend.stream(&request, &mut assembler, &stop),
                Err(_) => StreamStatus::Failed,
            };
            // The sentinel goes out on every path; a panic above would drop
            // the sender instead, which the consumer treats the same way
            let _ = tx.blocking_send(StreamItem::Done(status));
        })
    };

    let mut end = SessionEnd::Done;
    loop {
        let item = tokio::select! {
            item = rx.recv() => item,
            _ = cancelled(cancel) => {
                end = SessionEnd::Cancelled;
                break;
            }
            _ = tokio::time::sleep(daemon.config.stream_timeout) => {
                tracing::warn!("timed out waiting for next candidate");
                end = SessionEnd::QueueTimeout;
                break;
            }
        };
        match item {
            Some(StreamItem::Candidate(cmd)) => {
                let mut out = cmd.into_bytes();
                out.push(b'\n');
                if write_half.write_all(&out).await.is_err() {
                    end = SessionEnd::Error;
                    break;
                }
            }
            Some(StreamItem::Done(_)) | None => break,
        }
    }

    // Teardown, in order: stop the producer, signal end-of-output to the
    // client, drain until the sentinel, join the worker thread.
    cancel.store(true, Ordering::SeqCst);
    let _ = write_half.shutdown().await;
    loop {
        match rx.recv().await {
            Some(StreamItem::Candidate(_)) => continue,
            Some(StreamItem::Done(_)) | None => break,
        }
    }
    let _ = producer.await;
    end
}

/// Resolves once the cancellation flag is set. Polled because the flag is
/// shared with synchronous worker code.
async fn cancelled(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
