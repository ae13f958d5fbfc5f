//! Daemon lifecycle and the single-flight session registry.
//!
//! One cooperative scheduler thread handles accepting and all session
//! orchestration; a two-worker blocking pool runs retrieval queries and
//! backend streaming. At most one session is ever active: a new connection
//! cancels the previous session and waits for its teardown (worker thread
//! included) before the replacement starts.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::config::{BackendKind, Config};
use crate::retrieval::HistoryIndex;
use crate::session;

/// Process-wide context: configuration plus every shared mutable resource.
/// The single-flight invariant keeps the mutexes uncontended; they exist to
/// move the backend connection and database handle across worker threads.
pub struct Daemon {
    pub config: Config,
    pub backend: Mutex<Backend>,
    index: Mutex<HistoryIndex>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let backend = Backend::from_config(&config);
        let index = HistoryIndex::new(config.db_path());
        Self {
            config,
            backend: Mutex::new(backend),
            index: Mutex::new(index),
        }
    }

    /// Best-effort retrieval; blocking, called from a worker thread.
    pub fn retrieve(&self, query: &str) -> Vec<String> {
        match self.index.lock() {
            Ok(mut index) => index.search(query),
            Err(_) => Vec::new(),
        }
    }
}

struct ActiveSession {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Run the daemon until SIGINT/SIGTERM. Blocks the calling thread.
pub fn run(config: Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(2)
        .build()?;
    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;

    let socket_path = config.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let pid_path = config.pid_path();
    std::fs::write(&pid_path, std::process::id().to_string())?;

    // Files come off again on every exit, failed startup included, or the
    // next start would find them stale
    let result = accept_loop(config, &socket_path).await;
    let _ = std::fs::remove_file(&socket_path);
    let _ = std::fs::remove_file(&pid_path);
    if result.is_ok() {
        tracing::info!("daemon exited cleanly");
    }
    result
}

async fn accept_loop(config: Config, socket_path: &Path) -> anyhow::Result<()> {
    let listener = UnixListener::bind(socket_path)?;
    match config.backend {
        BackendKind::Local => tracing::info!(
            "daemon started on {} (local backend at {}:{})",
            socket_path.display(),
            config.llama_host,
            config.llama_port
        ),
        BackendKind::Anthropic => tracing::info!(
            "daemon started on {} (anthropic backend, model {})",
            socket_path.display(),
            config.model
        ),
    }

    let daemon = Arc::new(Daemon::new(config));
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut active: Option<ActiveSession> = None;
    loop {
        let conn = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    tracing::warn!("accept failed: {e}");
                    continue;
                }
            },
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
        };

        // Single flight: preempt the in-flight session and wait out its
        // teardown before this connection gets a session
        if let Some(previous) = active.take() {
            previous.cancel.store(true, Ordering::SeqCst);
            let _ = previous.task.await;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(session::run(
            Arc::clone(&daemon),
            conn,
            Arc::clone(&cancel),
        ));
        active = Some(ActiveSession { cancel, task });
    }

    if let Some(previous) = active.take() {
        previous.cancel.store(true, Ordering::SeqCst);
        let _ = previous.task.await;
    }
    Ok(())
}
