use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

pub const DEFAULT_LLAMA_HOST: &str = "127.0.0.1";
pub const DEFAULT_LLAMA_PORT: u16 = 8080;
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-haiku-4-5-20251001";

/// Which generation backend the daemon talks to. Resolved once at startup,
/// never changes for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Anthropic,
}

// No Debug derive: the API key must not end up in logs
#[derive(Clone)]
pub struct Config {
    pub backend: BackendKind,
    pub api_key: Option<Zeroizing<String>>,
    pub model: String,
    pub llama_host: String,
    pub llama_port: u16,
    /// Bounded wait for the client's single request line. Local clients
    /// write the whole line before connecting is even accepted, so the
    /// default is short; override with ZAI_READ_TIMEOUT_MS.
    pub read_timeout: Duration,
    /// Total backend request timeout and per-candidate queue wait.
    /// CPU inference on a small quantized model runs ~11 tok/s, so a
    /// command line can take tens of seconds.
    pub stream_timeout: Duration,
    pub data_dir: PathBuf,
}

impl Config {
    /// Read configuration from the environment. Misconfiguration is
    /// downgraded, not fatal: anthropic selected without an API key falls
    /// back to the local backend.
    pub fn load() -> Self {
        let data_dir = Self::resolve_data_dir();

        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Zeroizing::new);

        let selected = std::env::var("ZAI_BACKEND").unwrap_or_else(|_| "local".into());
        let backend = resolve_backend(&selected, api_key.is_some());

        Self {
            backend,
            api_key,
            model: std::env::var("ZAI_ANTHROPIC_MODEL")
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.into()),
            llama_host: std::env::var("ZAI_LLAMA_HOST")
                .unwrap_or_else(|_| DEFAULT_LLAMA_HOST.into()),
            llama_port: std::env::var("ZAI_LLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_LLAMA_PORT),
            read_timeout: Duration::from_millis(env_u64("ZAI_READ_TIMEOUT_MS", 50)),
            stream_timeout: Duration::from_secs(env_u64("ZAI_STREAM_TIMEOUT_SECS", 30)),
            data_dir,
        }
    }

    /// Data directory, resolvable before the rest of the config so logging
    /// can be set up first.
    pub fn resolve_data_dir() -> PathBuf {
        std::env::var("ZAI_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_data_dir())
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| dirs::home_dir().expect("could not determine home directory"))
            .join("zai")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join("daemon.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("daemon.pid")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }
}

/// Decide the backend from the raw ZAI_BACKEND value and whether an API
/// key is present. Anthropic without a key is downgraded to local.
fn resolve_backend(selected: &str, have_key: bool) -> BackendKind {
    match selected.to_lowercase().as_str() {
        "anthropic" if have_key => BackendKind::Anthropic,
        "anthropic" => {
            tracing::error!(
                "ZAI_BACKEND=anthropic but ANTHROPIC_API_KEY is not set, falling back to local"
            );
            BackendKind::Local
        }
        _ => BackendKind::Local,
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_data_dir() {
        let config = Config {
            backend: BackendKind::Local,
            api_key: None,
            model: DEFAULT_ANTHROPIC_MODEL.into(),
            llama_host: DEFAULT_LLAMA_HOST.into(),
            llama_port: DEFAULT_LLAMA_PORT,
            read_timeout: Duration::from_millis(50),
            stream_timeout: Duration::from_secs(30),
            data_dir: PathBuf::from("/tmp/zai-test"),
        };
        assert_eq!(config.socket_path(), PathBuf::from("/tmp/zai-test/daemon.sock"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/zai-test/history.db"));
    }

    #[test]
    fn anthropic_with_key_selects_anthropic() {
        assert_eq!(resolve_backend("anthropic", true), BackendKind::Anthropic);
        assert_eq!(resolve_backend("ANTHROPIC", true), BackendKind::Anthropic);
    }

    #[test]
    fn anthropic_without_key_falls_back_to_local() {
        assert_eq!(resolve_backend("anthropic", false), BackendKind::Local);
    }

    #[test]
    fn unknown_or_local_selector_is_local() {
        assert_eq!(resolve_backend("local", true), BackendKind::Local);
        assert_eq!(resolve_backend("gibberish", false), BackendKind::Local);
    }
}
