// Library root for zai: exposes modules and the shared main entry.

pub mod assemble;
pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod kb;
pub mod prompt;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod util;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::config::Config;

pub fn main_inner() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Daemon = cli.command {
        // Daemon logs go to a file in the data dir; everything else logs
        // to stderr below. Logging comes up before Config::load so the
        // backend-fallback warning lands in the log file.
        let data_dir = Config::resolve_data_dir();
        std::fs::create_dir_all(&data_dir)?;
        let appender = tracing_appender::rolling::never(&data_dir, "daemon.log");
        let (writer, _guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(writer)
            .with_ansi(false)
            .init();
        return server::run(Config::load());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Daemon => unreachable!("handled above"),
        Commands::Import {
            history,
            db,
            rebuild,
        } => {
            let config = Config::load();
            let history = history.unwrap_or_else(kb::default_history_path);
            let db = db.unwrap_or_else(|| config.db_path());
            kb::import(&history, &db, rebuild)
        }
        Commands::Ask { words } => {
            let config = Config::load();
            client::ask(&config, &words.join(" "))
        }
    }
}
