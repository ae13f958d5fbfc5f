use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "zai",
    version = env!("ZAI_BUILD_VERSION"),
    about = "Natural-language shell command finder"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon (Unix socket server)
    Daemon,

    /// Build the knowledge base from zsh history
    Import {
        /// Path to the zsh history file
        #[arg(long)]
        history: Option<PathBuf>,
        /// Path to the output database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Overwrite an existing knowledge base
        #[arg(long, default_value_t = false)]
        rebuild: bool,
    },

    /// Send one query to the daemon and print streamed candidates
    Ask {
        /// The natural language request
        #[arg(trailing_var_arg = true, required = true)]
        words: Vec<String>,
    },
}
