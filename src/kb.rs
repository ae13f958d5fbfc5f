//! Offline knowledge-base builder: parses a zsh history file into the
//! FTS5 index the daemon retrieves from.

use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;
use rusqlite::{params, Connection};

// Extended zsh history format: `: timestamp:elapsed;command`
fn extended_re() -> Regex {
    Regex::new(r"^: \d+:\d+;(.+)$").expect("static regex")
}

pub fn default_history_path() -> PathBuf {
    dirs::home_dir()
        .expect("could not determine home directory")
        .join(".zsh_history")
}

/// Parse a zsh history file, handling plain and extended formats.
/// Physical lines ending in a backslash are joined into one logical
/// command.
pub fn parse_history(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("reading history file {}", path.display()))?;
    // zsh history is not guaranteed UTF-8
    let text = String::from_utf8_lossy(&raw);

    let mut logical = Vec::new();
    let mut buf = String::new();
    for line in text.lines() {
        if let Some(stripped) = line.strip_suffix('\\') {
            buf.push_str(stripped);
            buf.push(' ');
        } else {
            buf.push_str(line);
            logical.push(std::mem::take(&mut buf));
        }
    }
    if !buf.is_empty() {
        logical.push(buf);
    }

    let re = extended_re();
    let mut commands = Vec::new();
    for line in logical {
        let cmd = match re.captures(&line) {
            Some(caps) => caps[1].trim().to_string(),
            None => line.trim().to_string(),
        };
        // Skip comments and very short commands
        if cmd.is_empty() || cmd.starts_with('#') || cmd.chars().count() < 3 {
            continue;
        }
        commands.push(cmd);
    }
    Ok(commands)
}

/// Collapse runs of whitespace to a single space.
fn normalize(cmd: &str) -> String {
    cmd.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Create (or replace) the FTS5 database from a list of commands.
/// Returns the number of unique commands stored.
pub fn build_db(db_path: &Path, commands: &[String]) -> anyhow::Result<usize> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if db_path.exists() {
        std::fs::remove_file(db_path)?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         CREATE VIRTUAL TABLE IF NOT EXISTS commands
             USING fts5(cmd, tokenize='porter unicode61');",
    )?;

    // Deduplicate while preserving first-seen order
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for cmd in commands {
        let norm = normalize(cmd);
        if seen.insert(norm.clone()) {
            unique.push(norm);
        }
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO commands(cmd) VALUES (?)")?;
        for cmd in &unique {
            stmt.execute(params![cmd])?;
        }
    }
    tx.commit()?;
    conn.execute_batch("INSERT INTO commands(commands) VALUES('optimize')")?;

    Ok(unique.len())
}

/// The `import` subcommand: history file → knowledge base.
pub fn import(history: &Path, db_path: &Path, rebuild: bool) -> anyhow::Result<()> {
    if db_path.exists() && !rebuild {
        eprintln!(
            "Knowledge base already exists at {}; use --rebuild to overwrite",
            db_path.display()
        );
        return Ok(());
    }
    let commands = parse_history(history)?;
    if commands.is_empty() {
        anyhow::bail!("no commands parsed from {}", history.display());
    }
    let count = build_db(db_path, &commands)?;
    eprintln!(
        "Built knowledge base: {count} unique commands -> {}",
        db_path.display()
    );
    Ok(())
}
