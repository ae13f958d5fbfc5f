//! Best-effort retrieval over the FTS5 knowledge base. The store is
//! optional context, never a hard dependency: any failure here yields an
//! empty example list and the session proceeds.

use std::path::PathBuf;

use rusqlite::{params, Connection, OpenFlags};

pub const MAX_EXAMPLES: usize = 3;

pub struct HistoryIndex {
    db_path: PathBuf,
    conn: Option<Connection>,
}

impl HistoryIndex {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            conn: None,
        }
    }

    fn conn(&mut self) -> rusqlite::Result<&Connection> {
        if self.conn.is_none() {
            let conn = Connection::open_with_flags(
                &self.db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.execute_batch("PRAGMA query_only = ON")?;
            return Ok(self.conn.insert(conn));
        }
        Ok(self.conn.as_ref().expect("connection slot populated"))
    }

    /// Up to three ranked historical commands for a query. Blocking; runs
    /// on a worker thread.
    pub fn search(&mut self, query: &str) -> Vec<String> {
        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }
        let conn = match self.conn() {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("knowledge base unavailable: {e}");
                return Vec::new();
            }
        };

        // Prior tokens as exact terms, last token as prefix
        let mut fts_expr = tokens[..tokens.len() - 1].join(" ");
        if !fts_expr.is_empty() {
            fts_expr.push(' ');
        }
        fts_expr.push_str(tokens[tokens.len() - 1]);
        fts_expr.push('*');

        match fts_search(conn, &fts_expr) {
            Ok(rows) if !rows.is_empty() => return rows,
            Ok(_) => {}
            // Special characters in the query can break FTS5 syntax
            Err(e) => tracing::debug!("fts query failed, using prefix fallback: {e}"),
        }

        let escaped = query.replace('%', r"\%").replace('_', r"\_");
        match like_search(conn, &escaped) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::debug!("prefix fallback failed: {e}");
                Vec::new()
            }
        }
    }
}

fn fts_search(conn: &Connection, expr: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT cmd FROM commands WHERE commands MATCH ? ORDER BY rank LIMIT ?",
    )?;
    let rows = stmt.query_map(params![expr, MAX_EXAMPLES as i64], |row| row.get(0))?;
    rows.collect()
}

fn like_search(conn: &Connection, prefix: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT cmd FROM commands WHERE cmd LIKE ? ESCAPE '\\' LIMIT ?",
    )?;
    let pattern = format!("{prefix}%");
    let rows = stmt.query_map(params![pattern, MAX_EXAMPLES as i64], |row| row.get(0))?;
    rows.collect()
}
