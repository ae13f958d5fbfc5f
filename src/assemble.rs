//! Turns raw streamed model text into validated, deduplicated candidate
//! command lines, capped at five per session.

use std::collections::HashSet;

use tokio::sync::mpsc;

use crate::backend::StreamItem;

pub const MAX_CANDIDATES: usize = 5;

/// Strip shell prompt prefix and markdown artifacts. Returns `None` if the
/// line is not a plausible command.
pub fn clean_line(line: &str) -> Option<String> {
    let line = line
        .trim()
        .trim_start_matches('$')
        .trim_matches(|c| c == ' ' || c == '`');
    if line.is_empty() {
        return None;
    }
    if line.starts_with('#') || line.starts_with("```") {
        return None;
    }
    // Single-char or pure-punctuation fragments
    let first = line.chars().next()?;
    if line.chars().count() <= 2 && !first.is_alphabetic() {
        return None;
    }
    // Unbalanced quotes usually mean a truncated line
    if line.matches('"').count() % 2 != 0 || line.matches('\'').count() % 2 != 0 {
        return None;
    }
    Some(line.to_string())
}

/// Session-scoped line assembler: buffers text deltas, splits complete
/// lines, and pushes accepted candidates onto the bridge channel in order.
pub struct LineAssembler {
    buf: String,
    seen: HashSet<String>,
    emitted: usize,
    tx: mpsc::Sender<StreamItem>,
}

impl LineAssembler {
    pub fn new(tx: mpsc::Sender<StreamItem>) -> Self {
        Self {
            buf: String::new(),
            seen: HashSet::new(),
            emitted: 0,
            tx,
        }
    }

    pub fn full(&self) -> bool {
        self.emitted >= MAX_CANDIDATES
    }

    /// Append a text delta and emit every complete line it unlocks.
    pub fn push(&mut self, delta: &str) {
        self.buf.push_str(delta);
        while !self.full() {
            let Some(idx) = self.buf.find('\n') else {
                break;
            };
            let line: String = self.buf.drain(..=idx).collect();
            self.offer(&line);
        }
    }

    /// Run the remaining partial line through the same predicate. Called on
    /// stream termination; the caller suppresses this under cancellation.
    pub fn flush(&mut self) {
        if !self.full() && !self.buf.trim().is_empty() {
            let rest = std::mem::take(&mut self.buf);
            self.offer(&rest);
        }
    }

    fn offer(&mut self, line: &str) {
        let Some(cleaned) = clean_line(line) else {
            return;
        };
        if !self.seen.insert(cleaned.clone()) {
            return;
        }
        self.emitted += 1;
        tracing::info!("emitted candidate {}: {:?}", self.emitted, cleaned);
        // The consumer only drops the receiver after the producer exits, so
        // a failed send means teardown is already underway.
        let _ = self.tx.blocking_send(StreamItem::Candidate(cleaned));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StreamItem;

    fn collect(rx: &mut mpsc::Receiver<StreamItem>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(StreamItem::Candidate(c)) = rx.try_recv() {
            out.push(c);
        }
        out
    }

    #[test]
    fn clean_strips_prompt_and_backticks() {
        assert_eq!(clean_line("  $ ls -la  "), Some("ls -la".into()));
        assert_eq!(clean_line("`du -sh .`"), Some("du -sh .".into()));
        assert_eq!(clean_line("$`df -h`"), Some("df -h".into()));
    }

    #[test]
    fn clean_rejects_comments_and_fences() {
        assert_eq!(clean_line("# a comment"), None);
        assert_eq!(clean_line("```bash"), None);
        assert_eq!(clean_line(""), None);
        assert_eq!(clean_line("   "), None);
    }

    #[test]
    fn clean_rejects_short_punctuation() {
        assert_eq!(clean_line("-"), None);
        assert_eq!(clean_line("()"), None);
        // Two alphabetic chars are a legitimate command
        assert_eq!(clean_line("ls"), Some("ls".into()));
    }

    #[test]
    fn clean_rejects_unbalanced_quotes() {
        assert_eq!(clean_line("echo \"unterminated"), None);
        assert_eq!(clean_line("grep 'half"), None);
        assert_eq!(clean_line("echo \"ok\" 'fine'"), Some("echo \"ok\" 'fine'".into()));
    }

    #[test]
    fn clean_is_idempotent() {
        let once = clean_line(" $ curl -s \"https://example.com\" ").unwrap();
        assert_eq!(clean_line(&once), Some(once.clone()));
    }

    #[test]
    fn assembler_splits_lines_across_deltas() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut asm = LineAssembler::new(tx);
        asm.push("ls -");
        asm.push("la\ndu -sh");
        asm.push(" .\n");
        assert_eq!(collect(&mut rx), vec!["ls -la", "du -sh ."]);
    }

    #[test]
    fn assembler_dedupes_within_session() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut asm = LineAssembler::new(tx);
        asm.push("ncdu\nncdu\n$ ncdu\n");
        assert_eq!(collect(&mut rx), vec!["ncdu"]);
    }

    #[test]
    fn assembler_caps_at_five() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut asm = LineAssembler::new(tx);
        for i in 0..8 {
            asm.push(&format!("cmd{i}\n"));
        }
        assert!(asm.full());
        assert_eq!(collect(&mut rx).len(), MAX_CANDIDATES);
    }

    #[test]
    fn flush_emits_valid_trailing_partial() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut asm = LineAssembler::new(tx);
        asm.push("find . -name '*.log'");
        assert!(collect(&mut rx).is_empty());
        asm.flush();
        assert_eq!(collect(&mut rx), vec!["find . -name '*.log'"]);
    }

    #[test]
    fn flush_skips_invalid_partial() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut asm = LineAssembler::new(tx);
        asm.push("echo \"oops");
        asm.flush();
        assert!(collect(&mut rx).is_empty());
    }
}
