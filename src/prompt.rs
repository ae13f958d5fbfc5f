//! Prompt construction for both generation backends.
//!
//! The local completion backend gets a raw few-shot prompt; the Anthropic
//! backend gets a system instruction plus one user message. Retrieved
//! history is injected as `$ `-prefixed lines in both cases.

const FEW_SHOT: &str = "\
Request: find large files
Commands:
find . -type f -size +100M
du -ah . | sort -rh | head -20
ls -lhS | head -20
ncdu
du -sh /*

Request: kill process on port 8080
Commands:
fuser -k 8080/tcp
kill $(lsof -t -i:8080)
pkill -f ':8080'
ss -tlnp | grep 8080
lsof -i tcp:8080

Request: fetch eth price
Commands:
curl -s \"https://api.binance.com/api/v3/ticker/price?symbol=ETHUSDT\"
curl -s \"https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=usd\"
curl -s \"https://min-api.cryptocompare.com/data/price?fsym=ETH&tsyms=USD\"
curl -s \"https://api.kraken.com/0/public/Ticker?pair=ETHUSD\"
http GET \"https://api.binance.com/api/v3/ticker/price?symbol=ETHUSDT\"
";

pub const SYSTEM_INSTRUCTION: &str = "You generate shell commands from natural language \
descriptions. Output exactly 5 different commands, one per line. Each must use a different \
tool or approach. Valid bash/zsh only. No numbering, no explanations, no markdown. Always \
quote URLs and arguments containing special characters (?, &, =, spaces).";

/// Few-shot completion prompt for the local llama-server backend.
pub fn build_prompt(query: &str, examples: &[String]) -> String {
    let history = if examples.is_empty() {
        String::new()
    } else {
        let block: String = examples.iter().map(|e| format!("$ {e}\n")).collect();
        format!("User history:\n{block}\n")
    };
    format!(
        "Generate 5 different shell commands for each request. \
         Each command must use a different tool or approach. \
         Output only valid bash/zsh commands that run directly in a terminal. \
         Always quote URLs and strings containing special characters (?, &, =, spaces). \
         One command per line, no numbering, no explanations, no markdown.\n\n\
         {FEW_SHOT}\n{history}Request: {query}\nCommands:\n"
    )
}

/// Single user message for the Anthropic messages API.
pub fn build_user_message(query: &str, examples: &[String]) -> String {
    let mut content = String::new();
    if !examples.is_empty() {
        content.push_str("Relevant past commands for context:\n");
        for e in examples {
            content.push_str(&format!("$ {e}\n"));
        }
        content.push('\n');
    }
    content.push_str(&format!("Request: {query}\nCommands:"));
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_ends_with_commands_marker() {
        let p = build_prompt("find large files", &[]);
        assert!(p.ends_with("Request: find large files\nCommands:\n"));
        assert!(p.contains("fuser -k 8080/tcp"));
    }

    #[test]
    fn prompt_includes_history_block_when_present() {
        let examples = vec!["git stash pop".to_string(), "git stash list".to_string()];
        let p = build_prompt("restore stash", &examples);
        assert!(p.contains("User history:\n$ git stash pop\n$ git stash list\n"));
    }

    #[test]
    fn prompt_omits_history_block_when_empty() {
        let p = build_prompt("restore stash", &[]);
        assert!(!p.contains("User history:"));
    }

    #[test]
    fn user_message_with_examples() {
        let examples = vec!["du -sh .".to_string()];
        let m = build_user_message("disk usage", &examples);
        assert!(m.starts_with("Relevant past commands for context:\n$ du -sh .\n"));
        assert!(m.ends_with("Request: disk usage\nCommands:"));
    }

    #[test]
    fn user_message_without_examples() {
        let m = build_user_message("disk usage", &[]);
        assert_eq!(m, "Request: disk usage\nCommands:");
    }
}
