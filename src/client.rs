//! Blocking client for the `ask` subcommand: one query line out, candidate
//! lines in until the daemon closes its write side.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use anyhow::Context;

use crate::config::Config;

pub fn ask(config: &Config, query: &str) -> anyhow::Result<()> {
    let socket_path = config.socket_path();
    let mut stream = UnixStream::connect(&socket_path)
        .with_context(|| format!("connecting to daemon at {}", socket_path.display()))?;
    stream.set_write_timeout(Some(Duration::from_secs(2)))?;
    // Candidates can be tens of seconds apart on CPU inference
    stream.set_read_timeout(Some(config.stream_timeout + Duration::from_secs(5)))?;

    let mut request = query.trim().to_string();
    request.push('\n');
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let reader = BufReader::new(&stream);
    for line in reader.lines() {
        println!("{}", line?);
    }
    Ok(())
}
