//! Forwarding of child process output into the `log` facade.
//!
//! Worker output is not structured; the level is guessed from the first token
//! of each line.

use log::Level;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// Level for a line the worker printed on stdout.
pub fn classify_stdout(line: &str) -> Level {
    if line.starts_with("INFO") {
        Level::Info
    } else if line.starts_with("WARN") {
        Level::Warn
    } else {
        Level::Error
    }
}

/// Everything on stderr is an error.
pub fn classify_stderr(_line: &str) -> Level {
    Level::Error
}

/// Log target used for a worker's own output.
pub fn worker_target(service: &str) -> String {
    format!("worker::{}", service)
}

/// Reads `reader` line by line until EOF and logs each line under `target`.
///
/// Chunk boundaries do not matter: partial lines are buffered until the
/// newline (or EOF) arrives. Invalid UTF-8 is replaced, not dropped.
pub fn forward_lines<R>(reader: R, target: String, classify: fn(&str) -> Level) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(reader).split(b'\n');
        loop {
            match segments.next_segment().await {
                Ok(Some(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let line = text.trim_end_matches('\r');
                    if line.is_empty() {
                        continue;
                    }
                    log::log!(target: target.as_str(), classify(line), "{}", line);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!(target: target.as_str(), "output stream closed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Like [`forward_lines`] but everything goes to `debug`.
pub fn forward_debug<R>(reader: R, target: String) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    forward_lines(reader, target, |_| Level::Debug)
}
