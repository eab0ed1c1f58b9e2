//! Reading the input stream and feeding it to the broadcaster.

use std::{io, path::Path, sync::Arc};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead};
use tracing::debug;

use crate::broadcaster::Broadcaster;

const DELIMITER: u8 = b'\n';

/// Boxed input so files and stdin share one code path.
pub type Input = Box<dyn AsyncRead + Send + Unpin>;

/// Counters reported once the input is exhausted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub lines: u64,
    pub bytes: u64,
    /// Bytes after the last newline, which are never broadcast.
    pub discarded_bytes: u64,
}

/// Opens `path`, or standard input when there is no path.
pub async fn open_input(path: Option<&Path>) -> Result<Input> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdin())),
    }
}

/// Reads `reader` line by line until end-of-stream, broadcasting each line
/// before reading the next.
///
/// Returns once the stream is exhausted; it is never polled again. A read
/// error ends the pump and is returned as-is.
pub async fn pump_lines<R>(mut reader: R, broadcaster: &Broadcaster) -> io::Result<PumpStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = PumpStats::default();
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        let bytes = reader.read_until(DELIMITER, &mut buffer).await?;
        if bytes == 0 {
            return Ok(stats);
        }

        if buffer.last() != Some(&DELIMITER) {
            // Unterminated tail at end-of-stream.
            debug!(bytes, "discarding incomplete final line");
            stats.discarded_bytes += bytes as u64;
            return Ok(stats);
        }

        stats.lines += 1;
        stats.bytes += bytes as u64;
        broadcaster.broadcast(Arc::from(buffer.as_slice()));
    }
}
