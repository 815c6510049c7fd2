//! 📖 The NDJSON feeder — hauls lines out of a file or stdin like a digital fishing trip
//! and hands each one to [`IngestClient::write`].
//!
//! Lines are split with `memchr` on raw bytes, so a line that isn't valid UTF-8 still
//! reaches the normalizer (which will turn it into a perfectly good error record).
//! Empty and whitespace-only lines are skipped. `\r\n` endings lose their `\r`.

use anyhow::{Context, Result};
use memchr::memchr_iter;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::client::IngestClient;

const READ_CHUNK: usize = 64 * 1024;

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        &[]
    } else {
        line
    }
}

/// 📖 Stream `reader` to EOF, writing one record per non-empty line.
/// Returns how many lines were written. Stops at the first write error.
pub async fn feed<R: AsyncRead + Unpin>(client: &IngestClient, mut reader: R) -> Result<u64> {
    let mut pending: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut lines = 0u64;

    loop {
        let read = reader
            .read(&mut chunk)
            .await
            .context("💀 the input stream stopped talking to us mid-sentence")?;
        if read == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..read]);

        let mut consumed = 0;
        for newline in memchr_iter(b'\n', &pending) {
            let line = trim_line(&pending[consumed..newline]);
            consumed = newline + 1;
            if line.is_empty() {
                continue;
            }
            client.write(line).await?;
            lines += 1;
        }
        pending.drain(..consumed);
        trace!(lines, carried = pending.len(), "📖 chunk fed");
    }

    // -- the last line doesn't owe us a newline
    let tail = trim_line(&pending);
    if !tail.is_empty() {
        client.write(tail).await?;
        lines += 1;
    }

    debug!(lines, "📖 input exhausted");
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryBackend;
    use crate::client::IngestionPolicy;
    use crate::index_name::IndexTemplate;
    use crate::router::Router;
    use std::sync::Arc;

    fn started_client(backend: &InMemoryBackend) -> IngestClient {
        let the_client = IngestClient::new(
            IngestionPolicy::default(),
            Router::new(IndexTemplate::constant("logs").unwrap()).into_shared(),
            Arc::new(backend.clone()),
        )
        .unwrap();
        the_client.start();
        the_client
    }

    #[test]
    fn the_one_where_crlf_and_blank_lines_get_tidied() {
        assert_eq!(trim_line(b"{\"a\":1}\r"), b"{\"a\":1}");
        assert!(trim_line(b"   \t").is_empty());
        assert!(trim_line(b"\r").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_every_real_line_becomes_a_write() {
        let the_backend = InMemoryBackend::new();
        let the_client = started_client(&the_backend);
        let the_input: &[u8] = b"{\"n\":1}\r\n\n   \n{\"n\":2}\nnot json\n{\"n\":3}";

        let the_lines = feed(&the_client, the_input).await.unwrap();
        assert_eq!(the_lines, 4, "the unterminated last line still counts");

        the_client.wait_idle().await;
        let the_documents = the_backend.documents().await;
        assert_eq!(the_documents.len(), 4);
        assert_eq!(the_documents.iter().filter(|r| r.doc.contains_key("@error")).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_lines_straddle_chunk_boundaries() {
        let the_backend = InMemoryBackend::new();
        let the_client = started_client(&the_backend);
        let the_big_value = "x".repeat(READ_CHUNK + 17);
        let the_input = format!("{{\"big\":\"{}\"}}\n{{\"small\":true}}\n", the_big_value);

        let the_lines = feed(&the_client, the_input.as_bytes()).await.unwrap();
        assert_eq!(the_lines, 2);

        the_client.wait_idle().await;
        let the_documents = the_backend.documents().await;
        assert!(the_documents
            .iter()
            .any(|r| r.doc.get("big").and_then(|v| v.as_str()) == Some(the_big_value.as_str())));
    }

    #[tokio::test]
    async fn the_one_where_a_closed_client_stops_the_feed() {
        let the_backend = InMemoryBackend::new();
        let the_client = started_client(&the_backend);
        the_client.close().unwrap();

        let the_input: &[u8] = b"{}\n{}\n";
        assert!(feed(&the_client, the_input).await.is_err());
    }
}
