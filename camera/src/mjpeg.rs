use bytes::BytesMut;
use chrono::Utc;
use futures_util::StreamExt;
use motion_watch_common::frame::JpegFrame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, thiserror::Error)]
enum IngestError {
    #[error("HTTP connection failed: {0}")]
    Connect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    Stream(reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
}

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental MJPEG multipart parser.
///
/// Chunks arrive from the network in arbitrary sizes; `push` consumes one
/// chunk and returns every complete JPEG it finished. Partial frames stay
/// buffered until the next boundary shows up.
pub(crate) struct MjpegParser {
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl MjpegParser {
    pub(crate) fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut complete = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        // Discard everything up to and including the boundary
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case the boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        // Discard part headers
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    // The next boundary marks where this JPEG ends
                    if let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY) {
                        let jpeg_end = self.jpeg_start + pos;
                        // Strip trailing \r\n before the boundary
                        let end = if jpeg_end >= 2
                            && self.buffer[jpeg_end - 2] == b'\r'
                            && self.buffer[jpeg_end - 1] == b'\n'
                        {
                            jpeg_end - 2
                        } else {
                            jpeg_end
                        };

                        let jpeg_data = self.buffer[..end].to_vec();
                        let _ = self.buffer.split_to(jpeg_end + BOUNDARY.len());

                        if !jpeg_data.is_empty() {
                            complete.push(jpeg_data);
                        }

                        // Already past the boundary, go to header parsing
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // No boundary yet; remember where to resume scanning
                        self.jpeg_start = if self.buffer.len() > BOUNDARY.len() {
                            self.buffer.len() - BOUNDARY.len()
                        } else {
                            0
                        };
                        break;
                    }
                }
            }
        }

        complete
    }
}

/// Consume the MJPEG stream and keep the latest-frame slot current.
/// Reconnects with exponential backoff until every receiver is gone.
pub(crate) async fn run_stream_ingest(url: String, tx: watch::Sender<Option<Arc<JpegFrame>>>) {
    let mut backoff = Duration::from_secs(2);
    let max_backoff = Duration::from_secs(30);
    let mut seq: u64 = 0;

    loop {
        info!(url, "connecting to MJPEG stream");
        match consume_stream(&url, &tx, &mut seq).await {
            Ok(()) => {
                info!("stream ended, reconnecting");
                backoff = Duration::from_secs(2);
            }
            Err(e) => {
                warn!(error = %e, "stream error, reconnecting in {:?}", backoff);
            }
        }
        if tx.is_closed() {
            debug!("all camera handles dropped, stopping ingest");
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn consume_stream(
    url: &str,
    tx: &watch::Sender<Option<Arc<JpegFrame>>>,
    seq: &mut u64,
) -> Result<(), IngestError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(IngestError::Connect)?;
    let response = client.get(url).send().await.map_err(IngestError::Connect)?;

    if !response.status().is_success() {
        return Err(IngestError::Status(response.status().as_u16()));
    }

    info!(status = %response.status(), "connected to MJPEG stream");

    let mut byte_stream = response.bytes_stream();
    let mut parser = MjpegParser::new();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(IngestError::Stream)?;
        for jpeg_data in parser.push(&chunk) {
            if !publish(tx, jpeg_data, seq) {
                return Ok(());
            }
        }
    }

    Ok(())
}

/// Polling-based fallback: periodically fetch single frames.
pub(crate) async fn run_polling_ingest(
    url: String,
    interval: Duration,
    tx: watch::Sender<Option<Arc<JpegFrame>>>,
) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);
    let mut seq: u64 = 0;

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            debug!("all camera handles dropped, stopping ingest");
            return;
        }

        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(body) => {
                    if !publish(&tx, body.to_vec(), &mut seq) {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to read camera frame body");
                }
            },
            Ok(resp) => {
                warn!(status = %resp.status(), "non-success response from camera");
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch camera frame");
            }
        }
    }
}

/// Store a frame in the latest-frame slot. Returns `false` once every
/// receiver is gone and the ingest loop should stop.
fn publish(tx: &watch::Sender<Option<Arc<JpegFrame>>>, jpeg_data: Vec<u8>, seq: &mut u64) -> bool {
    let now_ms = Utc::now().timestamp_millis();
    let frame = Arc::new(JpegFrame::new(jpeg_data, now_ms, *seq));
    debug!(seq = *seq, bytes = frame.data.len(), "frame ingested");
    *seq += 1;
    tx.send(Some(frame)).is_ok()
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(jpeg: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(BOUNDARY);
        buf.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        buf.extend_from_slice(jpeg);
        buf.extend_from_slice(b"\r\n");
        buf
    }

    #[test]
    fn single_frame_in_one_chunk() {
        let mut parser = MjpegParser::new();
        let mut stream = part(&[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        // Frame is only complete once the next boundary arrives
        assert!(parser.push(&stream).is_empty());
        stream.clear();
        stream.extend_from_slice(BOUNDARY);
        let frames = parser.push(&stream);
        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]]);
    }

    #[test]
    fn frames_reassembled_across_chunk_boundaries() {
        let jpeg_a = vec![0xFF, 0xD8, 0xAA, 0xFF, 0xD9];
        let jpeg_b = vec![0xFF, 0xD8, 0xBB, 0xBB, 0xFF, 0xD9];
        let mut stream = part(&jpeg_a);
        stream.extend_from_slice(&part(&jpeg_b));
        stream.extend_from_slice(BOUNDARY);

        // Feed the stream one byte at a time
        let mut parser = MjpegParser::new();
        let mut frames = Vec::new();
        for byte in stream {
            frames.extend(parser.push(&[byte]));
        }
        assert_eq!(frames, vec![jpeg_a, jpeg_b]);
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let jpeg_a = vec![0xFF, 0xD8, 0x11, 0xFF, 0xD9];
        let jpeg_b = vec![0xFF, 0xD8, 0x22, 0xFF, 0xD9];
        let mut stream = part(&jpeg_a);
        stream.extend_from_slice(&part(&jpeg_b));
        stream.extend_from_slice(BOUNDARY);

        let mut parser = MjpegParser::new();
        let frames = parser.push(&stream);
        assert_eq!(frames, vec![jpeg_a, jpeg_b]);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let jpeg = vec![0xFF, 0xD8, 0x33, 0xFF, 0xD9];
        let mut stream = b"HTTP noise before the first part".to_vec();
        stream.extend_from_slice(&part(&jpeg));
        stream.extend_from_slice(BOUNDARY);

        let mut parser = MjpegParser::new();
        let frames = parser.push(&stream);
        assert_eq!(frames, vec![jpeg]);
    }

    #[test]
    fn empty_part_is_dropped() {
        let mut parser = MjpegParser::new();
        let mut stream = part(&[]);
        stream.extend_from_slice(BOUNDARY);
        assert!(parser.push(&stream).is_empty());
    }

    #[test]
    fn find_subsequence_basics() {
        assert_eq!(find_subsequence(b"abcdef", b"cd"), Some(2));
        assert_eq!(find_subsequence(b"abcdef", b"xy"), None);
    }
}
