use crate::BoxError;
use crate::error::ProxyError;
use crate::upstream::ByteStream;
use bytes::Bytes;
use common::text::{PREVIEW_BYTES, preview};
use faststr::FastStr;
use futures_util::StreamExt;
use http_body::Frame;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

pub type OutboundFrame = Result<Frame<Bytes>, BoxError>;

const TAP_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapOutcome {
    Complete,
    TimedOut,
    UpstreamError(FastStr),
    /// The browser went away, nobody is reading the outbound side.
    ReceiverGone,
}

#[derive(Debug, Clone, Copy)]
pub struct TapStats {
    pub chunks:  u64,
    pub bytes:   u64,
    pub started: Instant,
}

impl TapStats {
    fn new() -> Self {
        Self {
            chunks:  0,
            bytes:   0,
            started: Instant::now(),
        }
    }

    fn record(&mut self, chunk: &Bytes) {
        self.chunks += 1;
        self.bytes += chunk.len() as u64;
    }

    pub fn average_chunk_size(&self) -> f64 {
        self.bytes as f64 / self.chunks.max(1) as f64
    }

    pub fn bytes_per_second(&self, elapsed: Duration) -> f64 {
        self.bytes as f64 / elapsed.as_secs_f64().max(0.001)
    }
}

/// Pipes `upstream` into a fresh channel, counting what goes through. The
/// bytes are not modified. If the upstream has not finished within
/// `stream_timeout` the outbound side receives an error frame, which tears
/// the response down.
pub fn spawn(
    request_id: FastStr,
    upstream: ByteStream,
    stream_timeout: Duration,
) -> Receiver<OutboundFrame> {
    let (tx, rx) = mpsc::channel(TAP_BUFFER);
    tokio::spawn(async move {
        info!(request_id = %request_id, "stream transform started");
        let mut stats = TapStats::new();
        let outcome = match timeout(stream_timeout, pump(&request_id, upstream, &tx, &mut stats)).await
        {
            Ok(outcome) => outcome,
            Err(_) => TapOutcome::TimedOut,
        };

        let abort = match &outcome {
            TapOutcome::TimedOut => Some(ProxyError::StreamTimeout(stream_timeout)),
            TapOutcome::UpstreamError(e) => Some(ProxyError::Stream(e.clone())),
            TapOutcome::Complete | TapOutcome::ReceiverGone => None,
        };
        if let Some(err) = abort {
            warn!(
                request_id = %request_id,
                error = %err,
                chunks = stats.chunks,
                bytes_processed = stats.bytes,
                duration_ms = stats.started.elapsed().as_millis() as u64,
                "stream aborted"
            );
            let _ = tx.send(Err(Box::new(err))).await;
        }

        let elapsed = stats.started.elapsed();
        info!(
            request_id = %request_id,
            outcome = ?outcome,
            total_chunks = stats.chunks,
            total_bytes = stats.bytes,
            stream_duration_ms = elapsed.as_millis() as u64,
            average_chunk_size = stats.average_chunk_size(),
            bytes_per_second = stats.bytes_per_second(elapsed),
            "stream ended"
        );
    });
    rx
}

async fn pump(
    request_id: &str,
    mut upstream: ByteStream,
    tx: &Sender<OutboundFrame>,
    stats: &mut TapStats,
) -> TapOutcome {
    while let Some(chunk) = upstream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return TapOutcome::UpstreamError(e.to_string().into()),
        };
        stats.record(&chunk);
        debug!(
            request_id = %request_id,
            chunk = stats.chunks,
            chunk_size = chunk.len(),
            total_bytes_processed = stats.bytes,
            time_elapsed_ms = stats.started.elapsed().as_millis() as u64,
            chunk_preview = %preview(&chunk, PREVIEW_BYTES),
            "received chunk"
        );
        if tx.send(Ok(Frame::data(chunk))).await.is_err() {
            warn!(request_id = %request_id, "outbound receiver dropped, stop reading upstream");
            return TapOutcome::ReceiverGone;
        }
    }
    info!(
        request_id = %request_id,
        total_chunks = stats.chunks,
        total_bytes = stats.bytes,
        "stream transform completed"
    );
    TapOutcome::Complete
}
