use crate::events::SubscriptionGuard;
use crate::heap::HeapSnapshot;
use crate::protocol::{RuntimeKind, HEAP_SNAPSHOT_CHUNK, HEAP_SNAPSHOT_PROGRESS};
use crate::types::{SnapshotProgress, TakeHeapSnapshotRequest};
use crate::{CdpSession, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep_until, timeout_at, Instant};

pub async fn enable_heap_profiler(session: &CdpSession) -> Result<()> {
    session.send("HeapProfiler.enable", None).await?;
    Ok(())
}

/// Accumulated snapshot text.
#[derive(Default)]
struct Chunks {
    payload: String,
    count: usize,
}

impl Chunks {
    fn push(&mut self, params: Value) {
        if let Some(chunk) = params.get("chunk").and_then(Value::as_str) {
            self.payload.push_str(chunk);
            self.count += 1;
            if self.count % 100 == 0 {
                tracing::debug!("Received {} heap snapshot chunks", self.count);
            }
        }
    }

    fn drain(&mut self, rx: &mut UnboundedReceiver<Value>) {
        while let Ok(params) = rx.try_recv() {
            self.push(params);
        }
    }
}

/// Requests a heap snapshot and reassembles the chunks the runtime streams
/// back as events.
///
/// The runtime gives no reliable end-of-stream marker. With `report_progress`
/// the capture ends on a progress event flagged `finished`; without it, once no
/// chunk has arrived for the configured settle window. Both are bounded by the
/// snapshot progress timeout, after which whatever arrived is returned. An
/// empty string means the runtime sent nothing.
pub async fn take_heap_snapshot(session: &CdpSession, report_progress: bool) -> Result<String> {
    if session.runtime_kind() == RuntimeKind::Deno {
        tracing::warn!(
            "Deno's inspector is known not to stream heap snapshot chunks; expect an empty snapshot"
        );
    }

    enable_heap_profiler(session).await?;

    let mut guard = SubscriptionGuard::new(session.registry());
    let (chunk_sub, mut chunk_rx) = session.subscribe_channel(HEAP_SNAPSHOT_CHUNK);
    guard.track(chunk_sub);
    let mut progress_rx = if report_progress {
        let (progress_sub, rx) = session.subscribe_channel(HEAP_SNAPSHOT_PROGRESS);
        guard.track(progress_sub);
        Some(rx)
    } else {
        None
    };

    let request = serde_json::to_value(TakeHeapSnapshotRequest { report_progress })?;
    let mut command = session
        .send_begin("HeapProfiler.takeHeapSnapshot", Some(request))
        .await?;

    let config = session.config();
    let deadline = Instant::now() + config.snapshot_progress_timeout;
    let mut chunks = Chunks::default();

    let completed = match progress_rx.as_mut() {
        Some(progress_rx) => {
            wait_for_finished(&mut chunk_rx, progress_rx, &mut chunks, deadline).await
        }
        None => {
            wait_for_quiet(&mut chunk_rx, &mut chunks, config.snapshot_settle_window, deadline)
                .await
        }
    };
    chunks.drain(&mut chunk_rx);
    drop(guard);

    if !completed {
        tracing::warn!(
            "Heap snapshot capture hit its {:?} deadline with {} chunk(s), {} bytes",
            config.snapshot_progress_timeout,
            chunks.count,
            chunks.payload.len()
        );
    } else if chunks.payload.is_empty() {
        tracing::warn!("Heap snapshot capture finished without receiving any chunks");
    } else {
        tracing::info!(
            "Heap snapshot captured: {} chunk(s), {} bytes",
            chunks.count,
            chunks.payload.len()
        );
    }

    if let Some(Err(e)) = command.try_result() {
        tracing::warn!("HeapProfiler.takeHeapSnapshot failed: {}", e);
    }

    Ok(chunks.payload)
}

/// Returns false when the deadline passes before a `finished` progress event.
async fn wait_for_finished(
    chunk_rx: &mut UnboundedReceiver<Value>,
    progress_rx: &mut UnboundedReceiver<Value>,
    chunks: &mut Chunks,
    deadline: Instant,
) -> bool {
    loop {
        tokio::select! {
            biased;
            chunk = chunk_rx.recv() => match chunk {
                Some(params) => chunks.push(params),
                None => return false,
            },
            update = progress_rx.recv() => match update {
                Some(params) => {
                    let progress: SnapshotProgress =
                        serde_json::from_value(params).unwrap_or_default();
                    tracing::debug!("Heap snapshot progress: {}/{}", progress.done, progress.total);
                    if progress.finished {
                        return true;
                    }
                }
                None => return false,
            },
            _ = sleep_until(deadline) => return false,
        }
    }
}

/// Returns true once a full `settle` window passes without a chunk, false
/// when the deadline cuts the wait short.
async fn wait_for_quiet(
    chunk_rx: &mut UnboundedReceiver<Value>,
    chunks: &mut Chunks,
    settle: Duration,
    deadline: Instant,
) -> bool {
    loop {
        let quiet_until = Instant::now() + settle;
        let wake = quiet_until.min(deadline);
        match timeout_at(wake, chunk_rx.recv()).await {
            Ok(Some(params)) => chunks.push(params),
            Ok(None) => return false,
            Err(_) => return quiet_until <= deadline,
        }
    }
}

/// [`take_heap_snapshot`] followed by parsing. `None` when the runtime sent no data.
pub async fn capture_snapshot(
    session: &CdpSession,
    report_progress: bool,
) -> Result<Option<HeapSnapshot>> {
    let payload = take_heap_snapshot(session, report_progress).await?;
    if payload.is_empty() {
        return Ok(None);
    }
    HeapSnapshot::from_json_str(&payload).map(Some)
}
