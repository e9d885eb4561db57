//! Chunk streams: a bounded single-producer / single-consumer channel of
//! typed chunks, with filtering, back-pressure, cancellation, and a terminal
//! result.
//!
//! [`ChunkStream::channel`] returns the consumer handle and the producer
//! handle bound to a parent cancellation scope. The writer assigns strictly
//! increasing 0-based indices to the chunks that pass its filter, so the
//! consumer always observes contiguous indices in write order. `wait()`
//! synchronizes after close and returns the terminal [`RunResult`] set by the
//! producer, or the close error.
//!
//! # Cancellation
//!
//! `cancel()` and the optional stream timeout collapse into one cancellation
//! scope: a producer blocked in `write` wakes with a cancellation error, the
//! consumer sees the channel close once the writer is dropped, and `wait`
//! returns the stored error.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use stream_chunk::{Chunk, ChunkData, StreamMetadata};

use crate::error::AgentError;
use crate::options::StreamOptions;
use crate::result::RunResult;

#[derive(Default)]
struct State {
    next_index: u64,
    closed: bool,
    result: Option<RunResult>,
    error: Option<AgentError>,
}

struct Shared {
    metadata: StreamMetadata,
    state: Mutex<State>,
    done: Notify,
    cancel: CancellationToken,
}

impl Shared {
    /// Marks the stream closed (idempotent) and wakes waiters. The scope
    /// token is cancelled so the timeout watchdog and blocked writers stop.
    fn close(&self, error: Option<AgentError>) {
        {
            let mut state = self.state.lock().expect("stream state lock");
            if state.closed {
                return;
            }
            state.closed = true;
            if state.error.is_none() {
                state.error = error;
            }
        }
        self.done.notify_waiters();
        self.cancel.cancel();
    }

    /// Stores `error` (unless one is already set) and cancels the scope
    /// without closing; the producer notices and closes on its way out.
    fn cancel_with(&self, error: AgentError) {
        {
            let mut state = self.state.lock().expect("stream state lock");
            if !state.closed && state.error.is_none() {
                state.error = Some(error);
            }
        }
        self.cancel.cancel();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().expect("stream state lock").closed
    }
}

/// Producer handle. Writes assign indices, apply filtering, and respect the
/// stream's cancellation scope. Writing after close is a silent no-op.
pub struct ChunkWriter {
    tx: mpsc::Sender<Chunk>,
    shared: Arc<Shared>,
    options: StreamOptions,
}

impl ChunkWriter {
    /// Appends a chunk. Filtered-out kinds are dropped silently and consume
    /// no index. A handler returning `false` cancels the stream.
    pub async fn write(&self, data: ChunkData) -> Result<(), AgentError> {
        self.send(data, HashMap::new(), Utc::now()).await
    }

    /// Re-emits an existing chunk (workflow step forwarding). The chunk keeps
    /// its payload, metadata, and timestamp but is re-indexed into this
    /// stream's sequence so consumer-observed indices stay monotonic.
    pub async fn forward(&self, chunk: Chunk) -> Result<(), AgentError> {
        self.send(chunk.data, chunk.metadata, chunk.timestamp).await
    }

    async fn send(
        &self,
        data: ChunkData,
        metadata: HashMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), AgentError> {
        if !self.options.allows(data.kind()) {
            return Ok(());
        }
        let index = {
            let mut state = self.shared.state.lock().expect("stream state lock");
            if state.closed {
                return Ok(());
            }
            let index = state.next_index;
            state.next_index += 1;
            index
        };
        let chunk = Chunk {
            index,
            timestamp,
            data,
            metadata,
        };
        if let Some(handler) = &self.options.handler {
            // A panicking handler must not crash the producer: report it and
            // let the chunk through.
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&chunk))) {
                Ok(true) => {}
                Ok(false) => {
                    self.shared
                        .cancel_with(AgentError::Cancelled("chunk handler requested stop".into()));
                    return Err(AgentError::Cancelled("chunk handler requested stop".into()));
                }
                Err(payload) => {
                    warn!(
                        panic = %crate::error::panic_message(payload.as_ref()),
                        "chunk handler panicked, passing chunk through"
                    );
                }
            }
        }
        tokio::select! {
            _ = self.shared.cancel.cancelled() => {
                Err(AgentError::Cancelled("stream cancelled".into()))
            }
            sent = self.tx.send(chunk) => {
                sent.map_err(|_| AgentError::Cancelled("stream consumer dropped".into()))
            }
        }
    }

    /// Sets the terminal result returned by `wait()`. Call before `close`.
    pub fn set_result(&self, result: RunResult) {
        let mut state = self.shared.state.lock().expect("stream state lock");
        if !state.closed {
            state.result = Some(result);
        }
    }

    /// Marks clean completion.
    pub fn close(&self) {
        self.shared.close(None);
    }

    /// Marks failed completion; `wait()` returns `error`.
    pub fn close_with_error(&self, error: AgentError) {
        self.shared.close(Some(error));
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// The stream's cancellation scope, for producers to run work under.
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}

impl Drop for ChunkWriter {
    /// A writer dropped without closing still releases waiters; this counts
    /// as failed completion unless an error is already stored.
    fn drop(&mut self) {
        if !self.shared.is_closed() {
            self.shared.close(Some(AgentError::Cancelled(
                "stream writer dropped before close".into(),
            )));
        }
    }
}

/// Consumer handle: chunks in producer order plus the terminal result.
pub struct ChunkStream {
    rx: mpsc::Receiver<Chunk>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("metadata", &self.shared.metadata)
            .finish()
    }
}

impl ChunkStream {
    /// Creates a stream bound to `parent`'s cancellation scope. A configured
    /// timeout is armed immediately and surfaces as a `timeout` error.
    pub fn channel(
        metadata: StreamMetadata,
        options: StreamOptions,
        parent: &CancellationToken,
    ) -> (ChunkStream, ChunkWriter) {
        let cancel = parent.child_token();
        let (tx, rx) = mpsc::channel(options.buffer_capacity.max(1));
        let shared = Arc::new(Shared {
            metadata,
            state: Mutex::new(State::default()),
            done: Notify::new(),
            cancel,
        });
        if let Some(timeout) = options.timeout {
            let watchdog = Arc::clone(&shared);
            tokio::spawn(async move {
                tokio::select! {
                    _ = watchdog.cancel.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        watchdog.cancel_with(AgentError::Timeout(timeout));
                    }
                }
            });
        }
        (
            ChunkStream {
                rx,
                shared: Arc::clone(&shared),
            },
            ChunkWriter {
                tx,
                shared,
                options,
            },
        )
    }

    /// Wraps an existing stream, applying `enrich` to every chunk without
    /// re-indexing or filtering. The wrapper shares the inner cancellation
    /// scope, so cancelling the outer stream reaches the inner producer; the
    /// inner terminal result and close error pass through unchanged.
    pub fn wrap<F>(mut inner: ChunkStream, enrich: F) -> ChunkStream
    where
        F: Fn(&mut Chunk) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            metadata: inner.shared.metadata.clone(),
            state: Mutex::new(State::default()),
            done: Notify::new(),
            cancel: inner.shared.cancel.clone(),
        });
        let (tx, rx) = mpsc::channel(crate::options::DEFAULT_BUFFER_CAPACITY);
        let forward = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(mut chunk) = inner.recv().await {
                enrich(&mut chunk);
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            match inner.wait().await {
                Ok(result) => {
                    forward
                        .state
                        .lock()
                        .expect("stream state lock")
                        .result = Some(result);
                    forward.close(None);
                }
                Err(e) => forward.close(Some(e)),
            }
        });
        ChunkStream { rx, shared }
    }

    /// Next chunk in producer order; `None` once the producer is done.
    pub async fn recv(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.shared.metadata
    }

    /// Signals the producer to stop. `wait()` then reports a
    /// cancellation-kind error.
    pub fn cancel(&self) {
        self.shared
            .cancel_with(AgentError::Cancelled("cancelled by consumer".into()));
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Blocks until the producer closes the stream, then returns the terminal
    /// result or the close error. Always observed-after every chunk write.
    pub async fn wait(&mut self) -> Result<RunResult, AgentError> {
        loop {
            let notified = self.shared.done.notified();
            if self.shared.is_closed() {
                break;
            }
            notified.await;
        }
        let mut state = self.shared.state.lock().expect("stream state lock");
        if let Some(error) = state.error.take() {
            return Err(error);
        }
        Ok(state
            .result
            .clone()
            .unwrap_or_else(|| RunResult::new(String::new())))
    }

    /// Byte-stream view concatenating only `text` and `delta` payloads.
    pub fn into_reader(self) -> impl tokio::io::AsyncRead {
        use tokio_stream::StreamExt as _;
        let bytes = self.filter_map(|chunk| {
            chunk
                .text_payload()
                .map(|t| Ok::<_, std::io::Error>(tokio_util::bytes::Bytes::from(t.to_string())))
        });
        tokio_util::io::StreamReader::new(bytes)
    }
}

impl tokio_stream::Stream for ChunkStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        self.rx.poll_recv(cx)
    }
}
