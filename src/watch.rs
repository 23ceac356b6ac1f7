//! The watch engine: long-lived streaming of change events into callbacks.
//!
//! A watch session owns one URL, one dedicated connection, and one handler.
//! Events arrive as newline-delimited JSON and are dispatched in stream
//! order from a single background task, so a handler never sees two of its
//! callbacks run concurrently.

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{error::ErrorResponse, executor::Executor, Error, Result};

/// Callbacks a watch session delivers events to.
///
/// Implementations are shared behind an [`Arc`] and invoked sequentially per
/// session. `on_close` fires exactly once, when the stream ends for any
/// reason; re-establishing the watch from there is the caller's choice.
#[async_trait]
pub trait WatchHandler: Send + Sync {
    /// A resource was added
    async fn on_added(&self, obj: Value);
    /// A resource was modified
    async fn on_modified(&self, obj: Value);
    /// A resource was deleted
    async fn on_deleted(&self, obj: Value);
    /// The stream closed; `err` is [`Error::WatchClosed`] on a normal EOF
    async fn on_close(&self, err: Error);
}

/// A raw event from a watch stream.
///
/// Note that a watch query returns many of these as newline separated JSON.
#[derive(Deserialize, Clone)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub(crate) enum WatchEvent {
    Added(Value),
    Modified(Value),
    Deleted(Value),
    /// Progress marker, carries no resource state
    Bookmark(Value),
    Error(ErrorResponse),
}

/// Handle to a running watch session.
///
/// Dropping the handle detaches the session; it keeps running until the
/// stream closes. [`WatchHandle::abort`] cancels the reader task outright.
pub struct WatchHandle {
    url: String,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// The watch URL this session streams from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Cancel the reader task. The underlying connection closes with it;
    /// no further callbacks fire.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait until the session ends.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Open the stream and spawn the reader task.
///
/// Connection failures surface here, before anything is spawned, so callers
/// can retry; everything after the connect is reported through `on_close`.
pub(crate) async fn spawn(
    executor: Executor,
    url: String,
    handler: Arc<dyn WatchHandler>,
) -> Result<WatchHandle> {
    let response = executor.open_stream(&url).await?;
    let task_url = url.clone();
    let task = tokio::spawn(async move {
        let err = match consume_stream(response, &*handler).await {
            Ok(()) => Error::WatchClosed,
            Err(err) => err,
        };
        debug!(url = %task_url, %err, "watch session ended");
        handler.on_close(err).await;
    });
    Ok(WatchHandle { url, task })
}

async fn consume_stream(response: reqwest::Response, handler: &dyn WatchHandler) -> Result<()> {
    let mut events = Box::pin(event_stream(response));
    while let Some(event) = events.try_next().await? {
        dispatch(event, handler).await?;
    }
    Ok(())
}

/// Unfold the chunked response into a stream of watch events.
///
/// Chunks are buffered until a newline completes a record, and one chunk may
/// complete several records at once, so each unfold step yields a batch that
/// is then flattened into the event stream. Transport failures and records
/// that fail to parse surface as stream errors, which are fatal to the
/// session.
fn event_stream(response: reqwest::Response) -> impl Stream<Item = Result<WatchEvent>> {
    futures::stream::try_unfold(
        (response, Vec::new()),
        |(mut response, mut buffer)| async move {
            loop {
                match response.chunk().await? {
                    Some(chunk) => {
                        let records: Vec<Result<WatchEvent>> = split_lines(&mut buffer, &chunk)
                            .iter()
                            .map(|line| serde_json::from_slice(line).map_err(Error::SerdeError))
                            .collect();
                        if !records.is_empty() {
                            return Ok::<_, Error>(Some((records, (response, buffer))));
                        }
                    }
                    None => return Ok(None),
                }
            }
        },
    )
    .map_ok(futures::stream::iter)
    .try_flatten()
}

/// Frame newline-delimited records across chunk boundaries; `buffer` keeps
/// the trailing partial line between calls.
fn split_lines(buffer: &mut Vec<u8>, chunk: &[u8]) -> Vec<Vec<u8>> {
    buffer.extend_from_slice(chunk);
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = buffer.drain(..=pos).collect();
        line.pop();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Route one event to the handler. An `ERROR` event is fatal to the session.
async fn dispatch(event: WatchEvent, handler: &dyn WatchHandler) -> Result<()> {
    match event {
        WatchEvent::Added(obj) => handler.on_added(obj).await,
        WatchEvent::Modified(obj) => handler.on_modified(obj).await,
        WatchEvent::Deleted(obj) => handler.on_deleted(obj).await,
        WatchEvent::Bookmark(_) => {}
        WatchEvent::Error(err) => return Err(Error::Api(err)),
    }
    Ok(())
}
