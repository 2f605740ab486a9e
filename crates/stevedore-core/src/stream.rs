//! Long-lived event and log streams.
//!
//! Each stream is pumped by one background task:
//!
//! ```text
//! Opening ──▶ Streaming ──▶ Closed
//!    │            │ EOF, cancel, consumer gone, read error
//!    └─ open error: one Err item, then Closed
//! ```
//!
//! Units are read line by line from the response body and published into a
//! bounded channel. Lines are capped at [`MAX_LINE_LENGTH`] bytes: an event
//! line over the cap is skipped, a log line over it ends the stream with
//! [`ClientError::LineTooLong`]. A full channel blocks the producer; nothing is dropped.
//! Cancelling the stream's [`CancellationToken`] closes its connection and
//! channel and touches nothing else.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::framing::{self, Frame, MAX_LINE_LENGTH};
use crate::request::{Method, NO_BODY, RequestExecutor};
use crate::types::Event;

/// Receiving end of an event or log stream.
///
/// Yields `Ok` items in daemon emission order. A failure to open the stream
/// or to keep reading it arrives as a single terminal `Err`. `None` means the
/// stream is closed.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T, ClientError>>,
}

impl<T> Subscription<T> {
    /// Receive the next item, or `None` once the stream has closed.
    pub async fn next(&mut self) -> Option<Result<T, ClientError>> {
        self.rx.recv().await
    }

    /// Number of items buffered and not yet received.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no items are waiting to be received.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Channel capacity.
    pub fn capacity(&self) -> usize {
        self.rx.max_capacity()
    }

    /// Unwrap the underlying channel receiver. Dropping it closes the
    /// stream just like dropping the subscription.
    pub fn into_inner(self) -> mpsc::Receiver<Result<T, ClientError>> {
        self.rx
    }
}

impl<T> From<mpsc::Receiver<Result<T, ClientError>>> for Subscription<T> {
    fn from(rx: mpsc::Receiver<Result<T, ClientError>>) -> Self {
        Self { rx }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start streaming `GET /events`.
pub(crate) fn events(
    executor: RequestExecutor,
    buffer: usize,
    cancel: CancellationToken,
) -> Subscription<Event> {
    spawn_pump(executor, "/events".to_string(), buffer, cancel)
}

/// Start streaming a container's log output from `uri`.
pub(crate) fn logs(
    executor: RequestExecutor,
    uri: String,
    buffer: usize,
    cancel: CancellationToken,
) -> Subscription<String> {
    spawn_pump(executor, uri, buffer, cancel)
}

/// An item a stream is made of, decoded from one line of the body.
trait StreamUnit: Sized + Send + 'static {
    /// Stream name used in logs.
    const KIND: &'static str;

    /// Whether an over-long line is dropped instead of ending the stream.
    const SKIP_OVERSIZED: bool;

    /// Decode one line, or `None` to skip it.
    fn decode(line: &[u8]) -> Option<Self>;
}

impl StreamUnit for Event {
    const KIND: &'static str = "events";
    const SKIP_OVERSIZED: bool = true;

    fn decode(line: &[u8]) -> Option<Self> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        match serde_json::from_slice(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "cannot decode event, skipping");
                None
            }
        }
    }
}

impl StreamUnit for String {
    const KIND: &'static str = "logs";
    const SKIP_OVERSIZED: bool = false;

    fn decode(line: &[u8]) -> Option<Self> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Some(String::from_utf8_lossy(line).into_owned())
    }
}

fn spawn_pump<T: StreamUnit>(
    executor: RequestExecutor,
    uri: String,
    buffer: usize,
    cancel: CancellationToken,
) -> Subscription<T> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(pump(executor, uri, tx, cancel));
    Subscription { rx }
}

async fn pump<T: StreamUnit>(
    executor: RequestExecutor,
    uri: String,
    tx: mpsc::Sender<Result<T, ClientError>>,
    cancel: CancellationToken,
) {
    let kind = T::KIND;
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = executor.execute(Method::Get, &uri, NO_BODY) => opened,
    };
    let (body, connection) = match opened {
        Ok(pair) => pair,
        Err(e) => {
            warn!(stream = kind, error = %e, "failed to open stream");
            let _ = tx.send(Err(e)).await;
            return;
        }
    };
    debug!(stream = kind, %uri, "stream opened");

    let mut frames = framing::lines(body);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(stream = kind, "stream cancelled");
                break;
            }
            _ = tx.closed() => {
                debug!(stream = kind, "consumer went away");
                break;
            }
            next = frames.next() => next,
        };

        let item = match next {
            None => break,
            Some(Ok(Frame::Line(line))) => match T::decode(&line) {
                Some(item) => Ok(item),
                None => continue,
            },
            Some(Ok(Frame::Oversized)) if T::SKIP_OVERSIZED => {
                warn!(stream = kind, limit = MAX_LINE_LENGTH, "line too long, skipping");
                continue;
            }
            Some(Ok(Frame::Oversized)) => Err(ClientError::LineTooLong {
                limit: MAX_LINE_LENGTH,
            }),
            Some(Err(e)) => Err(ClientError::Io(e)),
        };

        // An error item is the last one the stream delivers
        let terminal = item.is_err();
        if let Err(e) = &item {
            warn!(stream = kind, error = %e, "stream read failed");
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(item) => {
                if sent.is_err() {
                    break;
                }
            }
        }
        if terminal {
            break;
        }
    }

    drop(frames);
    connection.close();
    info!(stream = kind, "closing stream");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_event_skips_blank_and_malformed() {
        assert_eq!(Event::decode(b""), None);
        assert_eq!(Event::decode(b"   "), None);
        assert_eq!(Event::decode(b"{not json"), None);

        let event = Event::decode(br#"{"id":"c1","status":"die"}"#).unwrap();
        assert_eq!(event.container_id, "c1");
        assert_eq!(event.status, "die");
    }

    #[test]
    fn test_decode_log_line_keeps_empty_lines_and_bad_utf8() {
        assert_eq!(String::decode(b""), Some(String::new()));
        assert_eq!(String::decode(b"crlf\r"), Some("crlf".to_string()));
        assert_eq!(String::decode(b"ok \xff"), Some("ok \u{fffd}".to_string()));
    }

    #[test]
    fn test_oversized_policy_per_stream() {
        assert!(<Event as StreamUnit>::SKIP_OVERSIZED);
        assert!(!<String as StreamUnit>::SKIP_OVERSIZED);
    }

    #[tokio::test]
    async fn test_subscription_from_receiver() {
        let (tx, rx) = mpsc::channel::<Result<u32, ClientError>>(4);
        let mut sub = Subscription::from(rx);
        tx.send(Ok(7)).await.unwrap();
        drop(tx);

        assert_eq!(sub.capacity(), 4);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.next().await.unwrap().unwrap(), 7);
        assert!(sub.next().await.is_none());
    }
}
