//! Server-Sent Events decoding for Responses streams.
//!
//! The endpoint answers a streaming request with an SSE body:
//!
//! ```text
//! event: response.output_text.delta
//! data: {"type":"response.output_text.delta","sequence_number":4,"item_id":"msg_1",...}
//!
//! data: [DONE]
//! ```
//!
//! Framing (line splitting, multi-line `data:` fields, comments, chunk
//! boundaries that fall mid-line or mid-UTF-8 sequence) is delegated to
//! `eventsource-stream`. This module adds the Responses-specific layer on top:
//!
//! - every non-empty data payload is decoded through the event catalog in
//!   [`events`](crate::events), keyed by its JSON `type` field, so the SSE
//!   `event:` name is informational only
//! - the literal payload `[DONE]` ends the stream cleanly
//! - the first malformed payload or transport failure ends the stream with an
//!   error; nothing is yielded after it
//! - bytes are counted as they arrive so that streaming failures can report how
//!   much of the body was received
//!
//! The output is a forward-only stream. Events are yielded in wire order.

use crate::events::{StreamingEvent, decode_event};
use crate::{Error, Result};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{self, Stream, StreamExt};
use std::future::ready;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// End-of-stream sentinel sent by OpenAI-compatible servers
pub const DONE_SENTINEL: &str = "[DONE]";

/// Stream of decoded events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamingEvent>> + Send>>;

/// What to do with an event whose discriminator is not in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownEventPolicy {
    /// Yield it as [`StreamingEvent::Unknown`] and keep going
    #[default]
    Ignore,
    /// End the stream with a parsing error
    Fail,
}

/// Decodes an SSE byte stream into [`StreamingEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventStreamParser {
    unknown_events: UnknownEventPolicy,
    bytes_received: Arc<AtomicU64>,
}

impl EventStreamParser {
    pub fn new(unknown_events: UnknownEventPolicy) -> Self {
        Self {
            unknown_events,
            bytes_received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total bytes read from every stream this parser has decoded.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Decode a raw byte stream.
    ///
    /// Transport errors from the byte stream are reported as
    /// [`ErrorKind::ConnectionDropped`](crate::ErrorKind::ConnectionDropped).
    pub fn parse<S, B, E>(&self, bytes: S) -> EventStream
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let counter = Arc::clone(&self.bytes_received);
        let policy = self.unknown_events;

        let counted = bytes.inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                counter.fetch_add(chunk.as_ref().len() as u64, Ordering::Relaxed);
            }
        });

        let events = counted
            .eventsource()
            .scan(false, move |finished, frame| {
                if *finished {
                    return ready(None);
                }

                let item = match frame {
                    Ok(frame) => {
                        let data = frame.data.trim();
                        if data.is_empty() {
                            None
                        } else if data == DONE_SENTINEL {
                            log::debug!("Received stream end sentinel");
                            return ready(None);
                        } else {
                            let decoded = decode_frame(data, policy);
                            *finished = decoded.is_err();
                            Some(decoded)
                        }
                    }
                    Err(err) => {
                        *finished = true;
                        Some(Err(map_frame_error(err)))
                    }
                };

                ready(Some(item))
            })
            .filter_map(ready);

        Box::pin(events)
    }
}

fn decode_frame(data: &str, policy: UnknownEventPolicy) -> Result<StreamingEvent> {
    let event = decode_event(data)?;

    if let StreamingEvent::Unknown(unknown) = &event {
        match policy {
            UnknownEventPolicy::Ignore => {
                log::warn!(
                    "Ignoring unknown stream event '{}' (sequence {})",
                    unknown.event_type,
                    unknown.sequence_number
                );
            }
            UnknownEventPolicy::Fail => {
                return Err(Error::parsing(format!(
                    "Unknown stream event '{}'",
                    unknown.event_type
                )));
            }
        }
    }

    Ok(event)
}

fn map_frame_error<E>(err: EventStreamError<E>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err {
        EventStreamError::Transport(source) => {
            Error::connection_dropped(source.to_string()).with_source(source)
        }
        EventStreamError::Utf8(source) => {
            Error::parsing(format!("Stream is not valid UTF-8: {}", source)).with_source(source)
        }
        EventStreamError::Parser(source) => {
            Error::parsing(format!("Malformed SSE frame: {}", source))
        }
    }
}

/// End `events` with [`ErrorKind::StreamTimeout`](crate::ErrorKind::StreamTimeout)
/// when no event arrives for `idle`.
pub fn with_idle_timeout(events: EventStream, idle: Duration) -> EventStream {
    let timed = tokio_stream::StreamExt::timeout(events, idle);

    let guarded = timed.scan(false, |timed_out, item| {
        if *timed_out {
            return ready(None);
        }
        ready(Some(match item {
            Ok(event) => event,
            Err(_) => {
                *timed_out = true;
                Err(Error::stream_timeout())
            }
        }))
    });

    Box::pin(guarded)
}

/// Wrap an in-memory event sequence as an [`EventStream`].
pub fn from_events(events: Vec<Result<StreamingEvent>>) -> EventStream {
    Box::pin(stream::iter(events))
}
