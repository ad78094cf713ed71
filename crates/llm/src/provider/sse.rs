//! Shared SSE-to-event decoding used by every streaming codec.
//!
//! Line-oriented SSE parsing comes from `eventsource-stream`, which
//! buffers dynamically, so multi-megabyte `data:` lines (large tool
//! argument chunks) decode without a fixed scanner limit. Each provider
//! supplies an [`EventProcessor`] that turns one `data:` payload into
//! neutral [`StreamEvent`]s and flushes reassembled state when the stream
//! ends.

use std::collections::VecDeque;

use eventsource_stream::{Event, EventStreamError};
use futures::{Stream, StreamExt};

use crate::provider::{EventStream, StreamEvent};

/// Per-provider stream decoding state machine.
pub(crate) trait EventProcessor: Send + 'static {
    /// Decode one `data:` payload into zero or more events. Undecodable
    /// payloads are the processor's problem; skipping with a warning is
    /// the norm.
    fn process_data(&mut self, data: &str) -> Vec<StreamEvent>;

    /// Flush reassembled tool calls, the final usage observation and the
    /// finish reason. Called exactly once, when the stream terminates.
    fn finish(&mut self) -> Vec<StreamEvent>;
}

struct DecodeState<S, P> {
    inner: S,
    processor: P,
    queue: VecDeque<StreamEvent>,
    done: bool,
}

/// Adapts an SSE event stream into an [`EventStream`]. `data: [DONE]`
/// terminates; non-data frames never reach the processor (the
/// `eventsource-stream` layer already drops comments and blank lines);
/// transport-level parse errors are skipped.
pub(crate) fn decode_events<S, E, P>(events: S, processor: P) -> EventStream
where
    S: Stream<Item = Result<Event, EventStreamError<E>>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send,
    P: EventProcessor,
{
    let state = DecodeState {
        inner: events,
        processor,
        queue: VecDeque::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some((Ok(event), state));
            }

            if state.done {
                return None;
            }

            match state.inner.next().await {
                None => {
                    state.done = true;
                    state.queue.extend(state.processor.finish());
                }
                Some(Err(error)) => {
                    log::warn!("SSE parsing error in provider stream: {error}");
                }
                Some(Ok(event)) if event.data == "[DONE]" => {
                    state.done = true;
                    state.queue.extend(state.processor.finish());
                }
                Some(Ok(event)) => {
                    state.queue.extend(state.processor.process_data(&event.data));
                }
            }
        }
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use eventsource_stream::Eventsource;
    use futures::StreamExt;

    use super::*;
    use crate::Result;

    /// Feeds raw SSE bytes through the full decode pipeline, split into
    /// the given chunk sizes to exercise frame reassembly.
    pub(crate) async fn decode_bytes<P: EventProcessor>(
        body: &str,
        chunk_size: usize,
        processor: P,
    ) -> Vec<Result<StreamEvent>> {
        let chunks: Vec<std::result::Result<Vec<u8>, std::convert::Infallible>> = body
            .as_bytes()
            .chunks(chunk_size.max(1))
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();

        let events = futures::stream::iter(chunks).eventsource();
        decode_events(events, processor).collect().await
    }

    struct Echo;

    impl EventProcessor for Echo {
        fn process_data(&mut self, data: &str) -> Vec<StreamEvent> {
            vec![StreamEvent::TextDelta {
                id: "0".to_string(),
                text: data.to_string(),
            }]
        }

        fn finish(&mut self) -> Vec<StreamEvent> {
            vec![StreamEvent::Finish(crate::FinishReason::Stop)]
        }
    }

    #[tokio::test]
    async fn done_marker_terminates_and_flushes() {
        let body = "data: one\n\ndata: [DONE]\n\ndata: after\n\n";
        let events = decode_bytes(body, 7, Echo).await;

        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::TextDelta { text, .. } if text == "one"));
        assert!(matches!(events[1], StreamEvent::Finish(_)));
    }

    #[tokio::test]
    async fn stream_end_without_done_still_flushes() {
        let body = "data: only\n\n";
        let events = decode_bytes(body, 3, Echo).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events.last().unwrap().as_ref().unwrap(), StreamEvent::Finish(_)));
    }

    #[tokio::test]
    async fn megabyte_data_line_is_parsed() {
        let payload = "x".repeat(1_200_000);
        let body = format!("data: {payload}\n\ndata: [DONE]\n\n");
        let events = decode_bytes(&body, 64 * 1024, Echo).await;

        let StreamEvent::TextDelta { text, .. } = events[0].as_ref().unwrap() else {
            unreachable!("expected text delta");
        };
        assert_eq!(text.len(), 1_200_000);
    }
}
