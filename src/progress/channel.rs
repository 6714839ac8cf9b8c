//! Channel-backed handler for streaming progress to a consumer

use super::{ProgressEvent, ProgressHandler};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

/// Forwards events into an unbounded channel exposed as a `Stream`
///
/// Sends never block the emitting task. Events sent after the stream is
/// dropped are discarded. Percentages are clamped so the stream itself is
/// monotonic even if several reporters share one handler.
pub struct ChannelHandler {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    last: AtomicU8,
}

impl ChannelHandler {
    pub fn new() -> (Self, UnboundedReceiverStream<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                last: AtomicU8::new(0),
            },
            UnboundedReceiverStream::new(receiver),
        )
    }
}

impl ProgressHandler for ChannelHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        let previous = self.last.fetch_max(event.percent(), Ordering::SeqCst);
        let event = event.clone().at_least(previous);
        if self.sender.send(event).is_err() {
            trace!("Progress stream closed; dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_stream_receives_events_in_order() {
        let (handler, stream) = ChannelHandler::new();

        handler.on_progress(&ProgressEvent::ToolStarted {
            tool: "a".to_string(),
            percent: 30,
        });
        handler.on_progress(&ProgressEvent::ToolStarted {
            tool: "b".to_string(),
            percent: 10,
        });
        drop(handler);

        let events: Vec<ProgressEvent> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].percent(), 30);
        assert_eq!(events[1].percent(), 30);
    }

    #[test]
    fn test_send_after_stream_dropped() {
        let (handler, stream) = ChannelHandler::new();
        drop(stream);
        handler.on_progress(&ProgressEvent::Error {
            message: "late".to_string(),
            percent: 100,
        });
    }
}
