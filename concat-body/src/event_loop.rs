//! A minimal reactor with a logical clock.
//!
//! [`EventQueue`] delivers [`SinkEvent`]s in due-time order without ever
//! sleeping: taking the next event advances the clock to its due time. It
//! backs [`Aggregator::collect_all`](crate::Aggregator::collect_all) and makes
//! retry delays deterministic in tests.

use crate::error::{BodyError, BodyResult};
use crate::sink::{Reaction, Sink, SinkEvent};
use crate::writer::BodyWriter;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

/// Queue of notifications ordered by logical due time.
#[derive(Debug, Default)]
pub struct EventQueue {
    now: Duration,
    seq: u64,
    pending: BTreeMap<(Duration, u64), SinkEvent>,
}

impl EventQueue {
    /// Create an empty queue at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current logical time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queue an event for delivery now.
    pub fn post(&mut self, event: SinkEvent) {
        self.post_after(event, Duration::ZERO);
    }

    /// Queue an event for delivery after `delay`.
    pub fn post_after(&mut self, event: SinkEvent, delay: Duration) {
        let due = self.now.saturating_add(delay);
        self.pending.insert((due, self.seq), event);
        self.seq += 1;
    }

    /// Take the next due event, advancing the clock to its due time.
    pub fn next_event(&mut self) -> Option<SinkEvent> {
        let ((due, _), event) = self.pending.pop_first()?;
        self.now = self.now.max(due);
        Some(event)
    }
}

/// Drive `writer` from `queue` until it closes.
///
/// After every `Continue` the sink is assumed writable again and a
/// `HasSpaceAvailable` is queued; `RetryAfter` re-queues the same event after
/// its delay. Gives up with [`BodyError::Stalled`] after `max_idle_polls`
/// consecutive events that wrote nothing, or when the queue runs dry while
/// the writer is still open. Either way the writer is closed on return.
pub fn run_until_closed<S: Sink>(
    writer: &mut BodyWriter<S>,
    queue: &mut EventQueue,
    max_idle_polls: u32,
) -> BodyResult<()> {
    let mut idle = 0u32;

    while writer.is_open() {
        let Some(event) = queue.next_event() else {
            debug!("Event queue ran dry before the writer closed");
            writer.close();
            return Err(BodyError::Stalled(idle));
        };

        let before = writer.bytes_written();
        let reaction = writer.handle_readiness(event);
        trace!(?event, ?reaction, now = ?queue.now(), "Delivered event");

        match reaction {
            Reaction::Continue => queue.post(SinkEvent::HasSpaceAvailable),
            Reaction::RetryAfter(delay) => queue.post_after(event, delay),
            Reaction::Closed => break,
        }

        if writer.bytes_written() == before {
            idle += 1;
            if idle > max_idle_polls {
                debug!(idle, "Giving up on stalled writer");
                writer.close();
                return Err(BodyError::Stalled(idle));
            }
        } else {
            idle = 0;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregatorConfig;
    use crate::source::SourceList;
    use crate::writer::tests::{writer_with, ScriptedSink};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_events_in_due_order() {
        let mut queue = EventQueue::new();
        queue.post_after(SinkEvent::EndEncountered, Duration::from_millis(30));
        queue.post(SinkEvent::OpenCompleted);
        queue.post_after(SinkEvent::HasSpaceAvailable, Duration::from_millis(10));
        queue.post(SinkEvent::HasSpaceAvailable);
        assert_eq!(queue.len(), 4);

        assert_eq!(queue.next_event(), Some(SinkEvent::OpenCompleted));
        assert_eq!(queue.next_event(), Some(SinkEvent::HasSpaceAvailable));
        assert_eq!(queue.now(), Duration::ZERO);
        assert_eq!(queue.next_event(), Some(SinkEvent::HasSpaceAvailable));
        assert_eq!(queue.now(), Duration::from_millis(10));
        assert_eq!(queue.next_event(), Some(SinkEvent::EndEncountered));
        assert_eq!(queue.now(), Duration::from_millis(30));
        assert_eq!(queue.next_event(), None);
    }

    #[test]
    fn test_retry_uses_logical_clock() {
        let mut sources = SourceList::new();
        sources.push_bytes("abc");
        let sink = ScriptedSink {
            peer_open: Some(Arc::new(AtomicBool::new(false))),
            ..Default::default()
        };
        let config = AggregatorConfig::new().retry_after(Duration::from_millis(100));
        let mut writer = writer_with(sources, 16, sink, config);

        let mut queue = EventQueue::new();
        queue.post(SinkEvent::OpenCompleted);
        let err = run_until_closed(&mut writer, &mut queue, 5).unwrap_err();

        assert!(matches!(err, BodyError::Stalled(6)));
        assert!(!writer.is_open());
        // The open, then five deferred notifications 100ms apart.
        assert_eq!(queue.now(), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_then_write() {
        let peer_open = Arc::new(AtomicBool::new(false));
        let mut sources = SourceList::new();
        sources.push_bytes("abc");
        let sink = ScriptedSink {
            peer_open: Some(Arc::clone(&peer_open)),
            ..Default::default()
        };
        let data = Arc::clone(&sink.data);
        let config = AggregatorConfig::new().retry_after(Duration::from_millis(50));
        let mut writer = writer_with(sources, 16, sink, config);

        let mut queue = EventQueue::new();
        queue.post(SinkEvent::OpenCompleted);
        // Deliver the open and the first, deferred, space notification.
        assert_eq!(
            writer.handle_readiness(queue.next_event().unwrap()),
            Reaction::Continue
        );
        assert_eq!(
            writer.handle_readiness(SinkEvent::HasSpaceAvailable),
            Reaction::RetryAfter(Duration::from_millis(50))
        );
        queue.post_after(SinkEvent::HasSpaceAvailable, Duration::from_millis(50));

        peer_open.store(true, Ordering::SeqCst);
        run_until_closed(&mut writer, &mut queue, 5).unwrap();
        assert_eq!(queue.now(), Duration::from_millis(50));
        assert_eq!(*data.lock(), b"abc".to_vec());
    }

    #[test]
    fn test_dry_queue_stalls() {
        let mut sources = SourceList::new();
        sources.push_bytes("abc");
        let mut writer = writer_with(sources, 16, ScriptedSink::default(), AggregatorConfig::new());

        let mut queue = EventQueue::new();
        let err = run_until_closed(&mut writer, &mut queue, 5).unwrap_err();
        assert!(matches!(err, BodyError::Stalled(0)));
        assert!(!writer.is_open());
    }
}
