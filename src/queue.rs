//! Bounded FIFO of delivered-but-not-yet-received messages.
//!
//! The C reference is a ring buffer with explicit head/tail indices
//! and an off-by-one in its eviction path (it destroys the slot it
//! just wrote instead of the true oldest entry). This evicts the
//! oldest entry on overflow, as the spec's own text says it should.

use std::collections::VecDeque;

use crate::message::Message;

/// Matches the C reference's fixed ring size.
const CAPACITY: usize = 1024;

#[derive(Debug, Default)]
pub(crate) struct InboundQueue {
    inner: VecDeque<Message>,
}

impl InboundQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `msg`. If the queue is already at capacity, the oldest
    /// entry is dropped to make room.
    pub(crate) fn push(&mut self, msg: Message) {
        if self.inner.len() >= CAPACITY {
            self.inner.pop_front();
            tracing::trace!("inbound queue full, evicted oldest message");
        }
        self.inner.push_back(msg);
    }

    /// Take the first queued message (scanning oldest-first) matching
    /// both filters, where `None` means "don't filter on this field".
    pub(crate) fn get(&mut self, clazz: Option<&str>, in_reply_to: Option<&str>) -> Option<Message> {
        let pos = self.inner.iter().position(|m| {
            clazz.is_none_or(|c| m.clazz() == c)
                && in_reply_to.is_none_or(|id| m.in_reply_to() == Some(id))
        })?;
        self.inner.remove(pos)
    }

    /// Take the first queued message whose class matches any entry in
    /// `clazzes`. Matches nothing if `clazzes` is empty.
    pub(crate) fn get_any(&mut self, clazzes: &[&str]) -> Option<Message> {
        if clazzes.is_empty() {
            return None;
        }
        let pos = self
            .inner
            .iter()
            .position(|m| clazzes.contains(&m.clazz()))?;
        self.inner.remove(pos)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBuilder;
    use crate::perf::Performative;

    fn msg(clazz: &str) -> Message {
        MessageBuilder::new(clazz, Performative::Inform).build()
    }

    #[test]
    fn fifo_ordering_among_matches() {
        let mut q = InboundQueue::new();
        q.push(msg("A"));
        q.push(msg("B"));
        q.push(msg("A"));
        let first = q.get(Some("A"), None).unwrap();
        assert_eq!(first.clazz(), "A");
        let second = q.get(Some("A"), None).unwrap();
        assert_eq!(second.clazz(), "A");
        assert!(q.get(Some("A"), None).is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn get_any_matches_multiple_classes() {
        let mut q = InboundQueue::new();
        q.push(msg("A"));
        q.push(msg("B"));
        q.push(msg("C"));
        let m = q.get_any(&["B", "C"]).unwrap();
        assert_eq!(m.clazz(), "B");
    }

    #[test]
    fn get_any_empty_filter_matches_nothing() {
        let mut q = InboundQueue::new();
        q.push(msg("A"));
        assert!(q.get_any(&[]).is_none());
    }

    #[test]
    fn overflow_evicts_oldest_not_newest() {
        let mut q = InboundQueue::new();
        for i in 0..CAPACITY {
            q.push(MessageBuilder::new(&i.to_string(), Performative::Inform).build());
        }
        // one more push should evict "0", not the message we're about to add
        q.push(msg("overflow"));
        assert!(q.get(Some("0"), None).is_none());
        let last = q.get(Some("overflow"), None);
        assert!(last.is_some());
    }
}
