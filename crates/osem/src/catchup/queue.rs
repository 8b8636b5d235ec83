//! Bounded, deduplicated FIFO of conversation re-scan requests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use log::warn;

use crate::error::CatchupError;

/// One `(event, conversation)` re-scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchupRequest {
    pub event_id: String,
    pub conversation_id: String,
    pub full_history: bool,
}

impl CatchupRequest {
    pub fn new(event_id: &str, conversation_id: &str, full_history: bool) -> Self {
        Self {
            event_id: event_id.to_string(),
            conversation_id: conversation_id.to_string(),
            full_history,
        }
    }

    /// Dedup key; a key is admitted at most once until its request is
    /// dequeued.
    pub fn key(&self) -> String {
        format!(
            "{}::{}",
            self.event_id.to_uppercase(),
            self.conversation_id.to_uppercase()
        )
    }
}

#[derive(Default)]
struct QueueInner {
    queue: VecDeque<CatchupRequest>,
    tracked: HashSet<String>,
}

pub struct CatchupQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
}

impl CatchupQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Catch-up queue lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Admits a request unless its key is already tracked. Returns whether
    /// the request was added.
    pub fn enqueue(&self, request: CatchupRequest) -> Result<bool, CatchupError> {
        let mut inner = self.lock();
        if inner.tracked.contains(&request.key()) {
            return Ok(false);
        }
        if inner.queue.len() >= self.capacity {
            return Err(CatchupError::QueueFull);
        }
        inner.tracked.insert(request.key());
        inner.queue.push_back(request);
        Ok(true)
    }

    /// Dequeues the next request, releasing its dedup key.
    pub fn pop(&self) -> Option<CatchupRequest> {
        let mut inner = self.lock();
        let request = inner.queue.pop_front()?;
        inner.tracked.remove(&request.key());
        Some(request)
    }

    /// Dequeues the front request only when it belongs to the given event.
    pub fn pop_for(&self, event_id: &str) -> Option<CatchupRequest> {
        let mut inner = self.lock();
        let matches = inner
            .queue
            .front()
            .is_some_and(|r| r.event_id.eq_ignore_ascii_case(event_id));
        if !matches {
            return None;
        }
        let request = inner.queue.pop_front()?;
        inner.tracked.remove(&request.key());
        Some(request)
    }

    /// Moves the given event's requests to the front, preserving their
    /// relative order.
    pub fn rotate_to_front(&self, event_id: &str) {
        let mut inner = self.lock();
        let (mut preferred, rest): (VecDeque<_>, VecDeque<_>) = inner
            .queue
            .drain(..)
            .partition(|r| r.event_id.eq_ignore_ascii_case(event_id));
        preferred.extend(rest);
        inner.queue = preferred;
    }

    pub fn is_tracked(&self, event_id: &str, conversation_id: &str) -> bool {
        let key = CatchupRequest::new(event_id, conversation_id, false).key();
        self.lock().tracked.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dedupes_until_pop() {
        let queue = CatchupQueue::new(8);
        assert!(queue.enqueue(CatchupRequest::new("E1", "C1", false)).unwrap());
        assert!(!queue.enqueue(CatchupRequest::new("e1", "c1", true)).unwrap());
        assert_eq!(queue.len(), 1);

        let popped = queue.pop().unwrap();
        assert_eq!(popped.event_id, "E1");
        assert!(queue.enqueue(CatchupRequest::new("E1", "C1", false)).unwrap());
    }

    #[test]
    fn test_fifo_order() {
        let queue = CatchupQueue::new(8);
        queue.enqueue(CatchupRequest::new("E1", "C1", false)).unwrap();
        queue.enqueue(CatchupRequest::new("E2", "C2", false)).unwrap();

        assert_eq!(queue.pop().unwrap().event_id, "E1");
        assert_eq!(queue.pop().unwrap().event_id, "E2");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_capacity_bound() {
        let queue = CatchupQueue::new(2);
        queue.enqueue(CatchupRequest::new("E1", "C1", false)).unwrap();
        queue.enqueue(CatchupRequest::new("E2", "C2", false)).unwrap();
        assert!(matches!(
            queue.enqueue(CatchupRequest::new("E3", "C3", false)),
            Err(CatchupError::QueueFull)
        ));
    }

    #[test]
    fn test_rotate_prefers_event() {
        let queue = CatchupQueue::new(8);
        queue.enqueue(CatchupRequest::new("E1", "C1", false)).unwrap();
        queue.enqueue(CatchupRequest::new("E2", "C2", false)).unwrap();
        queue.enqueue(CatchupRequest::new("E2", "C3", false)).unwrap();

        queue.rotate_to_front("E2");
        assert_eq!(queue.pop().unwrap().conversation_id, "C2");
        assert_eq!(queue.pop().unwrap().conversation_id, "C3");
        assert_eq!(queue.pop().unwrap().event_id, "E1");
    }

    #[test]
    fn test_is_tracked() {
        let queue = CatchupQueue::new(8);
        queue.enqueue(CatchupRequest::new("E1", "C1", false)).unwrap();
        assert!(queue.is_tracked("E1", "C1"));
        assert!(!queue.is_tracked("E1", "C2"));
    }
}
