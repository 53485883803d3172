//! Bounded outbound frame queue
//!
//! Multiple producers, one consumer. Pushing never waits: when the queue is
//! full the configured [`DropPolicy`] decides which frame is lost. The
//! default keeps what is already queued and drops the incoming frame.
//!
//! Closing the queue lets the consumer drain what is left, after which
//! [`FrameQueue::pop`] returns `None`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::registry::Frame;

/// What to drop when pushing into a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// Reject the incoming frame
    #[default]
    DropNewest,
    /// Evict the oldest queued frame to make room
    DropOldest,
}

impl std::str::FromStr for DropPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" | "drop-newest" => Ok(DropPolicy::DropNewest),
            "oldest" | "drop-oldest" => Ok(DropPolicy::DropOldest),
            other => Err(format!("unknown drop policy: {}", other)),
        }
    }
}

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame was queued
    Queued,
    /// Queue was full; the incoming frame was dropped
    DroppedNewest,
    /// Queue was full; the oldest frame was evicted and the new one queued
    DroppedOldest,
    /// Queue is closed; the frame was dropped
    Closed,
}

impl PushOutcome {
    /// Whether the pushed frame is now in the queue
    pub fn is_queued(&self) -> bool {
        matches!(self, PushOutcome::Queued | PushOutcome::DroppedOldest)
    }

    /// Whether some frame was lost to backpressure
    pub fn dropped(&self) -> bool {
        matches!(self, PushOutcome::DroppedNewest | PushOutcome::DroppedOldest)
    }
}

#[derive(Debug)]
struct QueueState {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Bounded FIFO of frames waiting to be broadcast
#[derive(Debug)]
pub struct FrameQueue {
    capacity: usize,
    policy: DropPolicy,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl FrameQueue {
    /// Create a queue; a capacity of zero is raised to one
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            policy,
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured drop policy
    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether no frames are queued
    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Push a frame without waiting
    pub fn push(&self, frame: Frame) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();

            if state.closed {
                return PushOutcome::Closed;
            }

            if state.frames.len() < self.capacity {
                state.frames.push_back(frame);
                PushOutcome::Queued
            } else {
                match self.policy {
                    DropPolicy::DropNewest => return PushOutcome::DroppedNewest,
                    DropPolicy::DropOldest => {
                        state.frames.pop_front();
                        state.frames.push_back(frame);
                        PushOutcome::DroppedOldest
                    }
                }
            }
        };

        self.notify.notify_one();
        outcome
    }

    /// Take the next frame, waiting while the queue is empty
    ///
    /// Returns `None` once the queue is closed and drained. Intended for a
    /// single consumer.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            let notified = self.notify.notified();

            {
                let mut state = self.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Take the next frame if one is queued
    pub fn try_pop(&self) -> Option<Frame> {
        self.lock().frames.pop_front()
    }

    /// Close the queue
    ///
    /// Further pushes are rejected; queued frames can still be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
