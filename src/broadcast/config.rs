//! Broadcast configuration

use std::time::Duration;

use super::queue::DropPolicy;

/// Default outbound queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Default per-client write deadline
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound queue and delivery options
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Frames held between the transform stage and the broadcast engine
    pub queue_capacity: usize,

    /// What to drop when the queue is full
    pub drop_policy: DropPolicy,

    /// Deadline for a single write to one client
    pub write_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drop_policy: DropPolicy::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl BroadcastConfig {
    /// Set the queue capacity (at least one)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the drop policy
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Set the per-client write deadline
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}
