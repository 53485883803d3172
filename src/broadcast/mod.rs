//! Outbound queue and fan-out
//!
//! ```text
//! transform stage ──publish()──► FrameQueue (bounded, drop on full)
//!                                     │ pop()
//!                                     ▼
//!                              BroadcastEngine ──snapshot()──► ClientRegistry
//!                                     │
//!                         send_frame() per client, under a deadline
//! ```

pub mod config;
pub mod engine;
pub mod queue;

pub use config::BroadcastConfig;
pub use engine::{BroadcastEngine, BroadcastPass};
pub use queue::{DropPolicy, FrameQueue, PushOutcome};
