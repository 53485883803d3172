//! Client registry for frame fan-out
//!
//! The registry holds every connected subscriber. The broadcast engine
//! iterates over point-in-time snapshots of it, while connection tasks add
//! and remove clients concurrently.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ClientRegistry<S>>
//!                     ┌──────────────────────────┐
//!                     │ clients: HashMap<Id,     │
//!                     │   Arc<ClientHandle {     │
//!                     │     sink: Mutex<S>,      │
//!                     │     state, removed,      │
//!                     │   }>                     │
//!                     │ >                        │
//!                     └────────────┬─────────────┘
//!                                  │
//!          ┌───────────────────────┼───────────────────────┐
//!          │                       │                       │
//!          ▼                       ▼                       ▼
//!   [BroadcastEngine]       [Lifecycle task]        [Lifecycle task]
//!    snapshot() ──►          add() / ping /          add() / ping /
//!    send_frame() ──► sink   remove()                remove()
//! ```
//!
//! # Zero-Copy Design
//!
//! Frames are `bytes::Bytes`, so every client in a broadcast pass shares the
//! same allocation; only the reference count changes.

pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use entry::{ClientHandle, ClientState};
pub use error::RegistryError;
pub use frame::{ClientId, Frame};
pub use store::ClientRegistry;
