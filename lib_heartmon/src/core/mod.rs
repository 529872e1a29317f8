//! # Core Engine Module
//!
//! The live half of the heart monitor. Every sensor sample enters here once,
//! is appended to the persisted log on the next tick, and is fanned out to
//! every live subscriber as it arrives.
//!
//! ## Core Components:
//!
//! - **`dispatcher`**: The serialized ingest loop. Owns the accumulation
//!   buffer, the log writer and the tick timer, and fans each sample out
//!   without ever waiting on a subscriber.
//!
//! - **`registry`**: The subscription set. Insert, remove, and a
//!   point-in-time snapshot for fan-out; the lock is never held across a
//!   send.
//!
//! - **`drain`**: Non-blocking batch reads for subscribers that present data
//!   (event relays, the live detector).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The serialized ingest, persist and fan-out loop.
pub mod dispatcher;
/// Non-blocking batch reads from a subscription queue.
pub mod drain;
/// The engine-owned subscription set and subscriber handles.
pub mod registry;

// --- Public API Re-exports ---
pub use dispatcher::{Dispatcher, DispatcherHandle, EngineOptions};
pub use drain::{drain_available, Drained};
pub use registry::{Registry, SubscriberId, Subscription};
