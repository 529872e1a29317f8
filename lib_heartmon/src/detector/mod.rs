//! # Heart Rate Detection & Alerting
//!
//! An online heuristic that turns the record stream into a beats-per-minute
//! estimate and sounds an alarm when it stays high.
//!
//! - **`beats`**: the two-state first-difference beat counter.
//! - **`window`**: the rolling sample buffer it runs over.
//! - **`hysteresis`**: consecutive-high-window gating.
//! - **`alerter`**: the `Idle`/`Sounding` alarm state machine and the
//!   external player process.
//! - **`rate_detector`**: ties the above together per record.
//! - **`live`**: feeds a rate detector from a live subscription.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The alarm state machine and its players.
pub mod alerter;
/// Beat counting over a sample window.
pub mod beats;
/// Consecutive-window alert gating.
pub mod hysteresis;
/// Live-mode driver over a dispatcher subscription.
pub mod live;
/// The record-stream detector.
pub mod rate_detector;
/// The rolling detection window.
pub mod window;

pub use alerter::{AlarmError, AlarmOptions, AlarmPlayer, AlarmState, Alerter, ProcessAlarm, SilentAlarm};
pub use beats::{beats_per_minute, detect_heartbeats, BeatState};
pub use hysteresis::{AlertDecision, AlertPolicy};
pub use live::LiveDetector;
pub use rate_detector::{DetectorOptions, RateDetector};
pub use window::DetectionWindow;
