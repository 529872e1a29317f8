//! # Diagnostic Rendering
//!
//! Human-readable views of record streams, for debug output and for teeing a
//! live connection to a terminal or text file. Purely presentational: the
//! format is not a protocol and may change.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Record-to-text rendering.
pub mod text_stream;

pub use text_stream::{format_samples, human_readable_output, render_record};
