//! Violation report streaming: rotating JSON-array files under a single
//! writer, plus an in-memory log for snapshot queries.

mod pattern;
mod streamer;

pub use pattern::{next_rollover, parse_report_naming, ReportNaming, ReportPattern, RolloverUnit};
pub use streamer::{ReportStreamer, ViolationSink};
