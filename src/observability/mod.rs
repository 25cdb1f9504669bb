//! Observability for the client: request statistics and tracing spans.

mod spans;
mod stats;

pub use spans::RequestSpan;
pub use stats::{Counter, DEFAULT_WINDOW, FetchStats, StatsCollector};
