//! Sum, minimum and maximum over files of fixed-width big-endian `u32` records,
//! either streamed sequentially or split into record-aligned byte ranges that
//! are folded concurrently and reduced.

#[macro_use]
extern crate log;

pub mod accumulator;
pub mod aggregator;
pub mod partitioner;
mod progress_reporter;
pub mod records;
pub mod reducer;
pub mod sequential;
pub mod shared_types;
pub mod worker;

pub use accumulator::Accumulator;
pub use aggregator::{aggregate, AggregateError, AggregatePreferences, AggregateReport, Mode};
pub use records::TrailingPolicy;
pub use shared_types::{ByteRange, RECORD_WIDTH};
pub use worker::RangeStrategy;
