//! Range Query Engine
//!
//! Selects the buckets of a device that overlap a time interval through the
//! range index, then flattens, filters and sorts their samples into one
//! time-ordered sequence.

pub mod pipeline;
pub mod range_query;

pub use range_query::{CandidateBucket, QueryPlan, RangeQueryEngine};
