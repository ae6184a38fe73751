//! Visibility filters
//!
//! A filter is a boolean expression plus a mode (show/hide) and a time
//! buffer. Hits become buffered intervals, intervals are unioned across
//! recordings in base time, and the ordered stack decides which filter wins
//! where intervals overlap.

mod definition;
mod engine;
mod interval;
mod stack;

pub use definition::{FilterDefinition, FilterMode};
pub use engine::{FilterEngine, Visibility};
pub use interval::{Interval, IntervalSet};
pub use stack::FilterStack;
