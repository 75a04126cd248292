pub mod counter;
pub mod live;

pub use counter::{CounterConfig, CrossingCounter, CrossingEvent, Side};
pub use live::{CountSnapshot, LiveCounts};
