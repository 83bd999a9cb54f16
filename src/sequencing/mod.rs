pub mod event;
pub mod notes;
pub mod parser;
pub mod pattern;
pub mod time;

pub use event::{Event, Payload};
pub use pattern::{slot, Hap, Pattern, PatternSlot, WeightedSlot};
pub use time::{Rational, TimeSpan};
