//! Sensor module - reading sources

mod traits;
mod simulator;
mod json_lines;

pub use traits::{Reading, ReadingSource};
pub use simulator::SimulatedSource;
pub use json_lines::JsonLinesSource;
