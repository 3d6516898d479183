//! Pipeline host: runs collection and scoring cycles, once or on a loop.

mod monitor;
mod orchestrator;
mod report;

pub use monitor::Monitor;
pub use orchestrator::{CycleError, Orchestrator};
pub use report::{CycleReport, CycleState, ScoringReport, SourceReport};
