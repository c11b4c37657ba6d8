pub mod batch;
pub mod outcome;
pub mod progress;

pub use batch::{Batch, BatchKind, Operation, RunLogEntry, RunStatus, sanitize_message};
pub use outcome::{SkipReason, UnitCounters, UnitOutcome};
pub use progress::EntityProgress;
