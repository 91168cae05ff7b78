//! Store module: per-task status and completed results.

mod memory;
mod record;
mod retention;

pub use memory::{ResultStore, StoreCounts};
pub use record::TaskRecord;
pub use retention::RetentionPolicy;
