//! Queue module: bounded FIFO between submitters and workers.

mod bounded;

pub use bounded::TaskQueue;
