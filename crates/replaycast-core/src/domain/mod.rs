//! Domain model (IDs, tasks, results, status, errors).

pub mod errors;
pub mod ids;
pub mod result;
pub mod state;
pub mod task;

pub use errors::{
    BuildError, ConversionError, LifecycleError, StoreError, SubmitError, WaitError,
};
pub use ids::{ParseIdError, TaskId};
pub use result::ConvertResult;
pub use state::{TaskState, TaskStatus};
pub use task::{ConvertTask, InputRef};
