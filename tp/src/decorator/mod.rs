//! Task decorators
//!
//! Decorators wrap another task and add a policy around its execution while
//! keeping the wrapped task's id, so outcomes still correlate with the
//! original submission. They nest: a retry of a timeout is a valid task.

mod retry;
mod timeout;

pub use retry::RetryTask;
pub use timeout::TimeoutTask;
