//! Execution log domain
//!
//! One log entry is recorded per step invocation, nested ones included.
//! Entries open as `started` and are closed exactly once as `success` or
//! `failed`; nested entries point at their enclosing invocation.

mod entity;
mod store;

pub use entity::{
    ExecutionLog, ExecutionLogError, ExecutionLogId, ExecutionLogQuery, ExecutionStatus,
    LogCompletion,
};
pub use store::ExecutionLogStore;

#[cfg(test)]
pub use store::MockExecutionLogStore;
