//! Execution log store trait

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::domain::error::DomainError;

use super::{ExecutionLog, ExecutionLogId, ExecutionLogQuery, LogCompletion};

/// Append/update store for execution logs
///
/// The engine calls `create` when an invocation starts and `update` exactly
/// once when it finishes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    /// Persist a freshly started log and return its id
    async fn create(&self, log: &ExecutionLog) -> Result<ExecutionLogId, DomainError>;

    /// Apply the terminal completion; fails with a conflict when already terminal
    async fn update(
        &self,
        id: &ExecutionLogId,
        completion: LogCompletion,
    ) -> Result<ExecutionLog, DomainError>;

    /// Get a log by ID
    async fn get(&self, id: &ExecutionLogId) -> Result<Option<ExecutionLog>, DomainError>;

    /// List logs matching a query, oldest first
    async fn list(&self, query: &ExecutionLogQuery) -> Result<Vec<ExecutionLog>, DomainError>;
}
