//! In-memory execution log store

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{
    DomainError, ExecutionLog, ExecutionLogId, ExecutionLogQuery, ExecutionLogStore,
    LogCompletion,
};

/// In-memory implementation of ExecutionLogStore
///
/// Entries are kept in creation order, which is also the order in which
/// step invocations started.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutionLogStore {
    logs: Arc<RwLock<Vec<ExecutionLog>>>,
}

impl InMemoryExecutionLogStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry, oldest first
    pub async fn all(&self) -> Vec<ExecutionLog> {
        self.logs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.logs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.logs.read().await.is_empty()
    }
}

#[async_trait]
impl ExecutionLogStore for InMemoryExecutionLogStore {
    async fn create(&self, log: &ExecutionLog) -> Result<ExecutionLogId, DomainError> {
        let mut logs = self.logs.write().await;

        if logs.iter().any(|l| l.id() == log.id()) {
            return Err(DomainError::conflict(format!(
                "Execution log '{}' already exists",
                log.id()
            )));
        }

        logs.push(log.clone());
        Ok(log.id().clone())
    }

    async fn update(
        &self,
        id: &ExecutionLogId,
        completion: LogCompletion,
    ) -> Result<ExecutionLog, DomainError> {
        let mut logs = self.logs.write().await;

        let log = logs
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or_else(|| DomainError::not_found(format!("Execution log '{}' not found", id)))?;

        log.complete(completion)?;
        Ok(log.clone())
    }

    async fn get(&self, id: &ExecutionLogId) -> Result<Option<ExecutionLog>, DomainError> {
        let logs = self.logs.read().await;
        Ok(logs.iter().find(|l| l.id() == id).cloned())
    }

    async fn list(&self, query: &ExecutionLogQuery) -> Result<Vec<ExecutionLog>, DomainError> {
        let logs = self.logs.read().await;
        let matching = logs.iter().filter(|l| query.matches(l)).cloned();

        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}
