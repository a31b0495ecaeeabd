//! Record persistence collaborator used by the record steps

mod query;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(test)]
use mockall::automock;

use crate::domain::error::DomainError;

pub use query::{FilterOperator, RecordFilter, RecordOrder, RecordQuery};

/// Reference to a persisted business record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub entity_type: String,
    pub id: String,
}

impl RecordRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// Store for the business records workflows create and update
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record of the given type
    async fn create(
        &self,
        entity_type: &str,
        fields: Map<String, Value>,
    ) -> Result<RecordRef, DomainError>;

    /// Update fields of an existing record; fails with not found when absent
    async fn update(
        &self,
        entity_type: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), DomainError>;

    /// Records of the given type matching the query, `id` included
    async fn query(
        &self,
        entity_type: &str,
        query: &RecordQuery,
    ) -> Result<Vec<Map<String, Value>>, DomainError>;
}
