use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{DomainError, RecordQuery, RecordRef, RecordStore};

#[derive(Debug, Clone)]
struct StoredRecord {
    /// Lowercased entity type
    entity_type: String,
    fields: Map<String, Value>,
}

impl StoredRecord {
    fn is(&self, entity_type: &str, id: &str) -> bool {
        self.entity_type == entity_type.to_lowercase()
            && self.fields.get("id").and_then(Value::as_str) == Some(id)
    }
}

/// In-memory implementation of RecordStore
///
/// Entity types are compared case-insensitively; records get UUID ids and
/// queries see them in creation order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<Vec<StoredRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields of a stored record, `id` included
    pub async fn get(&self, entity_type: &str, id: &str) -> Option<Map<String, Value>> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.is(entity_type, id))
            .map(|record| record.fields.clone())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(
        &self,
        entity_type: &str,
        mut fields: Map<String, Value>,
    ) -> Result<RecordRef, DomainError> {
        if entity_type.trim().is_empty() {
            return Err(DomainError::validation("Entity type cannot be empty"));
        }

        let id = Uuid::new_v4().to_string();
        fields.insert("id".to_string(), Value::String(id.clone()));

        self.records.write().await.push(StoredRecord {
            entity_type: entity_type.to_lowercase(),
            fields,
        });

        Ok(RecordRef::new(entity_type, id))
    }

    async fn update(
        &self,
        entity_type: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), DomainError> {
        let mut records = self.records.write().await;

        let record = records
            .iter_mut()
            .find(|record| record.is(entity_type, id))
            .ok_or_else(|| {
                DomainError::not_found(format!("Record '{}/{}' not found", entity_type, id))
            })?;

        for (name, value) in fields {
            if name != "id" {
                record.fields.insert(name, value);
            }
        }

        Ok(())
    }

    async fn query(
        &self,
        entity_type: &str,
        query: &RecordQuery,
    ) -> Result<Vec<Map<String, Value>>, DomainError> {
        let entity_type = entity_type.to_lowercase();
        let candidates = self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.entity_type == entity_type)
            .map(|record| record.fields.clone())
            .collect();

        Ok(query.apply(candidates))
    }
}
