use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{Criteria, EntityDescriptor, VerdantResult};

/// One record as returned to callers: attribute name to JSON value.
pub type Record = serde_json::Map<String, JsonValue>;

/// Records grouped by plural key, then primary-key value.
pub type RecordSet = BTreeMap<String, BTreeMap<i64, Record>>;

/// Result of a create request: every row inserted by the request,
/// including transitively created ancestors.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CreatedRecords {
    #[serde(flatten)]
    pub records: RecordSet,
}

impl CreatedRecords {
    pub fn merge(&mut self, plural_key: &str, id: i64, record: Record) {
        self.records
            .entry(plural_key.to_string())
            .or_default()
            .insert(id, record);
    }

    pub fn get(&self, plural_key: &str, id: i64) -> Option<&Record> {
        self.records.get(plural_key)?.get(&id)
    }

    /// The single record under `plural_key`, if exactly one was created.
    pub fn single(&self, plural_key: &str) -> Option<(i64, &Record)> {
        let group = self.records.get(plural_key)?;
        if group.len() == 1 {
            group.iter().next().map(|(id, record)| (*id, record))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FoundRecords {
    #[serde(flatten)]
    pub records: RecordSet,
    pub found: u64,
    pub remaining: u64,
}

impl FoundRecords {
    pub fn group(&self, plural_key: &str) -> Option<&BTreeMap<i64, Record>> {
        self.records.get(plural_key)
    }
}

#[async_trait]
pub trait RecordCreateApi {
    /// Creates one record, transitively creating whichever ancestors the
    /// options do not already identify, inside one transaction.
    async fn create(
        &self,
        descriptor: &'static EntityDescriptor,
        options: JsonValue,
    ) -> VerdantResult<CreatedRecords>;
}

#[async_trait]
pub trait RecordQueryApi {
    async fn find(
        &self,
        descriptor: &'static EntityDescriptor,
        criteria: Criteria,
    ) -> VerdantResult<FoundRecords>;
}

#[async_trait]
pub trait RecordMutationApi {
    /// Updates the records matched by `criteria`, returning their ids.
    async fn update(
        &self,
        descriptor: &'static EntityDescriptor,
        values: JsonValue,
        criteria: Criteria,
    ) -> VerdantResult<Vec<i64>>;

    /// Deletes the records matched by `criteria` (children cascade),
    /// returning the ids of the directly deleted rows.
    async fn delete(
        &self,
        descriptor: &'static EntityDescriptor,
        criteria: Criteria,
    ) -> VerdantResult<Vec<i64>>;
}
