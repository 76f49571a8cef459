use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{parse_number, FieldValue, Record};

/// Failures of the backing store, split by whether a retry can help.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transport(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Field equality. A value that reads as a number matches numeric fields
    /// by value; any other value is compared with the field's text form.
    /// Ordering puts records missing the field last in both directions.
    pub filters: BTreeMap<String, String>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, value: &str) -> Self {
        self.filters.insert(field.to_string(), value.to_string());
        self
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// `mutate` payload semantics: `Insert` stores the record as given, `Update`
/// merges the payload's fields into the stored record with the same id,
/// `Delete` removes the record with the payload's id and returns it.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_collection(&self, collection: &str, query: &Query)
        -> Result<Vec<Record>, SourceError>;

    async fn mutate(
        &self,
        collection: &str,
        op: MutationOp,
        payload: Record,
    ) -> Result<Record, SourceError>;
}

fn compare_fields(
    a: Option<&FieldValue>,
    b: Option<&FieldValue>,
    descending: bool,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let (x, y) = match (a, b) {
        (Some(x), Some(y)) => (x, y),
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => return Ordering::Equal,
    };
    let ordering = match (x, y) {
        (FieldValue::Number(x), FieldValue::Number(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (FieldValue::Date(x), FieldValue::Date(y)) => x.cmp(y),
        _ => x.to_string().cmp(&y.to_string()),
    };
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn query_matches(value: &FieldValue, wanted: &str) -> bool {
    match parse_number(wanted) {
        Some(number) => value.as_number() == Some(number),
        None => value.to_string() == wanted,
    }
}

pub fn run_query(records: &[Record], query: &Query) -> Vec<Record> {
    let mut selected: Vec<Record> = records
        .iter()
        .filter(|record| {
            query.filters.iter().all(|(field, wanted)| {
                record
                    .get(field)
                    .map(|value| query_matches(value, wanted))
                    .unwrap_or(false)
            })
        })
        .cloned()
        .collect();

    if let Some(order) = &query.order_by {
        selected.sort_by(|a, b| {
            compare_fields(a.get(&order.field), b.get(&order.field), order.descending)
        });
    }

    if let Some(limit) = query.limit {
        selected.truncate(limit);
    }

    selected
}

#[derive(Debug, Default)]
pub struct MemorySource {
    collections: Mutex<HashMap<String, Vec<Record>>>,
    failures: Mutex<VecDeque<SourceError>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, collection: &str, records: Vec<Record>) -> Self {
        if let Ok(mut collections) = self.collections.lock() {
            collections
                .entry(collection.to_string())
                .or_default()
                .extend(records);
        }
        self
    }

    pub fn fail_next(&self, error: SourceError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    fn take_failure(&self) -> Result<(), SourceError> {
        let mut failures = self
            .failures
            .lock()
            .map_err(|_| SourceError::Transport("memory source poisoned".to_string()))?;
        match failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch_collection(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Record>, SourceError> {
        self.take_failure()?;
        let collections = self
            .collections
            .lock()
            .map_err(|_| SourceError::Transport("memory source poisoned".to_string()))?;
        let records = collections.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        Ok(run_query(records, query))
    }

    async fn mutate(
        &self,
        collection: &str,
        op: MutationOp,
        payload: Record,
    ) -> Result<Record, SourceError> {
        self.take_failure()?;
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| SourceError::Transport("memory source poisoned".to_string()))?;
        let records = collections.entry(collection.to_string()).or_default();
        let position = records.iter().position(|record| record.id == payload.id);

        match (op, position) {
            (MutationOp::Insert, Some(_)) => Err(SourceError::Rejected(format!(
                "record {} already exists",
                payload.id
            ))),
            (MutationOp::Insert, None) => {
                records.push(payload.clone());
                Ok(payload)
            }
            (MutationOp::Update, Some(pos)) => {
                records[pos].fields.extend(payload.fields);
                Ok(records[pos].clone())
            }
            (MutationOp::Delete, Some(pos)) => Ok(records.remove(pos)),
            (MutationOp::Update | MutationOp::Delete, None) => Err(SourceError::Rejected(
                format!("record {} not found", payload.id),
            )),
        }
    }
}

pub fn patch(id: Uuid) -> Record {
    Record::new(id)
}
