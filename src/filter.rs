use std::collections::BTreeMap;

use chrono::Datelike;

use crate::group::month_key;
use crate::models::{FilterState, Record};

pub type Matcher = Box<dyn Fn(&Record, &str) -> bool + Send + Sync>;

#[derive(Default)]
pub struct FilterSet {
    predicates: BTreeMap<String, Matcher>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, key: &str, matcher: F) -> Self
    where
        F: Fn(&Record, &str) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(key.to_string(), Box::new(matcher));
        self
    }

    pub fn field_equals(self, key: &str, field: &str) -> Self {
        let field = field.to_string();
        self.register(key, move |record, wanted| {
            record
                .get(&field)
                .map(|value| value.matches_str(wanted))
                .unwrap_or(false)
        })
    }

    pub fn any_field_equals(self, key: &str, fields: &[&str]) -> Self {
        let fields: Vec<String> = fields.iter().map(|field| field.to_string()).collect();
        self.register(key, move |record, wanted| {
            fields.iter().any(|field| {
                record
                    .get(field)
                    .map(|value| value.matches_str(wanted))
                    .unwrap_or(false)
            })
        })
    }

    pub fn text_search(self, key: &str, fields: &[&str]) -> Self {
        let fields: Vec<String> = fields.iter().map(|field| field.to_string()).collect();
        self.register(key, move |record, query| {
            let needle = query.trim().to_lowercase();
            if needle.is_empty() {
                return true;
            }
            fields
                .iter()
                .any(|field| record.display(field).to_lowercase().contains(&needle))
        })
    }

    pub fn year_of(self, key: &str, field: &str) -> Self {
        let field = field.to_string();
        self.register(key, move |record, wanted| {
            match (record.date(&field), wanted.trim().parse::<i32>()) {
                (Some(date), Ok(year)) => date.year() == year,
                _ => false,
            }
        })
    }

    pub fn month_of(self, key: &str, field: &str) -> Self {
        let field = field.to_string();
        self.register(key, move |record, wanted| {
            record
                .date(&field)
                .map(|date| month_key(date) == wanted.trim())
                .unwrap_or(false)
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.predicates.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }

    pub fn unregistered<'a>(&self, state: &'a FilterState) -> Vec<&'a str> {
        state.keys().filter(|key| !self.contains(key)).collect()
    }

    pub fn matches(&self, state: &FilterState, record: &Record) -> bool {
        state.active().all(|(key, value)| match self.predicates.get(key) {
            Some(predicate) => predicate(record, value),
            None => true,
        })
    }

    pub fn apply(&self, state: &FilterState, records: &[Record]) -> Vec<Record> {
        for key in self.unregistered(state) {
            tracing::debug!(key, "ignoring filter key without a predicate");
        }
        records
            .iter()
            .filter(|record| self.matches(state, record))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSet")
            .field("keys", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}
