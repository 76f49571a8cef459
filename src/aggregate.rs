use crate::models::{AggregateResult, Record};

pub fn count(records: &[Record]) -> usize {
    records.len()
}

pub fn count_where<F>(records: &[Record], predicate: F) -> usize
where
    F: Fn(&Record) -> bool,
{
    records.iter().filter(|record| predicate(record)).count()
}

pub fn sum<F>(records: &[Record], selector: F) -> f64
where
    F: Fn(&Record) -> f64,
{
    records.iter().fold(0.0, |total, record| total + selector(record))
}

pub fn average<F>(records: &[Record], selector: F) -> f64
where
    F: Fn(&Record) -> f64,
{
    if records.is_empty() {
        return 0.0;
    }
    sum(records, selector) / records.len() as f64
}

/// `part / whole * 100`, or `0` when `whole` is zero. Not rounded.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Share of policies without a violation. `None` when no policies exist,
/// so callers never report a vacuous 100%.
pub fn compliance_rate(violations: usize, policies: usize) -> Option<f64> {
    if policies == 0 {
        return None;
    }
    let compliant = policies.saturating_sub(violations);
    Some(percentage(compliant as f64, policies as f64))
}

pub fn field(name: &str) -> impl Fn(&Record) -> f64 + '_ {
    move |record| record.number(name).unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Count {
        name: String,
    },
    CountWhere {
        name: String,
        field: String,
        value: String,
    },
    Sum {
        name: String,
        field: String,
    },
    Average {
        name: String,
        field: String,
    },
    Share {
        name: String,
        field: String,
        value: String,
    },
    Compliance {
        name: String,
        field: String,
        value: String,
    },
}

impl Metric {
    pub fn count(name: &str) -> Self {
        Metric::Count {
            name: name.to_string(),
        }
    }

    pub fn count_where(name: &str, field: &str, value: &str) -> Self {
        Metric::CountWhere {
            name: name.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn sum(name: &str, field: &str) -> Self {
        Metric::Sum {
            name: name.to_string(),
            field: field.to_string(),
        }
    }

    pub fn average(name: &str, field: &str) -> Self {
        Metric::Average {
            name: name.to_string(),
            field: field.to_string(),
        }
    }

    pub fn share(name: &str, field: &str, value: &str) -> Self {
        Metric::Share {
            name: name.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn compliance(name: &str, field: &str, value: &str) -> Self {
        Metric::Compliance {
            name: name.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Metric::Count { name }
            | Metric::CountWhere { name, .. }
            | Metric::Sum { name, .. }
            | Metric::Average { name, .. }
            | Metric::Share { name, .. }
            | Metric::Compliance { name, .. } => name,
        }
    }
}

fn field_is(record: &Record, field: &str, value: &str) -> bool {
    record
        .get(field)
        .map(|current| current.matches_str(value))
        .unwrap_or(false)
}

pub fn aggregate(records: &[Record], metrics: &[Metric]) -> AggregateResult {
    let mut result = AggregateResult::default();

    for metric in metrics {
        let value = match metric {
            Metric::Count { .. } => Some(count(records) as f64),
            Metric::CountWhere { field, value, .. } => {
                Some(count_where(records, |record| field_is(record, field, value)) as f64)
            }
            Metric::Sum { field: name, .. } => Some(sum(records, field(name))),
            Metric::Average { field: name, .. } => Some(average(records, field(name))),
            Metric::Share { field, value, .. } => {
                let part = count_where(records, |record| field_is(record, field, value));
                Some(percentage(part as f64, records.len() as f64))
            }
            Metric::Compliance { field, value, .. } => {
                let violations = count_where(records, |record| field_is(record, field, value));
                compliance_rate(violations, records.len())
            }
        };

        if let Some(value) = value {
            result.insert(metric.name(), value);
        }
    }

    result
}
