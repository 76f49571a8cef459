use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{Group, Record};

pub const UNDATED: &str = "undated";
pub const UNASSIGNED: &str = "unassigned";

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn by_field(field: &str) -> impl Fn(&Record) -> String + '_ {
    move |record| match record.get(field) {
        Some(value) => value.to_string(),
        None => UNASSIGNED.to_string(),
    }
}

pub fn by_month(field: &str) -> impl Fn(&Record) -> String + '_ {
    move |record| match record.date(field) {
        Some(date) => month_key(date),
        None => UNDATED.to_string(),
    }
}

pub fn group_by<K>(records: &[Record], key_fn: K) -> Vec<Group>
where
    K: Fn(&Record) -> String,
{
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = key_fn(record);
        match index.get(&key) {
            Some(&slot) => groups[slot].records.push(record.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    records: vec![record.clone()],
                    aggregate: None,
                });
            }
        }
    }

    groups
}

pub fn group_by_with<K, A>(records: &[Record], key_fn: K, aggregate: A) -> Vec<Group>
where
    K: Fn(&Record) -> String,
    A: Fn(&[Record]) -> f64,
{
    let mut groups = group_by(records, key_fn);
    for group in groups.iter_mut() {
        group.aggregate = Some(aggregate(&group.records));
    }
    groups
}

pub fn order_by_keys(groups: Vec<Group>, preferred: &[String]) -> Vec<Group> {
    let rank: HashMap<&str, usize> = preferred
        .iter()
        .enumerate()
        .map(|(pos, key)| (key.as_str(), pos))
        .collect();

    let mut ranked: Vec<(usize, usize, Group)> = groups
        .into_iter()
        .enumerate()
        .map(|(seen, group)| {
            let pos = rank.get(group.key.as_str()).copied().unwrap_or(usize::MAX);
            (pos, seen, group)
        })
        .collect();
    ranked.sort_by_key(|(pos, seen, _)| (*pos, *seen));
    ranked.into_iter().map(|(_, _, group)| group).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{average, field};
    use uuid::Uuid;

    fn goal(employee: &str, progress: f64) -> Record {
        Record::new(Uuid::new_v4())
            .with("employee", employee)
            .with("progress", progress)
    }

    fn dated(y: i32, m: u32, d: u32) -> Record {
        Record::new(Uuid::new_v4()).with("date", NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn employee_groups_with_average_progress() {
        let mut records: Vec<Record> = [10.0, 40.0, 60.0, 80.0, 100.0]
            .iter()
            .map(|p| goal("E1", *p))
            .collect();
        records.extend([20.0, 20.0, 20.0].iter().map(|p| goal("E2", *p)));

        let groups = group_by_with(&records, by_field("employee"), |rs| {
            average(rs, field("progress"))
        });

        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["E1", "E2"]);
        assert_eq!(groups[0].aggregate, Some(58.0));
        assert_eq!(groups[1].aggregate, Some(20.0));
    }

    #[test]
    fn grouping_keeps_every_record_once() {
        let records = vec![
            goal("E2", 1.0),
            goal("E1", 2.0),
            goal("E2", 3.0),
            goal("E3", 4.0),
            Record::new(Uuid::new_v4()),
        ];
        let groups = group_by(&records, by_field("employee"));
        let total: usize = groups.iter().map(|g| g.records.len()).sum();
        assert_eq!(total, records.len());
        assert!(groups.iter().all(|g| !g.records.is_empty()));

        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["E2", "E1", "E3", UNASSIGNED]);
        assert_eq!(group_by(&records, by_field("employee")), groups);
    }

    #[test]
    fn month_groups_split_across_year_boundary() {
        let records = vec![dated(2024, 12, 15), dated(2025, 1, 3), dated(2024, 12, 1)];
        let groups = group_by(&records, by_month("date"));
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-12", "2025-01"]);
        assert_eq!(groups[0].records.len(), 2);
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(group_by(&[], by_field("employee")).is_empty());
    }

    #[test]
    fn preferred_order_then_first_seen() {
        let records = vec![goal("E3", 1.0), goal("E1", 1.0), goal("E9", 1.0), goal("E2", 1.0)];
        let groups = group_by(&records, by_field("employee"));
        let preferred = vec!["E1".to_string(), "E2".to_string(), "E3".to_string()];
        let ordered = order_by_keys(groups, &preferred);
        let keys: Vec<&str> = ordered.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["E1", "E2", "E3", "E9"]);
    }
}
