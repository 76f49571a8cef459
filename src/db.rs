use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{parse_number, FieldValue, Record};
use crate::source::{DataSource, MutationOp, Query, SourceError};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub fn source_error(err: sqlx::Error) -> SourceError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SourceError::Transport(err.to_string()),
        _ => SourceError::Rejected(err.to_string()),
    }
}

fn record_from_row(row: &PgRow) -> Result<Record, SourceError> {
    let id: Uuid = row.try_get("id").map_err(source_error)?;
    let Json(fields): Json<BTreeMap<String, FieldValue>> =
        row.try_get("fields").map_err(source_error)?;
    Ok(Record { id, fields })
}

// Returns the SQL and the text binds that follow `$1` (the collection).
fn fetch_sql(query: &Query) -> (String, Vec<String>) {
    let mut sql = String::from(
        "SELECT id, fields FROM backoffice.records WHERE collection = $1",
    );
    let mut binds = Vec::new();

    for (field, value) in &query.filters {
        let key = binds.len() + 2;
        let value_param = key + 1;
        if parse_number(value).is_some() {
            sql.push_str(&format!(
                " AND fields -> ${key} = to_jsonb(${value_param}::numeric)"
            ));
        } else {
            sql.push_str(&format!(" AND fields ->> ${key} = ${value_param}"));
        }
        binds.push(field.clone());
        binds.push(value.clone());
    }

    sql.push_str(" ORDER BY ");
    if let Some(order) = &query.order_by {
        sql.push_str(&format!(
            "fields -> ${} {} NULLS LAST, ",
            binds.len() + 2,
            if order.descending { "DESC" } else { "ASC" }
        ));
        binds.push(order.field.clone());
    }
    sql.push_str("created_at, id");

    if query.limit.is_some() {
        sql.push_str(&format!(" LIMIT ${}", binds.len() + 2));
    }

    (sql, binds)
}

#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataSource for PgSource {
    async fn fetch_collection(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Record>, SourceError> {
        let (sql, binds) = fetch_sql(query);
        let mut rows = sqlx::query(&sql).bind(collection);
        for value in binds {
            rows = rows.bind(value);
        }
        if let Some(limit) = query.limit {
            rows = rows.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = rows.fetch_all(&self.pool).await.map_err(source_error)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn mutate(
        &self,
        collection: &str,
        op: MutationOp,
        payload: Record,
    ) -> Result<Record, SourceError> {
        let row = match op {
            MutationOp::Insert => sqlx::query(
                r#"
                INSERT INTO backoffice.records (id, collection, fields)
                VALUES ($1, $2, $3)
                RETURNING id, fields
                "#,
            )
            .bind(payload.id)
            .bind(collection)
            .bind(Json(&payload.fields))
            .fetch_optional(&self.pool)
            .await,
            MutationOp::Update => sqlx::query(
                r#"
                UPDATE backoffice.records
                SET fields = fields || $3
                WHERE id = $1 AND collection = $2
                RETURNING id, fields
                "#,
            )
            .bind(payload.id)
            .bind(collection)
            .bind(Json(&payload.fields))
            .fetch_optional(&self.pool)
            .await,
            MutationOp::Delete => sqlx::query(
                r#"
                DELETE FROM backoffice.records
                WHERE id = $1 AND collection = $2
                RETURNING id, fields
                "#,
            )
            .bind(payload.id)
            .bind(collection)
            .fetch_optional(&self.pool)
            .await,
        }
        .map_err(source_error)?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(SourceError::Rejected(format!(
                "record {} not found in {collection}",
                payload.id
            ))),
        }
    }
}

async fn insert_keyed(
    pool: &PgPool,
    collection: &str,
    source_key: &str,
    record: &Record,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO backoffice.records (id, collection, fields, source_key)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(collection)
    .bind(Json(&record.fields))
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn date(y: i32, m: u32, d: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).context("invalid date")
}

fn seed_records() -> anyhow::Result<Vec<(String, &'static str, Record)>> {
    let mut seeded = Vec::new();

    let employees = [
        ("Avery Lee", "Finance", "Morgan Diaz"),
        ("Jules Moreno", "Engineering", "Morgan Diaz"),
        ("Kiara Patel", "Engineering", "Sam Okafor"),
    ];
    for (idx, (name, department, manager)) in employees.iter().enumerate() {
        seeded.push((
            format!("seed-employee-{idx:03}"),
            "employees",
            Record::new(Uuid::new_v4())
                .with("name", *name)
                .with("department", *department)
                .with("manager", *manager),
        ));
    }

    let expenses = [
        ("Avery Lee", "Delta Air Lines", "travel", 412.80, "approved", date(2024, 12, 15)?),
        ("Avery Lee", "Hilton Midtown", "lodging", 689.00, "pending", date(2025, 1, 3)?),
        ("Jules Moreno", "AWS", "software", 129.99, "approved", date(2025, 1, 9)?),
        ("Kiara Patel", "Blue Bottle", "meals", 18.50, "rejected", date(2025, 1, 21)?),
        ("Jules Moreno", "Uber", "travel", 42.10, "pending", date(2025, 2, 2)?),
    ];
    for (idx, (employee, merchant, category, amount, status, submitted_on)) in
        expenses.into_iter().enumerate()
    {
        seeded.push((
            format!("seed-expense-{idx:03}"),
            "expenses",
            Record::new(Uuid::new_v4())
                .with("employee", employee)
                .with("approver", "Morgan Diaz")
                .with("merchant", merchant)
                .with("category", category)
                .with("description", format!("{category} at {merchant}"))
                .with("amount", amount)
                .with("status", status)
                .with("submitted_on", submitted_on),
        ));
    }

    let transactions = [
        ("Avery Lee", "4821", "Delta Air Lines", 412.80, "reconciled", date(2024, 12, 14)?),
        ("Jules Moreno", "1190", "AWS", 129.99, "unreconciled", date(2025, 1, 8)?),
        ("Jules Moreno", "1190", "Uber", 42.10, "unreconciled", date(2025, 2, 1)?),
    ];
    for (idx, (cardholder, last4, merchant, amount, status, posted_on)) in
        transactions.into_iter().enumerate()
    {
        seeded.push((
            format!("seed-card-{idx:03}"),
            "card_transactions",
            Record::new(Uuid::new_v4())
                .with("cardholder", cardholder)
                .with("card_last4", last4)
                .with("merchant", merchant)
                .with("amount", amount)
                .with("status", status)
                .with("posted_on", posted_on),
        ));
    }

    let policies = [
        ("Hotel nightly cap", "lodging", 300.0, true),
        ("Meal per diem", "meals", 75.0, false),
        ("Economy airfare", "travel", 800.0, false),
    ];
    for (idx, (name, category, limit, violated)) in policies.into_iter().enumerate() {
        seeded.push((
            format!("seed-policy-{idx:03}"),
            "policies",
            Record::new(Uuid::new_v4())
                .with("name", name)
                .with("category", category)
                .with("description", format!("{name} for {category}"))
                .with("limit", limit)
                .with("violated", violated),
        ));
    }

    let goals = [
        ("Avery Lee", "Finance", "Close books in 5 days", 60.0, "active", date(2025, 3, 31)?),
        (
            "Avery Lee",
            "Finance",
            "Automate card reconciliation",
            100.0,
            "completed",
            date(2025, 1, 31)?,
        ),
        ("Jules Moreno", "Engineering", "Cut cloud spend 10%", 40.0, "active", date(2025, 6, 30)?),
        ("Kiara Patel", "Engineering", "Ship expense OCR", 80.0, "active", date(2025, 4, 15)?),
    ];
    for (idx, (employee, department, title, progress, status, due_on)) in
        goals.into_iter().enumerate()
    {
        seeded.push((
            format!("seed-goal-{idx:03}"),
            "goals",
            Record::new(Uuid::new_v4())
                .with("employee", employee)
                .with("department", department)
                .with("title", title)
                .with("description", format!("{employee}: {title}"))
                .with("progress", progress)
                .with("status", status)
                .with("due_on", due_on),
        ));
    }

    let actions = [
        ("Jules Moreno", "course", "FinOps certification", "active", date(2025, 5, 1)?),
        ("Kiara Patel", "mentoring", "Pair with staff engineer", "completed", date(2025, 2, 1)?),
        ("Avery Lee", "stretch", "Lead quarter-end close", "active", date(2025, 3, 31)?),
    ];
    for (idx, (employee, action_type, title, status, due_on)) in actions.into_iter().enumerate() {
        seeded.push((
            format!("seed-action-{idx:03}"),
            "development_actions",
            Record::new(Uuid::new_v4())
                .with("employee", employee)
                .with("action_type", action_type)
                .with("title", title)
                .with("description", title)
                .with("status", status)
                .with("due_on", due_on),
        ));
    }

    let reviews = [
        ("Avery Lee", "Morgan Diaz", "quarterly", 4.0, "Strong close process", date(2024, 12, 20)?),
        ("Jules Moreno", "Morgan Diaz", "peer", 3.5, "Helpful on-call partner", date(2025, 1, 12)?),
        ("Kiara Patel", "Sam Okafor", "quarterly", 4.5, "Owned OCR launch", date(2025, 1, 28)?),
    ];
    for (idx, (employee, reviewer, kind, rating, summary, given_on)) in
        reviews.into_iter().enumerate()
    {
        seeded.push((
            format!("seed-review-{idx:03}"),
            "reviews",
            Record::new(Uuid::new_v4())
                .with("employee", employee)
                .with("reviewer", reviewer)
                .with("kind", kind)
                .with("rating", rating)
                .with("summary", summary)
                .with("given_on", given_on),
        ));
    }

    Ok(seeded)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let mut inserted = 0usize;
    for (source_key, collection, record) in seed_records()? {
        if insert_keyed(pool, collection, &source_key, &record).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

fn csv_record(
    headers: &csv::StringRecord,
    row: &csv::StringRecord,
) -> anyhow::Result<(String, Record)> {
    let mut id = None;
    let mut source_key = None;
    let mut fields = BTreeMap::new();

    for (header, cell) in headers.iter().zip(row.iter()) {
        if cell.trim().is_empty() {
            continue;
        }
        match header {
            "id" => {
                let parsed = Uuid::parse_str(cell.trim())
                    .with_context(|| format!("invalid id {cell}"))?;
                id = Some(parsed);
            }
            "source_key" => source_key = Some(cell.trim().to_string()),
            _ => {
                fields.insert(header.to_string(), FieldValue::parse(cell));
            }
        }
    }

    let id = id.unwrap_or_else(Uuid::new_v4);
    let source_key = source_key.unwrap_or_else(|| format!("import-{id}"));
    Ok((source_key, Record { id, fields }))
}

pub async fn import_csv(
    pool: &PgPool,
    collection: &str,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers = reader.headers()?.clone();
    let mut inserted = 0usize;

    for (line, result) in reader.records().enumerate() {
        let row = result?;
        let (source_key, record) =
            csv_record(&headers, &row).with_context(|| format!("row {}", line + 1))?;
        if insert_keyed(pool, collection, &source_key, &record).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterSet;
    use crate::models::FilterState;

    #[test]
    fn pool_failures_are_transport_errors() {
        assert!(source_error(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(source_error(sqlx::Error::PoolClosed).is_retryable());
        assert!(!source_error(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn fetch_sql_numbers_binds_in_order() {
        let query = Query::new()
            .filter("employee", "E1")
            .filter("status", "pending")
            .order_by("amount", true)
            .limit(10);
        let (sql, binds) = fetch_sql(&query);
        assert!(sql.contains("fields ->> $2 = $3 AND fields ->> $4 = $5"));
        assert!(sql.contains("ORDER BY fields -> $6 DESC NULLS LAST, created_at, id"));
        assert!(sql.ends_with("LIMIT $7"));
        assert_eq!(binds, vec!["employee", "E1", "status", "pending", "amount"]);
    }

    #[test]
    fn numeric_filter_values_compare_as_numbers() {
        let query = Query::new().filter("amount", "40").filter("card_last4", "0012");
        let (sql, binds) = fetch_sql(&query);
        assert!(sql.contains("fields -> $2 = to_jsonb($3::numeric)"));
        assert!(sql.contains("fields ->> $4 = $5"));
        assert_eq!(binds, vec!["amount", "40", "card_last4", "0012"]);
    }

    #[test]
    fn plain_fetch_orders_by_insertion() {
        let (sql, binds) = fetch_sql(&Query::new());
        assert!(sql.ends_with("ORDER BY created_at, id"));
        assert!(binds.is_empty());
    }

    #[test]
    fn csv_rows_become_typed_records() {
        let headers = csv::StringRecord::from(vec![
            "source_key",
            "employee",
            "amount",
            "submitted_on",
            "note",
        ]);
        let row =
            csv::StringRecord::from(vec!["exp-7", "Avery Lee", "42.5", "2025-01-03", ""]);
        let (key, record) = csv_record(&headers, &row).unwrap();
        assert_eq!(key, "exp-7");
        assert_eq!(record.text("employee"), Some("Avery Lee"));
        assert_eq!(record.number("amount"), Some(42.5));
        assert_eq!(record.date("submitted_on"), NaiveDate::from_ymd_opt(2025, 1, 3));
        assert!(record.get("note").is_none());
    }

    #[test]
    fn csv_keeps_leading_zero_codes_as_text() {
        let headers = csv::StringRecord::from(vec!["cardholder", "card_last4"]);
        let row = csv::StringRecord::from(vec!["Avery Lee", "0012"]);
        let (_, record) = csv_record(&headers, &row).unwrap();
        assert_eq!(record.text("card_last4"), Some("0012"));
        assert_eq!(record.display("card_last4"), "0012");

        let search = FilterSet::new().text_search("searchQuery", &["card_last4"]);
        let state = FilterState::new().with("searchQuery", "0012");
        assert_eq!(search.apply(&state, &[record]).len(), 1);
    }

    #[test]
    fn csv_rejects_malformed_id() {
        let headers = csv::StringRecord::from(vec!["id", "employee"]);
        let row = csv::StringRecord::from(vec!["not-a-uuid", "Avery Lee"]);
        assert!(csv_record(&headers, &row).is_err());
    }

    #[test]
    fn seed_covers_every_collection() {
        let seeded = seed_records().unwrap();
        for collection in [
            "employees",
            "expenses",
            "card_transactions",
            "policies",
            "goals",
            "development_actions",
            "reviews",
        ] {
            assert!(seeded.iter().any(|(_, c, _)| *c == collection), "{collection}");
        }
    }
}
