use std::fmt::Write;

use crate::models::{FilterState, Group, Page, Record};
use crate::paginate::paginate;
use crate::pipeline::{ScreenConfig, ScreenState, View};

const GROUP_PREVIEW: usize = 5;

fn is_percentage(metric: &str) -> bool {
    metric.ends_with("Rate")
}

/// Rounds for display only. Aggregates keep full precision until here.
pub fn format_metric(name: &str, value: f64) -> String {
    if is_percentage(name) {
        format!("{value:.1}%")
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn row(record: &Record, columns: &[String]) -> String {
    let cells: Vec<String> = columns.iter().map(|column| record.display(column)).collect();
    format!("| {} |", cells.join(" | "))
}

fn write_table(output: &mut String, columns: &[String], items: &[Record]) {
    let _ = writeln!(output, "| {} |", columns.join(" | "));
    let _ = writeln!(
        output,
        "|{}",
        columns.iter().map(|_| "---|").collect::<String>()
    );
    for record in items {
        let _ = writeln!(output, "{}", row(record, columns));
    }
}

fn write_groups(output: &mut String, config: &ScreenConfig, groups: &[Group]) {
    let _ = writeln!(output, "## Breakdown");
    if groups.is_empty() {
        let _ = writeln!(output, "No groups for the current filters.");
        return;
    }

    for group in groups {
        match group.aggregate {
            Some(value) => {
                let _ = writeln!(
                    output,
                    "### {} ({} records, average {:.1})",
                    group.key,
                    group.records.len(),
                    value
                );
            }
            None => {
                let _ = writeln!(output, "### {} ({} records)", group.key, group.records.len());
            }
        }
        let preview: Page<Record> = paginate(&group.records, GROUP_PREVIEW, 1);
        write_table(output, &config.columns, &preview.items);
        if preview.total_pages > 1 {
            let _ = writeln!(
                output,
                "_{} more not shown_",
                group.records.len() - preview.items.len()
            );
        }
        let _ = writeln!(output);
    }
}

fn describe_filters(filter: &FilterState) -> String {
    let active: Vec<String> = filter
        .active()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    if active.is_empty() {
        "no filters".to_string()
    } else {
        active.join(", ")
    }
}

pub fn build_report(
    config: &ScreenConfig,
    state: &ScreenState,
    filter: &FilterState,
    view: Option<&View>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", config.title);
    let _ = writeln!(
        output,
        "Module {} / {} ({})",
        config.module,
        config.section,
        describe_filters(filter)
    );
    let _ = writeln!(output);

    let view = match (state, view) {
        (ScreenState::Loading, None) => {
            let _ = writeln!(output, "Loading...");
            return output;
        }
        (ScreenState::Error(err), None) => {
            let _ = writeln!(output, "Data could not be loaded: {err}");
            return output;
        }
        (_, None) => {
            let _ = writeln!(output, "No data available.");
            return output;
        }
        (_, Some(view)) => view,
    };

    let _ = writeln!(output, "## Summary");
    for (name, value) in view.aggregate.iter() {
        let _ = writeln!(output, "- {}: {}", name, format_metric(name, value));
    }
    for metric in &config.metrics {
        if view.aggregate.get(metric.name()).is_none() {
            let _ = writeln!(output, "- {}: n/a", metric.name());
        }
    }
    let _ = writeln!(
        output,
        "- showing {} of {} records",
        view.filtered_count, view.total_count
    );
    let _ = writeln!(output);

    if view.filtered_count == 0 {
        let _ = writeln!(output, "No records match the current filters.");
        return output;
    }

    if config.grouping.is_some() {
        write_groups(&mut output, config, &view.groups);
    }

    let _ = writeln!(
        output,
        "## Page {} of {}",
        view.page.number, view.page.total_pages
    );
    if view.page.items.is_empty() {
        let _ = writeln!(output, "This page is empty.");
    } else {
        write_table(&mut output, &config.columns, &view.page.items);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::compute;
    use crate::screens;
    use crate::source::SourceError;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn policy(name: &str, violated: bool) -> Record {
        Record::new(Uuid::new_v4())
            .with("name", name)
            .with("category", "travel")
            .with("limit", 500.0)
            .with("violated", violated)
    }

    #[test]
    fn metrics_rounded_only_for_display() {
        assert_eq!(format_metric("approvalRate", 100.0 / 3.0), "33.3%");
        assert_eq!(format_metric("expenses", 12.0), "12");
        assert_eq!(format_metric("totalAmount", 12.345), "12.35");
    }

    #[test]
    fn policy_report_shows_compliance() {
        let config = screens::screen(screens::EXPENSES, "policies").unwrap();
        let records = vec![policy("Hotel cap", true), policy("Meal cap", false)];
        let filter = FilterState::new();
        let view = compute(&config, &records, &filter, 1, &[]);
        let report = build_report(&config, &ScreenState::Ready, &filter, Some(&view));

        assert!(report.contains("# Expense Policies"));
        assert!(report.contains("- complianceRate: 50.0%"));
        assert!(report.contains("| Hotel cap | travel | 500 | true |"));
    }

    #[test]
    fn compliance_without_policies_is_not_applicable() {
        let config = screens::screen(screens::EXPENSES, "policies").unwrap();
        let filter = FilterState::new();
        let view = compute(&config, &[], &filter, 1, &[]);
        let report = build_report(&config, &ScreenState::Ready, &filter, Some(&view));

        assert!(report.contains("- complianceRate: n/a"));
        assert!(report.contains("No records match the current filters."));
        assert!(!report.contains("100.0%"));
    }

    #[test]
    fn archive_report_lists_month_groups() {
        let config = screens::screen(screens::EXPENSES, "archive").unwrap();
        let records = vec![
            Record::new(Uuid::new_v4())
                .with("submitted_on", NaiveDate::from_ymd_opt(2024, 12, 15).unwrap())
                .with("amount", 40.0),
            Record::new(Uuid::new_v4())
                .with("submitted_on", NaiveDate::from_ymd_opt(2025, 1, 3).unwrap())
                .with("amount", 60.0),
        ];
        let filter = FilterState::new();
        let view = compute(&config, &records, &filter, 1, &[]);
        let report = build_report(&config, &ScreenState::Ready, &filter, Some(&view));

        assert!(report.contains("### 2024-12 (1 records)"));
        assert!(report.contains("### 2025-01 (1 records)"));
        assert!(report.contains("- totalAmount: 100"));
    }

    #[test]
    fn error_state_without_data() {
        let config = screens::screen(screens::PERFORMANCE, "goals").unwrap();
        let state = ScreenState::Error(SourceError::Transport("timeout".into()));
        let report = build_report(&config, &state, &FilterState::new(), None);
        assert!(report.contains("Data could not be loaded: transport failure: timeout"));
        assert!(!report.contains("## Summary"));
    }
}
