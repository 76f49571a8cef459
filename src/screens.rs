use crate::aggregate::Metric;
use crate::filter::FilterSet;
use crate::pipeline::{Grouping, ScreenConfig};
use crate::source::Query;

pub const EXPENSES: &str = "expenses";
pub const PERFORMANCE: &str = "performance";

pub const EXPENSE_SECTIONS: [&str; 4] = ["approvals", "cards", "policies", "archive"];
pub const PERFORMANCE_SECTIONS: [&str; 4] = ["goals", "development", "feedback", "departments"];

pub fn sections(module: &str) -> &'static [&'static str] {
    match module {
        EXPENSES => &EXPENSE_SECTIONS,
        PERFORMANCE => &PERFORMANCE_SECTIONS,
        _ => &[],
    }
}

pub fn modules() -> [&'static str; 2] {
    [EXPENSES, PERFORMANCE]
}

pub fn screen(module: &str, section: &str) -> Option<ScreenConfig> {
    let config = match (module, section) {
        (EXPENSES, "approvals") => approvals(),
        (EXPENSES, "cards") => cards(),
        (EXPENSES, "policies") => policies(),
        (EXPENSES, "archive") => archive(),
        (PERFORMANCE, "goals") => goals(),
        (PERFORMANCE, "development") => development(),
        (PERFORMANCE, "feedback") => feedback(),
        (PERFORMANCE, "departments") => departments(),
        _ => return None,
    };
    Some(config)
}

fn approvals() -> ScreenConfig {
    ScreenConfig::new(EXPENSES, "approvals", "Expense Approvals", "expenses")
        .query(Query::new().order_by("submitted_on", true))
        .filters(
            &[
                "statusFilter",
                "employeeFilter",
                "categoryFilter",
                "searchQuery",
                "yearFilter",
            ],
            FilterSet::new()
                .field_equals("statusFilter", "status")
                .any_field_equals("employeeFilter", &["employee", "approver"])
                .field_equals("categoryFilter", "category")
                .text_search("searchQuery", &["description", "merchant", "employee"])
                .year_of("yearFilter", "submitted_on"),
        )
        .metrics(vec![
            Metric::count("expenses"),
            Metric::count_where("pending", "status", "pending"),
            Metric::sum("totalAmount", "amount"),
            Metric::average("averageAmount", "amount"),
            Metric::share("approvalRate", "status", "approved"),
        ])
        .grouping(
            Grouping::by_field("employee")
                .ordered_by("employees", "name", Query::new().order_by("name", false)),
        )
        .columns(&["submitted_on", "employee", "merchant", "category", "amount", "status"])
}

fn cards() -> ScreenConfig {
    ScreenConfig::new(EXPENSES, "cards", "Corporate Card Transactions", "card_transactions")
        .query(Query::new().order_by("posted_on", true))
        .filters(
            &["cardholderFilter", "statusFilter", "searchQuery", "monthFilter"],
            FilterSet::new()
                .field_equals("cardholderFilter", "cardholder")
                .field_equals("statusFilter", "status")
                .text_search("searchQuery", &["merchant", "cardholder", "card_last4"])
                .month_of("monthFilter", "posted_on"),
        )
        .metrics(vec![
            Metric::count("transactions"),
            Metric::sum("totalSpend", "amount"),
            Metric::count_where("unreconciled", "status", "unreconciled"),
            Metric::share("reconciledRate", "status", "reconciled"),
        ])
        .grouping(Grouping::by_field("cardholder"))
        .columns(&["posted_on", "cardholder", "card_last4", "merchant", "amount", "status"])
}

fn policies() -> ScreenConfig {
    ScreenConfig::new(EXPENSES, "policies", "Expense Policies", "policies")
        .query(Query::new().order_by("name", false))
        .filters(
            &["categoryFilter", "searchQuery"],
            FilterSet::new()
                .field_equals("categoryFilter", "category")
                .text_search("searchQuery", &["name", "description"]),
        )
        .metrics(vec![
            Metric::count("policies"),
            Metric::count_where("violated", "violated", "true"),
            Metric::compliance("complianceRate", "violated", "true"),
        ])
        .columns(&["name", "category", "limit", "violated"])
}

fn archive() -> ScreenConfig {
    ScreenConfig::new(EXPENSES, "archive", "Expense Archive", "expenses")
        .query(Query::new().order_by("submitted_on", false))
        .filters(
            &["yearFilter", "monthFilter", "employeeFilter", "searchQuery"],
            FilterSet::new()
                .year_of("yearFilter", "submitted_on")
                .month_of("monthFilter", "submitted_on")
                .field_equals("employeeFilter", "employee")
                .text_search("searchQuery", &["description", "merchant"]),
        )
        .metrics(vec![
            Metric::count("expenses"),
            Metric::sum("totalAmount", "amount"),
        ])
        .grouping(Grouping::by_month("submitted_on"))
        .columns(&["submitted_on", "employee", "merchant", "amount", "status"])
}

fn goals() -> ScreenConfig {
    ScreenConfig::new(PERFORMANCE, "goals", "Goals", "goals")
        .query(Query::new().order_by("due_on", false))
        .filters(
            &[
                "statusFilter",
                "employeeFilter",
                "departmentFilter",
                "searchQuery",
                "yearFilter",
            ],
            FilterSet::new()
                .field_equals("statusFilter", "status")
                .field_equals("employeeFilter", "employee")
                .field_equals("departmentFilter", "department")
                .text_search("searchQuery", &["title", "description", "employee"])
                .year_of("yearFilter", "due_on"),
        )
        .metrics(vec![
            Metric::count("goals"),
            Metric::count_where("completed", "status", "completed"),
            Metric::average("averageProgress", "progress"),
            Metric::share("completionRate", "status", "completed"),
        ])
        .grouping(
            Grouping::by_field("employee")
                .averaging("progress")
                .ordered_by("employees", "name", Query::new().order_by("name", false)),
        )
        .columns(&["title", "employee", "due_on", "progress", "status"])
}

fn development() -> ScreenConfig {
    ScreenConfig::new(PERFORMANCE, "development", "Development Actions", "development_actions")
        .query(Query::new().order_by("due_on", false))
        .filters(
            &["statusFilter", "employeeFilter", "typeFilter", "searchQuery"],
            FilterSet::new()
                .field_equals("statusFilter", "status")
                .field_equals("employeeFilter", "employee")
                .field_equals("typeFilter", "action_type")
                .text_search("searchQuery", &["title", "description"]),
        )
        .metrics(vec![
            Metric::count("actions"),
            Metric::count_where("completed", "status", "completed"),
            Metric::share("completionRate", "status", "completed"),
        ])
        .grouping(
            Grouping::by_field("employee")
                .ordered_by("employees", "name", Query::new().order_by("name", false)),
        )
        .columns(&["title", "employee", "action_type", "due_on", "status"])
}

fn feedback() -> ScreenConfig {
    ScreenConfig::new(PERFORMANCE, "feedback", "Feedback & Reviews", "reviews")
        .query(Query::new().order_by("given_on", true))
        .filters(
            &["employeeFilter", "kindFilter", "yearFilter", "searchQuery"],
            FilterSet::new()
                .any_field_equals("employeeFilter", &["employee", "reviewer"])
                .field_equals("kindFilter", "kind")
                .year_of("yearFilter", "given_on")
                .text_search("searchQuery", &["summary", "employee", "reviewer"]),
        )
        .metrics(vec![
            Metric::count("reviews"),
            Metric::average("averageRating", "rating"),
        ])
        .grouping(Grouping::by_month("given_on").averaging("rating"))
        .columns(&["given_on", "employee", "reviewer", "kind", "rating"])
}

fn departments() -> ScreenConfig {
    ScreenConfig::new(PERFORMANCE, "departments", "Department Rollup", "goals")
        .query(Query::new().order_by("department", false))
        .filters(
            &["departmentFilter", "statusFilter", "yearFilter"],
            FilterSet::new()
                .field_equals("departmentFilter", "department")
                .field_equals("statusFilter", "status")
                .year_of("yearFilter", "due_on"),
        )
        .metrics(vec![
            Metric::count("goals"),
            Metric::average("averageProgress", "progress"),
            Metric::share("completionRate", "status", "completed"),
        ])
        .grouping(Grouping::by_field("department").averaging("progress"))
        .columns(&["department", "employee", "title", "progress", "status"])
}
