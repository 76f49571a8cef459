use std::sync::Arc;

use crate::aggregate::{self, aggregate, Metric};
use crate::filter::FilterSet;
use crate::group::{self, by_field, by_month};
use crate::models::{AggregateResult, FilterState, Group, Page, Record};
use crate::notify::{NoticeKind, NotificationSink};
use crate::paginate::{paginate, Pager};
use crate::source::{DataSource, MutationOp, Query, SourceError};

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Field(String),
    Month(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReference {
    pub collection: String,
    pub field: String,
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub key: GroupKey,
    pub average_of: Option<String>,
    pub reference: Option<GroupReference>,
}

impl Grouping {
    pub fn by_field(field: &str) -> Self {
        Self {
            key: GroupKey::Field(field.to_string()),
            average_of: None,
            reference: None,
        }
    }

    pub fn by_month(field: &str) -> Self {
        Self {
            key: GroupKey::Month(field.to_string()),
            average_of: None,
            reference: None,
        }
    }

    pub fn averaging(mut self, field: &str) -> Self {
        self.average_of = Some(field.to_string());
        self
    }

    pub fn ordered_by(mut self, collection: &str, field: &str, query: Query) -> Self {
        self.reference = Some(GroupReference {
            collection: collection.to_string(),
            field: field.to_string(),
            query,
        });
        self
    }

    fn apply(&self, records: &[Record], preferred: &[String]) -> Vec<Group> {
        let groups = match &self.key {
            GroupKey::Field(field) => group::group_by(records, by_field(field)),
            GroupKey::Month(field) => group::group_by(records, by_month(field)),
        };

        let mut groups = if preferred.is_empty() {
            groups
        } else {
            group::order_by_keys(groups, preferred)
        };

        if let Some(field) = &self.average_of {
            for group in groups.iter_mut() {
                group.aggregate = Some(aggregate::average(&group.records, aggregate::field(field)));
            }
        }
        groups
    }
}

#[derive(Debug)]
pub struct ScreenConfig {
    pub module: String,
    pub section: String,
    pub title: String,
    pub collection: String,
    pub query: Query,
    pub filters: FilterSet,
    pub filter_keys: Vec<String>,
    pub metrics: Vec<Metric>,
    pub grouping: Option<Grouping>,
    pub columns: Vec<String>,
    pub page_size: usize,
}

impl ScreenConfig {
    pub fn new(module: &str, section: &str, title: &str, collection: &str) -> Self {
        Self {
            module: module.to_string(),
            section: section.to_string(),
            title: title.to_string(),
            collection: collection.to_string(),
            query: Query::default(),
            filters: FilterSet::new(),
            filter_keys: Vec::new(),
            metrics: Vec::new(),
            grouping: None,
            columns: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn filters(mut self, keys: &[&str], filters: FilterSet) -> Self {
        self.filter_keys = keys.iter().map(|key| key.to_string()).collect();
        self.filters = filters;
        self
    }

    pub fn metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = Some(grouping);
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|column| column.to_string()).collect();
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn missing_predicates(&self) -> Vec<&str> {
        self.filter_keys
            .iter()
            .map(String::as_str)
            .filter(|key| !self.filters.contains(key))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub total_count: usize,
    pub filtered_count: usize,
    pub aggregate: AggregateResult,
    pub groups: Vec<Group>,
    pub page: Page<Record>,
}

pub fn compute(
    config: &ScreenConfig,
    records: &[Record],
    state: &FilterState,
    page_number: usize,
    group_order: &[String],
) -> View {
    let filtered = config.filters.apply(state, records);
    let aggregate = aggregate(&filtered, &config.metrics);
    let groups = config
        .grouping
        .as_ref()
        .map(|grouping| grouping.apply(&filtered, group_order))
        .unwrap_or_default();
    let page = paginate(&filtered, config.page_size, page_number);

    View {
        total_count: records.len(),
        filtered_count: filtered.len(),
        aggregate,
        groups,
        page,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScreenState {
    Loading,
    Ready,
    Error(SourceError),
}

pub struct Screen {
    config: ScreenConfig,
    source: Arc<dyn DataSource>,
    notifier: Arc<dyn NotificationSink>,
    fetch_retries: usize,
    state: ScreenState,
    records: Option<Vec<Record>>,
    group_order: Vec<String>,
    filter: FilterState,
    pager: Pager,
    view: Option<View>,
}

impl Screen {
    pub fn new(
        config: ScreenConfig,
        source: Arc<dyn DataSource>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let pager = Pager::new(config.page_size);
        Self {
            config,
            source,
            notifier,
            fetch_retries: 0,
            state: ScreenState::Loading,
            records: None,
            group_order: Vec::new(),
            filter: FilterState::new(),
            pager,
            view: None,
        }
    }

    /// Extra attempts after a retryable fetch failure.
    pub fn with_retries(mut self, fetch_retries: usize) -> Self {
        self.fetch_retries = fetch_retries;
        self
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.config
    }

    pub fn state(&self) -> &ScreenState {
        &self.state
    }

    pub fn view(&self) -> Option<&View> {
        self.view.as_ref()
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Fetches the collection and recomputes the view.
    ///
    /// On failure exactly one error notice is sent. Previously loaded data
    /// stays in place; without it the screen ends in `Error`.
    pub async fn load(&mut self) -> Result<(), SourceError> {
        self.state = ScreenState::Loading;

        match self.fetch().await {
            Ok((records, group_order)) => {
                tracing::debug!(
                    collection = %self.config.collection,
                    count = records.len(),
                    "screen data loaded"
                );
                self.records = Some(records);
                self.group_order = group_order;
                self.state = ScreenState::Ready;
                self.recompute();
                Ok(())
            }
            Err(err) => {
                tracing::error!(collection = %self.config.collection, error = %err, "fetch failed");
                self.notifier.notify(
                    NoticeKind::Error,
                    &format!("Could not load {}: {err}", self.config.title),
                );
                self.state = if self.records.is_some() {
                    ScreenState::Ready
                } else {
                    ScreenState::Error(err.clone())
                };
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<(Vec<Record>, Vec<String>), SourceError> {
        let records = self
            .fetch_with_retry(&self.config.collection, &self.config.query)
            .await?;

        let reference = self
            .config
            .grouping
            .as_ref()
            .and_then(|grouping| grouping.reference.as_ref());
        let group_order = match reference {
            Some(reference) => self
                .fetch_with_retry(&reference.collection, &reference.query)
                .await?
                .iter()
                .filter_map(|record| record.get(&reference.field).map(|v| v.to_string()))
                .collect(),
            None => Vec::new(),
        };

        Ok((records, group_order))
    }

    async fn fetch_with_retry(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Record>, SourceError> {
        let mut attempt = 0;
        loop {
            match self.source.fetch_collection(collection, query).await {
                Ok(records) => return Ok(records),
                Err(err) if err.is_retryable() && attempt < self.fetch_retries => {
                    attempt += 1;
                    tracing::warn!(collection, attempt, error = %err, "retrying fetch");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Changes one filter. Recomputes in memory and returns to page 1.
    pub fn set_filter(&mut self, key: &str, value: &str) {
        self.filter.set(key, value);
        self.pager.reset();
        self.recompute();
    }

    pub fn clear_filter(&mut self, key: &str) {
        self.filter.clear(key);
        self.pager.reset();
        self.recompute();
    }

    pub fn next_page(&mut self) -> bool {
        let moved = self.pager.next();
        if moved {
            self.recompute();
        }
        moved
    }

    pub fn prev_page(&mut self) -> bool {
        let moved = self.pager.prev();
        if moved {
            self.recompute();
        }
        moved
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.pager.go_to(page);
        self.recompute();
    }

    fn recompute(&mut self) {
        let Some(records) = &self.records else {
            return;
        };
        let view = compute(
            &self.config,
            records,
            &self.filter,
            self.pager.current(),
            &self.group_order,
        );
        self.pager.set_total(view.filtered_count);
        self.view = Some(view);
    }

    /// Writes through the data source, then refetches.
    ///
    /// The success notice is sent only after the write is acknowledged. A
    /// rejected write sends an error notice and changes nothing, so the
    /// caller can keep its form populated and retry.
    pub async fn mutate(
        &mut self,
        op: MutationOp,
        payload: Record,
        success_message: &str,
    ) -> Result<Record, SourceError> {
        match self.source.mutate(&self.config.collection, op, payload).await {
            Ok(record) => {
                self.notifier.notify(NoticeKind::Success, success_message);
                // A failed refetch is already reported by `load`.
                let _ = self.load().await;
                Ok(record)
            }
            Err(err) => {
                tracing::error!(
                    collection = %self.config.collection,
                    error = %err,
                    "mutation failed"
                );
                self.notifier.notify(NoticeKind::Error, &format!("Could not save: {err}"));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ALL;
    use crate::notify::MemorySink;
    use crate::source::{patch, MemorySource};
    use uuid::Uuid;

    fn goal(employee: &str, status: &str, progress: f64) -> Record {
        Record::new(Uuid::new_v4())
            .with("employee", employee)
            .with("status", status)
            .with("progress", progress)
    }

    fn goals_config() -> ScreenConfig {
        ScreenConfig::new("performance", "goals", "Goals", "goals")
            .filters(
                &["statusFilter", "employeeFilter"],
                FilterSet::new()
                    .field_equals("statusFilter", "status")
                    .field_equals("employeeFilter", "employee"),
            )
            .metrics(vec![
                Metric::count("total"),
                Metric::share("completionRate", "status", "completed"),
            ])
            .grouping(Grouping::by_field("employee").averaging("progress"))
            .page_size(3)
    }

    fn seeded() -> Vec<Record> {
        let mut records: Vec<Record> = [10.0, 40.0, 60.0, 80.0, 100.0]
            .iter()
            .map(|p| goal("E1", if *p == 100.0 { "completed" } else { "active" }, *p))
            .collect();
        records.extend((0..3).map(|_| goal("E2", "active", 20.0)));
        records
    }

    fn screen(source: Arc<MemorySource>, sink: Arc<MemorySink>) -> Screen {
        Screen::new(goals_config(), source, sink)
    }

    #[test]
    fn compute_runs_every_stage() {
        let config = goals_config();
        let records = seeded();
        let view = compute(&config, &records, &FilterState::new(), 1, &[]);
        assert_eq!(view.filtered_count, 8);
        assert_eq!(view.page.items.len(), 3);
        assert_eq!(view.page.total_pages, 3);
        assert_eq!(view.groups.len(), 2);
        assert_eq!(view.groups[0].aggregate, Some(58.0));
        assert_eq!(view.groups[1].aggregate, Some(20.0));
        assert_eq!(view.aggregate.get("completionRate"), Some(12.5));
    }

    #[test]
    fn group_reference_order_wins() {
        let config = goals_config();
        let records = seeded();
        let order = vec!["E2".to_string(), "E1".to_string()];
        let view = compute(&config, &records, &FilterState::new(), 1, &order);
        let keys: Vec<&str> = view.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["E2", "E1"]);
    }

    #[tokio::test]
    async fn screen_starts_loading_then_ready() {
        let source = Arc::new(MemorySource::new().with_records("goals", seeded()));
        let sink = Arc::new(MemorySink::new());
        let mut screen = screen(source, sink.clone());
        assert_eq!(screen.state(), &ScreenState::Loading);
        assert!(screen.view().is_none());

        screen.load().await.unwrap();
        assert_eq!(screen.state(), &ScreenState::Ready);
        assert_eq!(screen.view().unwrap().filtered_count, 8);
        assert!(sink.notices().is_empty());
    }

    #[tokio::test]
    async fn filter_change_recomputes_without_fetch() {
        let source = Arc::new(MemorySource::new().with_records("goals", seeded()));
        let sink = Arc::new(MemorySink::new());
        let mut screen = screen(source.clone(), sink);
        screen.load().await.unwrap();
        assert!(screen.next_page());

        // A fetch now would fail; filtering must not hit the source.
        source.fail_next(SourceError::Transport("offline".into()));
        screen.set_filter("employeeFilter", "E2");
        screen.set_filter("statusFilter", ALL);

        let view = screen.view().unwrap();
        assert_eq!(screen.state(), &ScreenState::Ready);
        assert_eq!(view.filtered_count, 3);
        assert_eq!(view.page.number, 1);
        assert_eq!(view.groups.len(), 1);
    }

    #[tokio::test]
    async fn first_fetch_failure_then_recovery() {
        let source = Arc::new(MemorySource::new().with_records("goals", seeded()));
        let sink = Arc::new(MemorySink::new());
        let mut screen = screen(source.clone(), sink.clone());

        source.fail_next(SourceError::Rejected("permission denied".into()));
        assert!(screen.load().await.is_err());
        assert!(matches!(screen.state(), ScreenState::Error(_)));
        assert!(screen.view().is_none());
        assert_eq!(sink.count(NoticeKind::Error), 1);

        screen.load().await.unwrap();
        assert_eq!(screen.state(), &ScreenState::Ready);
        assert_eq!(screen.view().unwrap().filtered_count, 8);
        assert_eq!(sink.count(NoticeKind::Error), 1);
    }

    #[tokio::test]
    async fn refetch_failure_keeps_last_good_data() {
        let source = Arc::new(MemorySource::new().with_records("goals", seeded()));
        let sink = Arc::new(MemorySink::new());
        let mut screen = screen(source.clone(), sink.clone());
        screen.load().await.unwrap();

        source.fail_next(SourceError::Transport("timeout".into()));
        assert!(screen.load().await.is_err());
        assert_eq!(screen.state(), &ScreenState::Ready);
        assert_eq!(screen.view().unwrap().filtered_count, 8);
        assert_eq!(sink.count(NoticeKind::Error), 1);
    }

    #[tokio::test]
    async fn transport_failures_are_retried_quietly() {
        let source = Arc::new(MemorySource::new().with_records("goals", seeded()));
        let sink = Arc::new(MemorySink::new());
        let mut screen = screen(source.clone(), sink.clone()).with_retries(1);

        source.fail_next(SourceError::Transport("connection reset".into()));
        screen.load().await.unwrap();
        assert_eq!(screen.state(), &ScreenState::Ready);
        assert!(sink.notices().is_empty());

        source.fail_next(SourceError::Rejected("invalid query".into()));
        assert!(screen.load().await.is_err());
        assert_eq!(sink.count(NoticeKind::Error), 1);
    }

    #[tokio::test]
    async fn mutation_notifies_then_refetches() {
        let records = seeded();
        let target = records[0].id;
        let source = Arc::new(MemorySource::new().with_records("goals", records));
        let sink = Arc::new(MemorySink::new());
        let mut screen = screen(source, sink.clone());
        screen.load().await.unwrap();
        screen.set_filter("statusFilter", "completed");
        assert_eq!(screen.view().unwrap().filtered_count, 1);

        screen
            .mutate(
                MutationOp::Update,
                patch(target).with("status", "completed"),
                "Goal completed",
            )
            .await
            .unwrap();

        assert_eq!(sink.notices(), vec![(NoticeKind::Success, "Goal completed".to_string())]);
        assert_eq!(screen.view().unwrap().filtered_count, 2);
    }

    #[tokio::test]
    async fn rejected_mutation_changes_nothing() {
        let source = Arc::new(MemorySource::new().with_records("goals", seeded()));
        let sink = Arc::new(MemorySink::new());
        let mut screen = screen(source.clone(), sink.clone());
        screen.load().await.unwrap();
        let before = screen.view().cloned();

        source.fail_next(SourceError::Rejected("validation failed".into()));
        let result = screen
            .mutate(MutationOp::Insert, goal("E3", "active", 0.0), "Goal added")
            .await;

        assert!(result.is_err());
        assert_eq!(sink.count(NoticeKind::Success), 0);
        assert_eq!(sink.count(NoticeKind::Error), 1);
        assert_eq!(screen.view().cloned(), before);
    }
}
