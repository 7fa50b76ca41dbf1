use crate::aws::CostExplorerApi;
use crate::cache::{CacheKey, CostCache};
use crate::charts::{
    comparison_chart, service_bar_chart, service_pie_chart, service_trend_chart,
    trend_line_chart, ChartSpec,
};
use crate::config::AppConfig;
use crate::error::{AppError, ValidationErrorKind};
use crate::models::{
    parse_date, CostSummary, CostTable, DateRange, Granularity, PeriodChange, ServiceTrendTable,
    TimePeriodPreset, TopServicesResult, TrendSummary,
};
use crate::processor::{
    aggregate_weekly, build_cost_table, compute_trends, cost_summary, period_change,
    service_trends, top_services,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Services plotted in the per-service trend chart.
const TREND_SERVICES: usize = 5;

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub metric: String,
    pub max_days_back: i64,
    pub default_days_back: i64,
    pub top_services_count: usize,
    pub default_granularity: Granularity,
}

impl From<&AppConfig> for DashboardSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            metric: cfg.metric.clone(),
            max_days_back: cfg.max_days_back,
            default_days_back: cfg.default_days_back,
            top_services_count: cfg.top_services_count,
            default_granularity: cfg.granularity(),
        }
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Raw user input, as received from the query string or CLI flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub granularity: Option<String>,
    pub preset: Option<String>,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardRequest {
    pub range: DateRange,
    pub granularity: Granularity,
    /// Skip the cache read and overwrite whatever is stored.
    pub refresh: bool,
}

impl DashboardRequest {
    pub fn new(range: DateRange, granularity: Granularity) -> Self {
        Self {
            range,
            granularity,
            refresh: false,
        }
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            range: self.range,
            granularity: self.granularity,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub message: String,
}

impl Notice {
    fn from_error(err: &AppError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.user_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardCharts {
    pub cost_trend: ChartSpec,
    pub service_pie: ChartSpec,
    pub service_bar: ChartSpec,
    pub service_trends: ChartSpec,
    pub comparison: ChartSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub source: String,
    pub range: DateRange,
    pub granularity: Granularity,
    pub summary: CostSummary,
    pub trends: Vec<TrendSummary>,
    pub period_change: Option<PeriodChange>,
    pub top_services: TopServicesResult,
    pub service_trends: ServiceTrendTable,
    pub charts: DashboardCharts,
    pub dropped_records: usize,
    pub notice: Option<Notice>,
}

impl DashboardView {
    /// Assembles every dashboard panel from an already-processed table.
    pub fn from_table(
        source: &str,
        request: &DashboardRequest,
        table: &CostTable,
        top_n: usize,
    ) -> Self {
        let granularity = request.granularity;
        let summary = cost_summary(table);
        let trends = compute_trends(table);
        let change = period_change(&trends, granularity);
        let top = top_services(table, top_n);
        let trend_keys: Vec<String> = top.keys().into_iter().take(TREND_SERVICES).collect();
        let pivot = if trend_keys.is_empty() {
            ServiceTrendTable::default()
        } else {
            service_trends(table, Some(trend_keys.as_slice()))
        };

        let notice = if table.is_empty() {
            Some(Notice {
                kind: "data".into(),
                message: "No cost data available for the selected period.".into(),
            })
        } else if table.dropped_records() > 0 {
            Some(Notice {
                kind: "warning".into(),
                message: format!(
                    "{} cost record(s) were skipped (unreadable amount or mismatched unit).",
                    table.dropped_records()
                ),
            })
        } else {
            None
        };

        Self {
            source: source.to_string(),
            range: request.range,
            granularity,
            charts: DashboardCharts {
                cost_trend: trend_line_chart(&trends, granularity),
                service_pie: service_pie_chart(&top),
                service_bar: service_bar_chart(&top),
                service_trends: service_trend_chart(&pivot, granularity),
                comparison: comparison_chart(change.as_ref()),
            },
            summary,
            trends,
            period_change: change,
            top_services: top,
            service_trends: pivot,
            dropped_records: table.dropped_records(),
            notice,
        }
    }

    /// Empty dashboard carrying an inline error message.
    pub fn degraded(source: &str, request: &DashboardRequest, err: &AppError) -> Self {
        let mut view = Self::from_table(source, request, &CostTable::new("", "USD"), 0);
        view.notice = Some(Notice::from_error(err));
        view
    }
}

/// Cache check followed by fetch-and-process, in that order.
pub struct CachedFetcher {
    client: Arc<dyn CostExplorerApi>,
    cache: Arc<CostCache>,
    metric: String,
}

impl CachedFetcher {
    pub fn new(client: Arc<dyn CostExplorerApi>, cache: Arc<CostCache>, metric: &str) -> Self {
        Self {
            client,
            cache,
            metric: metric.to_string(),
        }
    }

    pub async fn fetch(&self, request: &DashboardRequest) -> Result<Arc<CostTable>, AppError> {
        let key = request.cache_key();
        if !request.refresh {
            if let Some(hit) = self.cache.get(&key) {
                debug!(start = %key.range.start, end = %key.range.end, "cost cache hit");
                return Ok(hit);
            }
        }

        let purged = self.cache.purge_expired();
        info!(
            source = self.client.name(),
            start = %key.range.start,
            end = %key.range.end,
            granularity = key.granularity.as_label(),
            purged,
            "fetching cost data"
        );

        let raw = self
            .client
            .get_cost_by_service(request.range, request.granularity, &self.metric)
            .await?;
        let table = build_cost_table(&raw, &self.metric)?;
        let table = if request.granularity == Granularity::Weekly {
            aggregate_weekly(&table)
        } else {
            table
        };

        let table = Arc::new(table);
        self.cache.insert(key, Arc::clone(&table));
        Ok(table)
    }
}

pub struct DashboardService {
    client: Arc<dyn CostExplorerApi>,
    fetcher: CachedFetcher,
    settings: DashboardSettings,
}

impl DashboardService {
    pub fn new(
        client: Arc<dyn CostExplorerApi>,
        cache: Arc<CostCache>,
        settings: DashboardSettings,
    ) -> Self {
        Self {
            fetcher: CachedFetcher::new(Arc::clone(&client), cache, &settings.metric),
            client,
            settings,
        }
    }

    pub fn source(&self) -> &'static str {
        self.client.name()
    }

    pub fn validate_range(&self, range: DateRange, today: NaiveDate) -> Result<(), AppError> {
        if range.start >= range.end {
            return Err(ValidationErrorKind::InvertedRange.into());
        }
        if range.end > today + Duration::days(1) {
            return Err(ValidationErrorKind::EndInFuture.into());
        }
        let days = range.days();
        if days > self.settings.max_days_back {
            return Err(ValidationErrorKind::RangeTooLong {
                days,
                max_days: self.settings.max_days_back,
            }
            .into());
        }
        Ok(())
    }

    /// Turns user input into a validated request. No network access.
    pub fn resolve_request(
        &self,
        query: &DashboardQuery,
        today: NaiveDate,
    ) -> Result<DashboardRequest, AppError> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let preset = non_empty(&query.preset)
            .map(|p| TimePeriodPreset::parse(&p))
            .transpose()?;
        let preset_range = preset.and_then(|p| p.range(today));

        let range = match preset_range {
            Some(range) => range,
            None => {
                let end = non_empty(&query.end)
                    .map(|e| parse_date(&e))
                    .transpose()?
                    .unwrap_or(today);
                let start = non_empty(&query.start)
                    .map(|s| parse_date(&s))
                    .transpose()?
                    .unwrap_or(end - Duration::days(self.settings.default_days_back));
                DateRange::new(start, end)
            }
        };

        let granularity = match non_empty(&query.granularity) {
            Some(g) => Granularity::parse(&g)?,
            None if preset_range.is_some() => Granularity::suggested_for_days(range.days()),
            None => self.settings.default_granularity,
        };

        self.validate_range(range, today)?;
        Ok(DashboardRequest {
            range,
            granularity,
            refresh: query.refresh,
        })
    }

    /// Validates, then serves from cache or Cost Explorer.
    pub async fn load_table(&self, request: &DashboardRequest) -> Result<Arc<CostTable>, AppError> {
        self.validate_range(request.range, Utc::now().date_naive())?;
        self.fetcher.fetch(request).await
    }

    /// Full dashboard. Only validation errors are returned as `Err`; anything
    /// else degrades to an empty view with an inline notice.
    pub async fn build_view(&self, request: &DashboardRequest) -> Result<DashboardView, AppError> {
        match self.load_table(request).await {
            Ok(table) => Ok(DashboardView::from_table(
                self.source(),
                request,
                &table,
                self.settings.top_services_count,
            )),
            Err(e) if e.is_validation() => Err(e),
            Err(e) => {
                warn!(error = %e, "dashboard refresh failed");
                Ok(DashboardView::degraded(self.source(), request, &e))
            }
        }
    }

    pub async fn services(&self, range: DateRange) -> Result<Vec<String>, AppError> {
        self.validate_range(range, Utc::now().date_naive())?;
        self.client.get_services_list(range).await
    }

    pub async fn check_connection(&self) -> bool {
        self.client.validate_credentials().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::CostQuery;
    use crate::error::{ApiErrorKind, CredentialsErrorKind};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct FakeClient {
        calls: AtomicUsize,
        response: Result<Value, fn() -> AppError>,
    }

    impl FakeClient {
        fn ok(response: Value) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response: Ok(response),
            })
        }

        fn failing(err: fn() -> AppError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response: Err(err),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CostExplorerApi for FakeClient {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn check_credentials(&self) -> Result<(), AppError> {
            Ok(())
        }

        async fn get_cost_and_usage(&self, _query: &CostQuery) -> Result<Value, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(v) => Ok(v.clone()),
                Err(make) => Err(make()),
            }
        }

        async fn get_services_list(&self, _range: DateRange) -> Result<Vec<String>, AppError> {
            Ok(vec!["Amazon S3".into()])
        }
    }

    fn two_month_response() -> Value {
        json!({
            "ResultsByTime": [
                {
                    "TimePeriod": { "Start": "2024-01-01", "End": "2024-02-01" },
                    "Total": {},
                    "Groups": [
                        { "Keys": ["Amazon EC2-Instance"], "Metrics": { "BlendedCost": { "Amount": "60", "Unit": "USD" } } },
                        { "Keys": ["Amazon S3"], "Metrics": { "BlendedCost": { "Amount": "40", "Unit": "USD" } } }
                    ]
                },
                {
                    "TimePeriod": { "Start": "2024-02-01", "End": "2024-03-01" },
                    "Total": {},
                    "Groups": [
                        { "Keys": ["Amazon EC2-Instance"], "Metrics": { "BlendedCost": { "Amount": "100", "Unit": "USD" } } },
                        { "Keys": ["Amazon S3"], "Metrics": { "BlendedCost": { "Amount": "50", "Unit": "USD" } } }
                    ]
                }
            ]
        })
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn service_with(client: Arc<FakeClient>, ttl: StdDuration) -> DashboardService {
        DashboardService::new(
            client,
            Arc::new(CostCache::new(ttl)),
            DashboardSettings::default(),
        )
    }

    fn q2_request() -> DashboardRequest {
        DashboardRequest::new(
            DateRange::new(date(2024, 1, 1), date(2024, 3, 1)),
            Granularity::Monthly,
        )
    }

    #[tokio::test]
    async fn cache_hit_skips_the_client() {
        let client = FakeClient::ok(two_month_response());
        let svc = service_with(Arc::clone(&client), StdDuration::from_secs(3600));

        let first = svc.load_table(&q2_request()).await.expect("first load");
        let second = svc.load_table(&q2_request()).await.expect("second load");

        assert_eq!(client.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn expired_entry_calls_the_client_again() {
        let client = FakeClient::ok(two_month_response());
        let svc = service_with(Arc::clone(&client), StdDuration::ZERO);

        svc.load_table(&q2_request()).await.expect("first load");
        svc.load_table(&q2_request()).await.expect("second load");

        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache() {
        let client = FakeClient::ok(two_month_response());
        let svc = service_with(Arc::clone(&client), StdDuration::from_secs(3600));

        svc.load_table(&q2_request()).await.expect("first load");
        let refreshed = DashboardRequest {
            refresh: true,
            ..q2_request()
        };
        svc.load_table(&refreshed).await.expect("refresh");
        svc.load_table(&q2_request()).await.expect("cached");

        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn different_granularity_is_a_different_cache_entry() {
        let client = FakeClient::ok(two_month_response());
        let svc = service_with(Arc::clone(&client), StdDuration::from_secs(3600));

        svc.load_table(&q2_request()).await.expect("monthly");
        let daily = DashboardRequest {
            granularity: Granularity::Daily,
            ..q2_request()
        };
        svc.load_table(&daily).await.expect("daily");

        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn over_long_range_is_rejected_before_any_call() {
        let client = FakeClient::ok(two_month_response());
        let svc = service_with(Arc::clone(&client), StdDuration::from_secs(3600));
        let request = DashboardRequest::new(
            DateRange::new(date(2023, 1, 1), date(2023, 1, 1) + Duration::days(400)),
            Granularity::Monthly,
        );

        let err = svc.build_view(&request).await.expect_err("validation error");
        assert!(matches!(
            err,
            AppError::Validation(ValidationErrorKind::RangeTooLong { days: 400, max_days: 365 })
        ));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn validate_range_boundaries() {
        let svc = service_with(FakeClient::ok(json!({})), StdDuration::from_secs(1));
        let today = date(2024, 12, 31);

        let full_year = DateRange::new(date(2024, 1, 1), date(2024, 1, 1) + Duration::days(365));
        assert!(svc.validate_range(full_year, today).is_ok());

        let too_long = DateRange::new(date(2023, 1, 1), date(2023, 1, 1) + Duration::days(366));
        assert!(svc.validate_range(too_long, today).is_err());

        let inverted = DateRange::new(date(2024, 2, 1), date(2024, 1, 1));
        assert!(matches!(
            svc.validate_range(inverted, today),
            Err(AppError::Validation(ValidationErrorKind::InvertedRange))
        ));

        let future = DateRange::new(date(2024, 12, 1), date(2025, 1, 5));
        assert!(matches!(
            svc.validate_range(future, today),
            Err(AppError::Validation(ValidationErrorKind::EndInFuture))
        ));
    }

    #[test]
    fn resolve_request_applies_defaults_and_presets() {
        let svc = service_with(FakeClient::ok(json!({})), StdDuration::from_secs(1));
        let today = date(2024, 6, 30);

        let defaulted = svc
            .resolve_request(&DashboardQuery::default(), today)
            .expect("default request");
        assert_eq!(defaulted.range.end, today);
        assert_eq!(defaulted.range.days(), 90);
        assert_eq!(defaulted.granularity, Granularity::Monthly);

        let preset = svc
            .resolve_request(
                &DashboardQuery {
                    preset: Some("30d".into()),
                    ..DashboardQuery::default()
                },
                today,
            )
            .expect("preset request");
        assert_eq!(preset.range.days(), 30);
        assert_eq!(preset.granularity, Granularity::Daily);

        let custom = svc
            .resolve_request(
                &DashboardQuery {
                    start: Some("2024-01-01".into()),
                    end: Some("2024-02-01".into()),
                    granularity: Some("weekly".into()),
                    preset: Some("custom".into()),
                    refresh: true,
                },
                today,
            )
            .expect("custom request");
        assert_eq!(custom.range.start, date(2024, 1, 1));
        assert_eq!(custom.granularity, Granularity::Weekly);
        assert!(custom.refresh);
    }

    #[test]
    fn resolve_request_rejects_bad_input() {
        let svc = service_with(FakeClient::ok(json!({})), StdDuration::from_secs(1));
        let today = date(2024, 6, 30);
        let bad = |q: DashboardQuery| svc.resolve_request(&q, today).expect_err("invalid");

        assert!(bad(DashboardQuery {
            start: Some("yesterday".into()),
            ..DashboardQuery::default()
        })
        .is_validation());
        assert!(bad(DashboardQuery {
            granularity: Some("yearly".into()),
            ..DashboardQuery::default()
        })
        .is_validation());
        assert!(bad(DashboardQuery {
            start: Some("2023-01-01".into()),
            end: Some("2024-02-05".into()),
            ..DashboardQuery::default()
        })
        .is_validation());
    }

    #[tokio::test]
    async fn build_view_populates_every_panel() {
        let svc = service_with(
            FakeClient::ok(two_month_response()),
            StdDuration::from_secs(3600),
        );
        let view = svc.build_view(&q2_request()).await.expect("view");

        assert_eq!(view.source, "fake");
        assert!(view.notice.is_none());
        assert_eq!(view.trends.len(), 2);
        assert!((view.trends[1].percent_change_from_previous_period - 50.0).abs() < 1e-9);
        assert_eq!(view.top_services.keys(), vec!["Amazon EC2-Instance", "Amazon S3"]);
        assert_eq!(view.summary.top_service, "Amazon EC2-Instance");
        let change = view.period_change.as_ref().expect("change");
        assert_eq!(change.label, "Month-over-Month Change");
        assert!(!view.charts.cost_trend.is_placeholder());
        assert!(!view.charts.service_pie.is_placeholder());
        assert!(!view.charts.comparison.is_placeholder());
        assert_eq!(view.service_trends.series.len(), 2);
    }

    #[tokio::test]
    async fn credential_and_api_failures_become_distinct_notices() {
        let no_creds = service_with(
            FakeClient::failing(|| CredentialsErrorKind::Missing.into()),
            StdDuration::from_secs(3600),
        );
        let throttled = service_with(
            FakeClient::failing(|| ApiErrorKind::RateLimited("slow down".into()).into()),
            StdDuration::from_secs(3600),
        );

        let a = no_creds.build_view(&q2_request()).await.expect("degraded view");
        let b = throttled.build_view(&q2_request()).await.expect("degraded view");

        let a_notice = a.notice.expect("notice");
        let b_notice = b.notice.expect("notice");
        assert_eq!(a_notice.kind, "credentials");
        assert_eq!(b_notice.kind, "api");
        assert_ne!(a_notice.message, b_notice.message);
        assert!(a.charts.cost_trend.is_placeholder());
        assert!(b.charts.service_bar.is_placeholder());
    }

    #[tokio::test]
    async fn malformed_response_degrades_to_placeholders() {
        let svc = service_with(
            FakeClient::ok(json!({ "Unexpected": true })),
            StdDuration::from_secs(3600),
        );
        let view = svc.build_view(&q2_request()).await.expect("degraded view");
        assert_eq!(view.notice.map(|n| n.kind), Some("data".to_string()));
        assert!(view.charts.cost_trend.is_placeholder());
        assert_eq!(view.summary.top_service, "N/A");
    }

    #[tokio::test]
    async fn empty_results_render_placeholders_with_notice() {
        let svc = service_with(
            FakeClient::ok(json!({ "ResultsByTime": [] })),
            StdDuration::from_secs(3600),
        );
        let view = svc.build_view(&q2_request()).await.expect("view");
        assert!(view.charts.service_pie.is_placeholder());
        assert!(view.notice.is_some());
    }

    #[tokio::test]
    async fn skipped_records_are_reported_with_both_causes() {
        let mixed = json!({
            "ResultsByTime": [{
                "TimePeriod": { "Start": "2024-01-01", "End": "2024-02-01" },
                "Groups": [
                    { "Keys": ["Amazon EC2-Instance"], "Metrics": { "BlendedCost": { "Amount": "10", "Unit": "USD" } } },
                    { "Keys": ["Amazon S3"], "Metrics": { "BlendedCost": { "Amount": "2", "Unit": "EUR" } } },
                    { "Keys": ["AWS Lambda"], "Metrics": { "BlendedCost": { "Amount": "??", "Unit": "USD" } } }
                ]
            }]
        });
        let svc = service_with(FakeClient::ok(mixed), StdDuration::from_secs(3600));
        let view = svc.build_view(&q2_request()).await.expect("view");

        assert_eq!(view.dropped_records, 2);
        let notice = view.notice.expect("notice");
        assert_eq!(notice.kind, "warning");
        assert!(notice.message.starts_with("2 cost record(s) were skipped"));
        assert!(notice.message.contains("unreadable amount or mismatched unit"));
    }

    #[tokio::test]
    async fn weekly_requests_are_aggregated() {
        let daily = json!({
            "ResultsByTime": [
                { "TimePeriod": { "Start": "2024-01-01", "End": "2024-01-02" }, "Groups": [
                    { "Keys": ["Amazon S3"], "Metrics": { "BlendedCost": { "Amount": "1", "Unit": "USD" } } }
                ]},
                { "TimePeriod": { "Start": "2024-01-02", "End": "2024-01-03" }, "Groups": [
                    { "Keys": ["Amazon S3"], "Metrics": { "BlendedCost": { "Amount": "2", "Unit": "USD" } } }
                ]}
            ]
        });
        let svc = service_with(FakeClient::ok(daily), StdDuration::from_secs(3600));
        let request = DashboardRequest::new(
            DateRange::new(date(2024, 1, 1), date(2024, 1, 3)),
            Granularity::Weekly,
        );
        let table = svc.load_table(&request).await.expect("table");
        assert_eq!(table.len(), 1);
        assert!((table.records()[0].amount - 3.0).abs() < 1e-9);
    }
}
