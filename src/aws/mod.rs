use crate::error::AppError;
use crate::models::{DateRange, Granularity};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::error;

pub mod client;
pub mod schema;
pub mod sigv4;

pub const DEFAULT_METRIC: &str = "BlendedCost";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDefinition {
    pub kind: String,
    pub key: String,
}

impl GroupDefinition {
    pub fn service() -> Self {
        Self {
            kind: "DIMENSION".into(),
            key: "SERVICE".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    pub range: DateRange,
    pub granularity: Granularity,
    pub metrics: Vec<String>,
    pub group_by: Vec<GroupDefinition>,
}

impl CostQuery {
    pub fn new(range: DateRange, granularity: Granularity) -> Self {
        Self {
            range,
            granularity,
            metrics: vec![DEFAULT_METRIC.into()],
            group_by: vec![],
        }
    }

    pub fn by_service(range: DateRange, granularity: Granularity) -> Self {
        Self {
            group_by: vec![GroupDefinition::service()],
            ..Self::new(range, granularity)
        }
    }

    pub fn with_metric(mut self, metric: &str) -> Self {
        self.metrics = vec![metric.to_string()];
        self
    }

    /// `GetCostAndUsage` request body. Hourly queries need full timestamps.
    pub fn to_request_body(&self, next_page_token: Option<&str>) -> Value {
        let fmt = |d: chrono::NaiveDate| match self.granularity {
            Granularity::Hourly => format!("{}T00:00:00Z", d.format("%Y-%m-%d")),
            _ => d.format("%Y-%m-%d").to_string(),
        };

        let mut body = json!({
            "TimePeriod": { "Start": fmt(self.range.start), "End": fmt(self.range.end) },
            "Granularity": self.granularity.as_api_value(),
            "Metrics": self.metrics,
        });
        if !self.group_by.is_empty() {
            body["GroupBy"] = self
                .group_by
                .iter()
                .map(|g| json!({ "Type": g.kind, "Key": g.key }))
                .collect();
        }
        if let Some(token) = next_page_token {
            body["NextPageToken"] = Value::String(token.to_string());
        }
        body
    }
}

/// Boundary to the Cost Explorer API.
///
/// Responses are returned as raw JSON; shaping them is the processor's job.
#[async_trait]
pub trait CostExplorerApi: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails with a credentials or API error describing why access is refused.
    async fn check_credentials(&self) -> Result<(), AppError>;

    async fn get_cost_and_usage(&self, query: &CostQuery) -> Result<Value, AppError>;

    async fn get_services_list(&self, range: DateRange) -> Result<Vec<String>, AppError>;

    async fn validate_credentials(&self) -> bool {
        match self.check_credentials().await {
            Ok(()) => true,
            Err(e) => {
                error!(source = self.name(), error = %e, "AWS credential validation failed");
                false
            }
        }
    }

    async fn get_cost_by_service(
        &self,
        range: DateRange,
        granularity: Granularity,
        metric: &str,
    ) -> Result<Value, AppError> {
        self.get_cost_and_usage(&CostQuery::by_service(range, granularity).with_metric(metric))
            .await
    }
}

/// One-day DAILY probe used to confirm the credentials can read billing data.
pub fn credential_probe() -> CostQuery {
    let today = Utc::now().date_naive();
    CostQuery::new(
        DateRange::new(today - Duration::days(1), today),
        Granularity::Daily,
    )
}
