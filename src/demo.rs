//! Synthetic Cost Explorer data so the dashboard runs without credentials.

use crate::aws::{CostExplorerApi, CostQuery};
use crate::error::AppError;
use crate::models::{DateRange, Granularity};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde_json::{json, Map, Value};

/// Monthly baseline cost per service, in USD.
const SERVICES: [(&str, f64); 7] = [
    ("AWS Lambda", 12.30),
    ("Amazon CloudFront", 34.80),
    ("Amazon CloudWatch", 8.40),
    ("Amazon DynamoDB", 22.10),
    ("Amazon EC2-Instance", 245.50),
    ("Amazon RDS", 156.75),
    ("Amazon S3", 89.25),
];

pub struct DemoClient;

fn midnight(d: NaiveDate) -> NaiveDateTime {
    d.and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn next_month_start(d: NaiveDate) -> NaiveDate {
    let (y, m) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(d + Duration::days(31))
}

fn buckets(range: DateRange, granularity: Granularity) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let end = midnight(range.end);
    let mut out = Vec::new();
    let mut cursor = midnight(range.start);

    while cursor < end {
        let next = match granularity {
            Granularity::Hourly => cursor + Duration::hours(1),
            Granularity::Daily | Granularity::Weekly => cursor + Duration::days(1),
            Granularity::Monthly => midnight(next_month_start(cursor.date())),
        };
        let next = next.min(end);
        out.push((cursor, next));
        cursor = next;
    }
    out
}

fn synthetic_amount(
    service_idx: usize,
    base_monthly: f64,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> f64 {
    let reference = midnight(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default());
    let months_elapsed = (start - reference).num_days() as f64 / 30.0;
    let growth = (1.0 + 0.04 * months_elapsed).max(0.5);
    let share_of_month = (end - start).num_minutes() as f64 / (30.0 * 24.0 * 60.0);
    let seed = (start.ordinal() as usize * 31 + start.hour() as usize * 7 + service_idx * 17) % 11;
    let wiggle = 0.9 + seed as f64 * 0.02;
    base_monthly * growth * share_of_month * wiggle
}

fn format_bound(ts: NaiveDateTime, granularity: Granularity) -> String {
    match granularity {
        Granularity::Hourly => ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        _ => ts.format("%Y-%m-%d").to_string(),
    }
}

fn metric_values(metrics: &[String], amount: f64) -> Value {
    let mut map = Map::new();
    for metric in metrics {
        let (value, unit) = if metric == "UsageQuantity" {
            (amount * 12.0, "N/A")
        } else {
            (amount, "USD")
        };
        map.insert(
            metric.clone(),
            json!({ "Amount": format!("{value:.6}"), "Unit": unit }),
        );
    }
    Value::Object(map)
}

/// Builds a `GetCostAndUsage`-shaped body for `query`.
pub fn synthetic_response(query: &CostQuery) -> Value {
    let grouped = !query.group_by.is_empty();
    let results: Vec<Value> = buckets(query.range, query.granularity)
        .into_iter()
        .map(|(start, end)| {
            let amounts: Vec<(&str, f64)> = SERVICES
                .iter()
                .enumerate()
                .map(|(i, (name, base))| (*name, synthetic_amount(i, *base, start, end)))
                .collect();

            let time_period = json!({
                "Start": format_bound(start, query.granularity),
                "End": format_bound(end, query.granularity),
            });

            if grouped {
                let groups: Vec<Value> = amounts
                    .iter()
                    .map(|(name, amount)| {
                        json!({ "Keys": [name], "Metrics": metric_values(&query.metrics, *amount) })
                    })
                    .collect();
                json!({ "TimePeriod": time_period, "Total": {}, "Groups": groups, "Estimated": false })
            } else {
                let total: f64 = amounts.iter().map(|(_, a)| a).sum();
                json!({
                    "TimePeriod": time_period,
                    "Total": metric_values(&query.metrics, total),
                    "Groups": [],
                    "Estimated": false
                })
            }
        })
        .collect();

    json!({ "ResultsByTime": results, "DimensionValueAttributes": [] })
}

#[async_trait]
impl CostExplorerApi for DemoClient {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn check_credentials(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_cost_and_usage(&self, query: &CostQuery) -> Result<Value, AppError> {
        Ok(synthetic_response(query))
    }

    async fn get_services_list(&self, _range: DateRange) -> Result<Vec<String>, AppError> {
        Ok(SERVICES.iter().map(|(name, _)| (*name).to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{build_cost_table, compute_trends, top_services};

    fn range(start: (i32, u32, u32), end: (i32, u32, u32)) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(start.0, start.1, start.2).expect("date"),
            NaiveDate::from_ymd_opt(end.0, end.1, end.2).expect("date"),
        )
    }

    #[test]
    fn monthly_buckets_clip_to_range() {
        let b = buckets(range((2024, 1, 15), (2024, 3, 10)), Granularity::Monthly);
        assert_eq!(b.len(), 3);
        assert_eq!(b[0].1, midnight(NaiveDate::from_ymd_opt(2024, 2, 1).expect("date")));
        assert_eq!(b[2].1, midnight(NaiveDate::from_ymd_opt(2024, 3, 10).expect("date")));
    }

    #[test]
    fn hourly_and_daily_bucket_counts() {
        let r = range((2024, 1, 1), (2024, 1, 3));
        assert_eq!(buckets(r, Granularity::Hourly).len(), 48);
        assert_eq!(buckets(r, Granularity::Daily).len(), 2);
        assert_eq!(buckets(range((2024, 12, 1), (2025, 2, 1)), Granularity::Monthly).len(), 2);
    }

    #[test]
    fn synthetic_response_parses_into_a_full_table() {
        let query = CostQuery::by_service(range((2024, 1, 1), (2024, 4, 1)), Granularity::Monthly);
        let table = build_cost_table(&synthetic_response(&query), "BlendedCost").expect("table");
        assert_eq!(table.len(), 3 * SERVICES.len());
        assert_eq!(compute_trends(&table).len(), 3);
        assert_eq!(top_services(&table, 10).entries[0].group_key, "Amazon EC2-Instance");
    }

    #[test]
    fn synthetic_response_is_deterministic() {
        let query = CostQuery::by_service(range((2024, 5, 1), (2024, 5, 20)), Granularity::Daily);
        assert_eq!(synthetic_response(&query), synthetic_response(&query));
    }

    #[test]
    fn ungrouped_query_reports_totals() {
        let query = CostQuery::new(range((2024, 1, 1), (2024, 1, 2)), Granularity::Daily);
        let raw = synthetic_response(&query);
        assert!(raw["ResultsByTime"][0]["Total"]["BlendedCost"]["Amount"].is_string());
    }
}
