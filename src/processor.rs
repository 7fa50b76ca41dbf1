use crate::aws::schema::{CostAndUsageResponse, MetricValue};
use crate::error::{AppError, DataErrorKind};
use crate::models::{
    CostRecord, CostSummary, CostTable, Granularity, PeriodChange, ServiceSeries,
    ServiceTrendTable, TopServiceEntry, TopServicesResult, TrendSummary, TOTAL_KEY,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

fn parse_period_bound(raw: &str) -> Result<NaiveDateTime, AppError> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.naive_utc());
    }
    Err(DataErrorKind::MalformedResponse(format!("unparseable TimePeriod bound '{raw}'")).into())
}

/// Converts a raw `GetCostAndUsage` body into a table for `metric`.
///
/// Shape mismatches fail fast; individual records with a non-numeric amount
/// or a unit that differs from the table's are skipped with a warning.
pub fn build_cost_table(raw_response: &Value, metric: &str) -> Result<CostTable, AppError> {
    if raw_response.get("ResultsByTime").is_none() {
        return Err(DataErrorKind::MalformedResponse("missing ResultsByTime".into()).into());
    }
    let response: CostAndUsageResponse = serde_json::from_value(raw_response.clone())
        .map_err(|e| DataErrorKind::MalformedResponse(e.to_string()))?;

    let mut records = Vec::new();
    let mut unit: Option<String> = None;
    let mut dropped = 0usize;

    for (idx, result) in response.results_by_time.iter().enumerate() {
        let period_start = parse_period_bound(&result.time_period.start)?;
        let period_end = parse_period_bound(&result.time_period.end)?;

        let rows: Vec<(String, &MetricValue)> = match (&result.groups, &result.total) {
            (Some(groups), _) if !groups.is_empty() => groups
                .iter()
                .filter_map(|g| {
                    let key = g.keys.first().cloned().unwrap_or_else(|| TOTAL_KEY.into());
                    g.metrics.get(metric).map(|v| (key, v))
                })
                .collect(),
            (_, Some(total)) => total
                .get(metric)
                .map(|v| vec![(TOTAL_KEY.to_string(), v)])
                .unwrap_or_default(),
            (Some(_), None) => vec![],
            (None, None) => {
                return Err(DataErrorKind::MalformedResponse(format!(
                    "ResultsByTime[{idx}] has neither Groups nor Total"
                ))
                .into());
            }
        };

        for (group_key, value) in rows {
            let Some(amount) = value.parsed_amount() else {
                warn!(
                    period = %result.time_period.start,
                    group = %group_key,
                    amount = %value.amount,
                    "dropping cost record with non-numeric amount"
                );
                dropped += 1;
                continue;
            };

            match &unit {
                None => unit = Some(value.unit.clone()),
                Some(expected) if *expected != value.unit => {
                    warn!(
                        period = %result.time_period.start,
                        group = %group_key,
                        unit = %value.unit,
                        expected = %expected,
                        "dropping cost record with mismatched unit"
                    );
                    dropped += 1;
                    continue;
                }
                Some(_) => {}
            }

            records.push(CostRecord {
                period_start,
                period_end,
                group_key,
                metric_name: metric.to_string(),
                amount,
                unit: value.unit.clone(),
            });
        }
    }

    Ok(CostTable::from_parts(
        metric.to_string(),
        unit.unwrap_or_else(|| "USD".into()),
        records,
        dropped,
    ))
}

/// One summary per distinct period, oldest first.
///
/// Percent change is `(curr - prev) / prev * 100`. The first period, and any
/// period whose predecessor totalled exactly zero, report a change of 0.
pub fn compute_trends(table: &CostTable) -> Vec<TrendSummary> {
    let mut by_period: BTreeMap<NaiveDateTime, (NaiveDateTime, f64)> = BTreeMap::new();
    for r in table.records() {
        let entry = by_period
            .entry(r.period_start)
            .or_insert((r.period_end, 0.0));
        entry.0 = entry.0.max(r.period_end);
        entry.1 += r.amount;
    }

    let mut previous: Option<f64> = None;
    by_period
        .into_iter()
        .map(|(start, (end, total))| {
            let change = percent_change(previous, total);
            previous = Some(total);
            TrendSummary {
                period_start: start,
                period_end: end,
                total_amount: total,
                percent_change_from_previous_period: change,
            }
        })
        .collect()
}

fn percent_change(previous: Option<f64>, current: f64) -> f64 {
    match previous {
        Some(prev) if prev != 0.0 => (current - prev) / prev * 100.0,
        _ => 0.0,
    }
}

fn totals_by_service(table: &CostTable) -> HashMap<&str, f64> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for r in table.records().iter().filter(|r| r.group_key != TOTAL_KEY) {
        *totals.entry(r.group_key.as_str()).or_insert(0.0) += r.amount;
    }
    totals
}

/// Highest-cost services across the whole table, ties broken by name.
pub fn top_services(table: &CostTable, n: usize) -> TopServicesResult {
    let totals = totals_by_service(table);
    let grand_total: f64 = totals.values().sum();

    let mut ranked: Vec<(&str, f64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(n);

    TopServicesResult {
        entries: ranked
            .into_iter()
            .map(|(key, amount)| TopServiceEntry {
                group_key: key.to_string(),
                amount,
                percent_of_total: if grand_total > 0.0 {
                    amount / grand_total * 100.0
                } else {
                    0.0
                },
            })
            .collect(),
    }
}

fn week_start(ts: NaiveDateTime) -> NaiveDateTime {
    let date = ts.date();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    monday.and_hms_opt(0, 0, 0).unwrap_or_default()
}

/// Re-buckets daily records into Monday-starting weeks.
pub fn aggregate_weekly(table: &CostTable) -> CostTable {
    let mut buckets: BTreeMap<(NaiveDateTime, String), f64> = BTreeMap::new();
    for r in table.records() {
        *buckets
            .entry((week_start(r.period_start), r.group_key.clone()))
            .or_insert(0.0) += r.amount;
    }

    let records = buckets
        .into_iter()
        .map(|((start, group_key), amount)| CostRecord {
            period_start: start,
            period_end: start + Duration::days(7),
            group_key,
            metric_name: table.metric_name().to_string(),
            amount,
            unit: table.unit().to_string(),
        })
        .collect();

    CostTable::from_parts(
        table.metric_name().to_string(),
        table.unit().to_string(),
        records,
        table.dropped_records(),
    )
}

/// Pivots the table to one column per service, filling gaps with zero.
/// With `services` unset, every service is included in name order.
pub fn service_trends(table: &CostTable, services: Option<&[String]>) -> ServiceTrendTable {
    let periods: Vec<NaiveDateTime> = table
        .records()
        .iter()
        .filter(|r| r.group_key != TOTAL_KEY)
        .map(|r| r.period_start)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let names: Vec<String> = match services {
        Some(list) => list.to_vec(),
        None => table
            .records()
            .iter()
            .filter(|r| r.group_key != TOTAL_KEY)
            .map(|r| r.group_key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let position: HashMap<NaiveDateTime, usize> =
        periods.iter().enumerate().map(|(i, p)| (*p, i)).collect();

    let series = names
        .into_iter()
        .map(|service| {
            let mut amounts = vec![0.0; periods.len()];
            for r in table.records().iter().filter(|r| r.group_key == service) {
                if let Some(&i) = position.get(&r.period_start) {
                    amounts[i] += r.amount;
                }
            }
            ServiceSeries { service, amounts }
        })
        .collect();

    ServiceTrendTable { periods, series }
}

pub fn cost_summary(table: &CostTable) -> CostSummary {
    if table.is_empty() {
        return CostSummary {
            unit: table.unit().to_string(),
            ..CostSummary::default()
        };
    }

    let total_cost: f64 = table.records().iter().map(|r| r.amount).sum();
    let time_periods = table
        .records()
        .iter()
        .map(|r| r.period_start)
        .collect::<BTreeSet<_>>()
        .len();
    let service_count = totals_by_service(table).len();
    let top = top_services(table, 1);
    let (top_service, top_service_cost) = top
        .entries
        .first()
        .map(|e| (e.group_key.clone(), e.amount))
        .unwrap_or_else(|| ("N/A".into(), 0.0));

    CostSummary {
        total_cost,
        service_count,
        time_periods,
        top_service,
        top_service_cost,
        average_period_cost: if time_periods > 0 {
            total_cost / time_periods as f64
        } else {
            0.0
        },
        unit: table.unit().to_string(),
    }
}

/// Compares the last two periods; `None` with fewer than two.
pub fn period_change(trends: &[TrendSummary], granularity: Granularity) -> Option<PeriodChange> {
    let [.., previous, current] = trends else {
        return None;
    };
    Some(PeriodChange {
        label: granularity.change_label().to_string(),
        current: current.total_amount,
        previous: previous.total_amount,
        change_amount: current.total_amount - previous.total_amount,
        change_percent: percent_change(Some(previous.total_amount), current.total_amount),
    })
}
