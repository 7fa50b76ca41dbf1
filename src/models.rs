use crate::error::ValidationErrorKind;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Group key used for ungrouped (account-wide) results.
pub const TOTAL_KEY: &str = "Total";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn parse(input: &str) -> Result<Self, ValidationErrorKind> {
        match input.trim().to_ascii_uppercase().as_str() {
            "HOURLY" => Ok(Granularity::Hourly),
            "DAILY" => Ok(Granularity::Daily),
            "WEEKLY" => Ok(Granularity::Weekly),
            "MONTHLY" => Ok(Granularity::Monthly),
            _ => Err(ValidationErrorKind::InvalidGranularity(input.to_string())),
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            Granularity::Hourly => "HOURLY",
            Granularity::Daily => "DAILY",
            Granularity::Weekly => "WEEKLY",
            Granularity::Monthly => "MONTHLY",
        }
    }

    /// Value sent to Cost Explorer. Weekly buckets are built from daily data.
    pub fn as_api_value(self) -> &'static str {
        match self {
            Granularity::Hourly => "HOURLY",
            Granularity::Daily | Granularity::Weekly => "DAILY",
            Granularity::Monthly => "MONTHLY",
        }
    }

    pub fn change_label(self) -> &'static str {
        match self {
            Granularity::Hourly => "Hour-over-Hour Change",
            Granularity::Daily => "Day-over-Day Change",
            Granularity::Weekly => "Week-over-Week Change",
            Granularity::Monthly => "Month-over-Month Change",
        }
    }

    pub fn axis_title(self) -> &'static str {
        match self {
            Granularity::Hourly => "Date & Time",
            Granularity::Daily => "Date",
            Granularity::Weekly => "Week Starting",
            Granularity::Monthly => "Month",
        }
    }

    pub fn date_format(self) -> &'static str {
        match self {
            Granularity::Hourly => "%Y-%m-%d %H:%M",
            Granularity::Daily | Granularity::Weekly => "%Y-%m-%d",
            Granularity::Monthly => "%Y-%m",
        }
    }

    /// Best bucket size for a range of the given length.
    pub fn suggested_for_days(days: i64) -> Self {
        match days {
            d if d <= 2 => Granularity::Hourly,
            d if d <= 31 => Granularity::Daily,
            d if d <= 93 => Granularity::Weekly,
            _ => Granularity::Monthly,
        }
    }
}

/// Half-open date range `[start, end)`, matching Cost Explorer's convention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn last_days(today: NaiveDate, days: i64) -> Self {
        Self {
            start: today - Duration::days(days),
            end: today,
        }
    }
}

pub fn parse_date(input: &str) -> Result<NaiveDate, ValidationErrorKind> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationErrorKind::InvalidDate(input.to_string()))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimePeriodPreset {
    Last7Days,
    Last30Days,
    Last3Months,
    Last6Months,
    Last12Months,
    Custom,
}

impl TimePeriodPreset {
    pub fn parse(input: &str) -> Result<Self, ValidationErrorKind> {
        match input.trim().to_ascii_lowercase().as_str() {
            "7d" => Ok(TimePeriodPreset::Last7Days),
            "30d" => Ok(TimePeriodPreset::Last30Days),
            "3m" => Ok(TimePeriodPreset::Last3Months),
            "6m" => Ok(TimePeriodPreset::Last6Months),
            "12m" => Ok(TimePeriodPreset::Last12Months),
            "custom" => Ok(TimePeriodPreset::Custom),
            _ => Err(ValidationErrorKind::InvalidPreset(input.to_string())),
        }
    }

    pub fn as_days(self) -> Option<i64> {
        match self {
            TimePeriodPreset::Last7Days => Some(7),
            TimePeriodPreset::Last30Days => Some(30),
            TimePeriodPreset::Last3Months => Some(90),
            TimePeriodPreset::Last6Months => Some(180),
            TimePeriodPreset::Last12Months => Some(365),
            TimePeriodPreset::Custom => None,
        }
    }

    pub fn range(self, today: NaiveDate) -> Option<DateRange> {
        self.as_days().map(|days| DateRange::last_days(today, days))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostRecord {
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub group_key: String,
    pub metric_name: String,
    pub amount: f64,
    pub unit: String,
}

/// Records for a single metric and unit, ordered by period then group key.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CostTable {
    metric_name: String,
    unit: String,
    records: Vec<CostRecord>,
    dropped_records: usize,
}

impl CostTable {
    pub fn new(metric_name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            unit: unit.into(),
            records: vec![],
            dropped_records: 0,
        }
    }

    pub(crate) fn from_parts(
        metric_name: String,
        unit: String,
        mut records: Vec<CostRecord>,
        dropped_records: usize,
    ) -> Self {
        records.sort_by(|a, b| {
            a.period_start
                .cmp(&b.period_start)
                .then_with(|| a.group_key.cmp(&b.group_key))
        });
        Self {
            metric_name,
            unit,
            records,
            dropped_records,
        }
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    /// Rows skipped while parsing (non-numeric amount or mismatched unit).
    pub fn dropped_records(&self) -> usize {
        self.dropped_records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendSummary {
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub total_amount: f64,
    pub percent_change_from_previous_period: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopServiceEntry {
    pub group_key: String,
    pub amount: f64,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopServicesResult {
    pub entries: Vec<TopServiceEntry>,
}

impl TopServicesResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.group_key.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostSummary {
    pub total_cost: f64,
    pub service_count: usize,
    pub time_periods: usize,
    pub top_service: String,
    pub top_service_cost: f64,
    pub average_period_cost: f64,
    pub unit: String,
}

impl Default for CostSummary {
    fn default() -> Self {
        Self {
            total_cost: 0.0,
            service_count: 0,
            time_periods: 0,
            top_service: "N/A".into(),
            top_service_cost: 0.0,
            average_period_cost: 0.0,
            unit: "USD".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodChange {
    pub label: String,
    pub current: f64,
    pub previous: f64,
    pub change_amount: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSeries {
    pub service: String,
    pub amounts: Vec<f64>,
}

/// Per-service amounts pivoted onto a shared period axis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceTrendTable {
    pub periods: Vec<NaiveDateTime>,
    pub series: Vec<ServiceSeries>,
}

impl ServiceTrendTable {
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty() || self.series.is_empty()
    }
}
