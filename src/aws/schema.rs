//! Typed view of the `GetCostAndUsage` response body.
//!
//! Cost Explorer returns amounts as decimal strings, so `amount` stays an
//! untyped JSON value here and is parsed record-by-record by the processor.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CostAndUsageResponse {
    pub results_by_time: Vec<ResultByTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultByTime {
    pub time_period: TimePeriod,
    #[serde(default)]
    pub total: Option<BTreeMap<String, MetricValue>>,
    #[serde(default)]
    pub groups: Option<Vec<Group>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimePeriod {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Group {
    #[serde(default)]
    pub keys: Vec<String>,
    pub metrics: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricValue {
    pub amount: Value,
    pub unit: String,
}

impl MetricValue {
    /// Numeric amount, or `None` when Cost Explorer sent something unparseable.
    pub fn parsed_amount(&self) -> Option<f64> {
        let parsed = match &self.amount {
            Value::String(raw) => raw.trim().parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        };
        parsed.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DimensionValuesResponse {
    #[serde(default)]
    pub dimension_values: Vec<DimensionValue>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DimensionValue {
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parsed_amount_accepts_strings_and_numbers() {
        let from_str: MetricValue =
            serde_json::from_value(json!({ "Amount": "12.50", "Unit": "USD" })).expect("parse");
        let from_num: MetricValue =
            serde_json::from_value(json!({ "Amount": 3.0, "Unit": "USD" })).expect("parse");
        assert_eq!(from_str.parsed_amount(), Some(12.5));
        assert_eq!(from_num.parsed_amount(), Some(3.0));
    }

    #[test]
    fn parsed_amount_rejects_non_numeric() {
        let bad: MetricValue =
            serde_json::from_value(json!({ "Amount": "n/a", "Unit": "USD" })).expect("parse");
        let null: MetricValue =
            serde_json::from_value(json!({ "Amount": null, "Unit": "USD" })).expect("parse");
        let nan: MetricValue =
            serde_json::from_value(json!({ "Amount": "NaN", "Unit": "USD" })).expect("parse");
        assert_eq!(bad.parsed_amount(), None);
        assert_eq!(null.parsed_amount(), None);
        assert_eq!(nan.parsed_amount(), None);
    }

    #[test]
    fn missing_amount_key_is_a_shape_error() {
        let res = serde_json::from_value::<MetricValue>(json!({ "Unit": "USD" }));
        assert!(res.is_err());
    }

    #[test]
    fn unused_wire_fields_are_ignored() {
        let parsed: CostAndUsageResponse = serde_json::from_value(json!({
            "ResultsByTime": [{
                "TimePeriod": { "Start": "2024-01-01", "End": "2024-02-01" },
                "Total": {},
                "Groups": [],
                "Estimated": true
            }],
            "NextPageToken": "leftover",
            "DimensionValueAttributes": []
        }))
        .expect("parse");
        assert_eq!(parsed.results_by_time.len(), 1);
        assert_eq!(parsed.results_by_time[0].time_period.start, "2024-01-01");
        assert!(parsed.results_by_time[0].groups.as_ref().is_some_and(Vec::is_empty));
    }
}
