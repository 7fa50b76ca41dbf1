//! Chart specifications handed to the browser for rendering.
//!
//! Every builder returns a [`ChartKind::Placeholder`] spec with a message when
//! there is nothing to draw, so an empty date range never breaks the page.

use crate::models::{
    Granularity, PeriodChange, ServiceTrendTable, TopServicesResult, TrendSummary,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const COLOR_PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

pub const EMPTY_MESSAGE: &str = "No data available";

const MAX_TREND_SERIES: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    MultiLine,
    Pie,
    HorizontalBar,
    Bar,
    Placeholder,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub x_title: Option<String>,
    pub y_title: Option<String>,
    pub series: Vec<Series>,
    pub message: Option<String>,
    pub height: u32,
}

impl ChartSpec {
    pub fn placeholder(title: &str, message: &str) -> Self {
        Self {
            kind: ChartKind::Placeholder,
            title: title.to_string(),
            x_title: None,
            y_title: None,
            series: vec![],
            message: Some(message.to_string()),
            height: 400,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == ChartKind::Placeholder
    }
}

fn period_label(ts: NaiveDateTime, granularity: Granularity) -> String {
    ts.format(granularity.date_format()).to_string()
}

pub fn trend_line_chart(trends: &[TrendSummary], granularity: Granularity) -> ChartSpec {
    const TITLE: &str = "Cost Trends Over Time";
    if trends.is_empty() {
        return ChartSpec::placeholder(TITLE, EMPTY_MESSAGE);
    }

    ChartSpec {
        kind: ChartKind::Line,
        title: TITLE.into(),
        x_title: Some(granularity.axis_title().into()),
        y_title: Some("Cost (USD)".into()),
        series: vec![Series {
            name: "Total".into(),
            labels: trends
                .iter()
                .map(|t| period_label(t.period_start, granularity))
                .collect(),
            values: trends.iter().map(|t| t.total_amount).collect(),
            colors: vec![COLOR_PALETTE[0].into()],
        }],
        message: None,
        height: 400,
    }
}

pub fn service_pie_chart(top: &TopServicesResult) -> ChartSpec {
    const TITLE: &str = "Cost Distribution by Service";
    if top.is_empty() {
        return ChartSpec::placeholder(TITLE, EMPTY_MESSAGE);
    }

    ChartSpec {
        kind: ChartKind::Pie,
        title: TITLE.into(),
        x_title: None,
        y_title: None,
        series: vec![Series {
            name: "Services".into(),
            labels: top.keys(),
            values: top.entries.iter().map(|e| e.amount).collect(),
            colors: (0..top.len())
                .map(|i| COLOR_PALETTE[i % COLOR_PALETTE.len()].to_string())
                .collect(),
        }],
        message: None,
        height: 400,
    }
}

/// Horizontal bars, smallest first so the largest service sits on top.
pub fn service_bar_chart(top: &TopServicesResult) -> ChartSpec {
    const TITLE: &str = "Top Services by Cost";
    if top.is_empty() {
        return ChartSpec::placeholder(TITLE, EMPTY_MESSAGE);
    }

    let mut rows: Vec<(&str, f64)> = top
        .entries
        .iter()
        .map(|e| (e.group_key.as_str(), e.amount))
        .collect();
    rows.reverse();

    ChartSpec {
        kind: ChartKind::HorizontalBar,
        title: TITLE.into(),
        x_title: Some("Cost (USD)".into()),
        y_title: Some("AWS Service".into()),
        series: vec![Series {
            name: "Cost".into(),
            labels: rows.iter().map(|(k, _)| (*k).to_string()).collect(),
            values: rows.iter().map(|(_, v)| *v).collect(),
            colors: vec![COLOR_PALETTE[0].into()],
        }],
        message: None,
        height: (rows.len() as u32 * 30).max(400),
    }
}

pub fn service_trend_chart(pivot: &ServiceTrendTable, granularity: Granularity) -> ChartSpec {
    const TITLE: &str = "Service Cost Trends";
    if pivot.is_empty() {
        return ChartSpec::placeholder(TITLE, EMPTY_MESSAGE);
    }

    let labels: Vec<String> = pivot
        .periods
        .iter()
        .map(|p| period_label(*p, granularity))
        .collect();

    ChartSpec {
        kind: ChartKind::MultiLine,
        title: TITLE.into(),
        x_title: Some(granularity.axis_title().into()),
        y_title: Some("Cost (USD)".into()),
        series: pivot
            .series
            .iter()
            .take(MAX_TREND_SERIES)
            .enumerate()
            .map(|(i, s)| Series {
                name: s.service.clone(),
                labels: labels.clone(),
                values: s.amounts.clone(),
                colors: vec![COLOR_PALETTE[i % COLOR_PALETTE.len()].into()],
            })
            .collect(),
        message: None,
        height: 400,
    }
}

pub fn comparison_chart(change: Option<&PeriodChange>) -> ChartSpec {
    const TITLE: &str = "Cost Comparison";
    let Some(change) = change else {
        return ChartSpec::placeholder(TITLE, "Not enough periods to compare");
    };

    ChartSpec {
        kind: ChartKind::Bar,
        title: format!("{TITLE}: {}", change.label),
        x_title: Some("Period".into()),
        y_title: Some("Cost (USD)".into()),
        series: vec![Series {
            name: "Cost".into(),
            labels: vec!["Previous Period".into(), "Current Period".into()],
            values: vec![change.previous, change.current],
            colors: vec![COLOR_PALETTE[1].into(), COLOR_PALETTE[0].into()],
        }],
        message: None,
        height: 400,
    }
}
