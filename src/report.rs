use crate::models::{CostTable, Granularity};
use crate::service::DashboardView;
use chrono::{DateTime, Utc};
use std::fmt::Write;

pub const CSV_HEADER: &str = "period_start,period_end,service,metric,amount,unit";

pub fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn period_bound(ts: chrono::NaiveDateTime, granularity: Option<Granularity>) -> String {
    match granularity {
        Some(Granularity::Hourly) => ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
        _ => ts.format("%Y-%m-%d").to_string(),
    }
}

/// One CSV line per record, header first, newline-terminated.
pub fn records_to_csv(table: &CostTable, granularity: Option<Granularity>) -> String {
    let mut out = String::with_capacity(64 * (table.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for r in table.records() {
        let _ = writeln!(
            out,
            "{},{},{},{},{:.6},{}",
            period_bound(r.period_start, granularity),
            period_bound(r.period_end, granularity),
            csv_field(&r.group_key),
            csv_field(&r.metric_name),
            r.amount,
            csv_field(&r.unit),
        );
    }
    out
}

/// Plain-text report of the dashboard's headline numbers.
pub fn summary_text(view: &DashboardView, generated_at: DateTime<Utc>) -> String {
    let s = &view.summary;
    let mut out = String::new();

    let _ = writeln!(out, "AWS Billing Summary Report");
    let _ = writeln!(out, "Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "Source: {}", view.source);
    let _ = writeln!(
        out,
        "Period: {} to {} ({})",
        view.range.start,
        view.range.end,
        view.granularity.as_label()
    );
    out.push('\n');
    let _ = writeln!(out, "Total Cost: ${:.2} {}", s.total_cost, s.unit);
    let _ = writeln!(out, "Services: {}", s.service_count);
    let _ = writeln!(out, "Time Periods: {}", s.time_periods);
    let _ = writeln!(out, "Average per Period: ${:.2}", s.average_period_cost);
    let _ = writeln!(
        out,
        "Top Service: {} (${:.2})",
        s.top_service, s.top_service_cost
    );

    if let Some(change) = &view.period_change {
        let _ = writeln!(
            out,
            "{}: {:+.2} ({:+.1}%)",
            change.label, change.change_amount, change.change_percent
        );
    }

    if !view.top_services.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "Top Services:");
        for (i, entry) in view.top_services.entries.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}. {:<40} ${:>12.2} {:>6.1}%",
                i + 1,
                entry.group_key,
                entry.amount,
                entry.percent_of_total
            );
        }
    }

    if let Some(notice) = &view.notice {
        out.push('\n');
        let _ = writeln!(out, "Note: {}", notice.message);
    }
    out
}
