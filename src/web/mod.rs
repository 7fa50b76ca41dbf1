use crate::error::AppError;
use crate::report::{records_to_csv, summary_text};
use crate::service::{DashboardQuery, DashboardService, DashboardView};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Clone)]
pub struct AppState {
    service: Arc<DashboardService>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Credentials(_) | AppError::Api(_) | AppError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.user_message(), "kind": self.kind() }));
        (status, body).into_response()
    }
}

pub fn router(service: Arc<DashboardService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/dashboard", get(dashboard))
        .route("/api/export.csv", get(export_csv))
        .route("/api/summary.txt", get(summary))
        .route("/api/services", get(services))
        .with_state(AppState { service })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> &'static str {
    "ok"
}

async fn view_for(state: &AppState, query: &DashboardQuery) -> Result<DashboardView, AppError> {
    let request = state
        .service
        .resolve_request(query, Utc::now().date_naive())?;
    debug!(
        start = %request.range.start,
        end = %request.range.end,
        granularity = request.granularity.as_label(),
        refresh = request.refresh,
        "dashboard request"
    );
    state.service.build_view(&request).await
}

async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardView>, AppError> {
    Ok(Json(view_for(&state, &query).await?))
}

async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let request = state
        .service
        .resolve_request(&query, Utc::now().date_naive())?;
    let table = state.service.load_table(&request).await?;
    let filename = format!(
        "attachment; filename=\"aws-costs-{}-{}.csv\"",
        request.range.start, request.range.end
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        records_to_csv(&table, Some(request.granularity)),
    ))
}

async fn summary(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<String, AppError> {
    let view = view_for(&state, &query).await?;
    Ok(summary_text(&view, Utc::now()))
}

async fn services(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let request = state
        .service
        .resolve_request(&query, Utc::now().date_naive())?;
    Ok(Json(state.service.services(request.range).await?))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

pub async fn serve(service: Arc<DashboardService>, host: &str, port: u16) -> Result<(), AppError> {
    let listener = TcpListener::bind((host, port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, source = service.source(), "dashboard listening");
    println!("Dashboard running at http://{addr}/");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CostCache;
    use crate::demo::DemoClient;
    use crate::service::DashboardSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        let service = DashboardService::new(
            Arc::new(DemoClient),
            Arc::new(CostCache::new(Duration::from_secs(3600))),
            DashboardSettings::default(),
        );
        router(Arc::new(service))
    }

    async fn get_body(uri: &str) -> (StatusCode, String) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf-8 body"))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        assert_eq!(get_body("/health").await, (StatusCode::OK, "ok".to_string()));
    }

    #[tokio::test]
    async fn index_serves_html() {
        let (status, body) = get_body("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<html"));
        assert!(body.contains("/api/dashboard"));
    }

    #[tokio::test]
    async fn dashboard_returns_view_json() {
        let (status, body) =
            get_body("/api/dashboard?start=2024-01-01&end=2024-04-01&granularity=MONTHLY").await;
        assert_eq!(status, StatusCode::OK);

        let view: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(view["source"], "demo");
        assert_eq!(view["trends"].as_array().map(Vec::len), Some(3));
        assert_eq!(view["top_services"]["entries"][0]["group_key"], "Amazon EC2-Instance");
        assert_eq!(view["charts"]["cost_trend"]["kind"], "line");
        assert!(view["notice"].is_null());
    }

    #[tokio::test]
    async fn over_long_range_is_a_bad_request() {
        let (status, body) = get_body("/api/dashboard?start=2023-01-01&end=2024-02-05").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let err: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(err["kind"], "validation");
        assert!(err["error"]
            .as_str()
            .is_some_and(|m| m.contains("cannot exceed 365 days")));
    }

    #[tokio::test]
    async fn bad_granularity_is_a_bad_request() {
        let (status, _) = get_body("/api/dashboard?granularity=YEARLY").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn export_csv_has_header_and_rows() {
        let (status, body) =
            get_body("/api/export.csv?start=2024-01-01&end=2024-02-01&granularity=MONTHLY").await;
        assert_eq!(status, StatusCode::OK);
        let mut lines = body.lines();
        assert_eq!(
            lines.next(),
            Some("period_start,period_end,service,metric,amount,unit")
        );
        assert_eq!(lines.count(), 7);
    }

    #[tokio::test]
    async fn summary_is_plain_text() {
        let (status, body) =
            get_body("/api/summary.txt?start=2024-01-01&end=2024-03-01&granularity=MONTHLY").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("AWS Billing Summary Report"));
        assert!(body.contains("Top Service: Amazon EC2-Instance"));
    }

    #[tokio::test]
    async fn services_lists_demo_services() {
        let (status, body) = get_body("/api/services?preset=30d").await;
        assert_eq!(status, StatusCode::OK);
        let list: Vec<String> = serde_json::from_str(&body).expect("json");
        assert!(list.contains(&"Amazon S3".to_string()));
    }
}
