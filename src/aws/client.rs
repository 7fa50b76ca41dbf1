use crate::aws::schema::DimensionValuesResponse;
use crate::aws::sigv4::{amz_date, authorization_header, SigningRequest};
use crate::aws::{credential_probe, CostExplorerApi, CostQuery};
use crate::config::AwsCredentials;
use crate::error::{ApiErrorKind, AppError, CredentialsErrorKind, DataErrorKind};
use crate::models::DateRange;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};
use url::Url;

const SERVICE: &str = "ce";
const TARGET_PREFIX: &str = "AWSInsightsIndexService";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const MAX_PAGES: usize = 50;

pub struct CostExplorerClient {
    client: Client,
    credentials: AwsCredentials,
    region: String,
    endpoint: Url,
}

impl CostExplorerClient {
    pub fn new(
        credentials: AwsCredentials,
        region: &str,
        endpoint: Option<&str>,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            credentials,
            region: region.to_string(),
            endpoint: Self::resolve_endpoint(endpoint, region)?,
        })
    }

    fn default_endpoint(region: &str) -> String {
        format!("https://ce.{region}.amazonaws.com/")
    }

    fn resolve_endpoint(endpoint: Option<&str>, region: &str) -> Result<Url, AppError> {
        let raw = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| Self::default_endpoint(region));
        let mut parsed = Url::parse(&raw)
            .map_err(|e| AppError::Config(format!("Invalid Cost Explorer endpoint '{raw}': {e}")))?;
        if parsed.host_str().is_none() {
            return Err(AppError::Config(format!(
                "Cost Explorer endpoint '{raw}' has no host"
            )));
        }
        if parsed.path().is_empty() {
            parsed.set_path("/");
        }
        Ok(parsed)
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    async fn call(&self, operation: &str, body: &Value) -> Result<Value, AppError> {
        let payload = serde_json::to_vec(body)?;
        let now = Utc::now();
        let target = format!("{TARGET_PREFIX}.{operation}");

        let mut headers = vec![
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("host".to_string(), self.host_header()),
            ("x-amz-date".to_string(), amz_date(now)),
            ("x-amz-target".to_string(), target),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }

        let authorization = authorization_header(
            &SigningRequest {
                method: "POST",
                path: self.endpoint.path(),
                query: "",
                headers: &headers,
                payload: &payload,
            },
            &self.credentials,
            &self.region,
            SERVICE,
            now,
        );

        let mut req = self.client.post(self.endpoint.clone());
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            req = req.header(name.as_str(), value.as_str());
        }
        req = req.header("authorization", authorization).body(payload);

        debug!(operation, endpoint = %self.endpoint, "calling Cost Explorer");
        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = classify_error(status.as_u16(), &text);
            error!(operation, status = status.as_u16(), error = %err, "Cost Explorer request failed");
            return Err(err);
        }

        if text.trim().is_empty() {
            return Err(DataErrorKind::EmptyResponse.into());
        }
        serde_json::from_str(&text)
            .map_err(|e| DataErrorKind::MalformedResponse(format!("{operation}: {e}")).into())
    }
}

/// Maps an error response to the credentials/API taxonomy.
pub fn classify_error(status: u16, body: &str) -> AppError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = parsed
        .get("__type")
        .and_then(Value::as_str)
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_default();
    let message = parsed
        .get("message")
        .or_else(|| parsed.get("Message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().chars().take(200).collect());

    match code.as_str() {
        "UnrecognizedClientException"
        | "InvalidSignatureException"
        | "IncompleteSignature"
        | "MissingAuthenticationToken"
        | "InvalidClientTokenId" => CredentialsErrorKind::Invalid(message).into(),
        "ExpiredTokenException" | "ExpiredToken" => CredentialsErrorKind::Expired.into(),
        "AccessDeniedException" => ApiErrorKind::PermissionDenied(message).into(),
        "ThrottlingException" | "LimitExceededException" | "RequestLimitExceeded" => {
            ApiErrorKind::RateLimited(message).into()
        }
        "ValidationException"
        | "DataUnavailableException"
        | "BillExpirationException"
        | "InvalidNextTokenException"
        | "RequestChangedException" => ApiErrorKind::MalformedRequest(message).into(),
        _ => match status {
            401 => CredentialsErrorKind::Invalid(message).into(),
            403 => ApiErrorKind::PermissionDenied(message).into(),
            429 => ApiErrorKind::RateLimited(message).into(),
            400..=499 => ApiErrorKind::MalformedRequest(message).into(),
            _ => ApiErrorKind::Service { status, message }.into(),
        },
    }
}

/// Appends `ResultsByTime` from a follow-up page onto the first page.
fn merge_page(into: &mut Value, page: &Value) {
    let Some(extra) = page.get("ResultsByTime").and_then(Value::as_array) else {
        return;
    };
    if let Some(results) = into.get_mut("ResultsByTime").and_then(Value::as_array_mut) {
        results.extend(extra.iter().cloned());
    }
}

fn too_many_pages() -> AppError {
    DataErrorKind::MalformedResponse(format!("gave up after {MAX_PAGES} result pages")).into()
}

fn next_token(page: &Value) -> Option<String> {
    page.get("NextPageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl CostExplorerApi for CostExplorerClient {
    fn name(&self) -> &'static str {
        "aws"
    }

    async fn check_credentials(&self) -> Result<(), AppError> {
        self.call("GetCostAndUsage", &credential_probe().to_request_body(None))
            .await
            .map(|_| ())
    }

    async fn get_cost_and_usage(&self, query: &CostQuery) -> Result<Value, AppError> {
        let mut merged = self
            .call("GetCostAndUsage", &query.to_request_body(None))
            .await?;
        let mut token = next_token(&merged);
        let mut pages = 1;

        while let Some(t) = token {
            if pages >= MAX_PAGES {
                return Err(too_many_pages());
            }
            let page = self
                .call("GetCostAndUsage", &query.to_request_body(Some(&t)))
                .await?;
            merge_page(&mut merged, &page);
            token = next_token(&page);
            pages += 1;
        }

        if let Some(obj) = merged.as_object_mut() {
            obj.remove("NextPageToken");
        }
        Ok(merged)
    }

    async fn get_services_list(&self, range: DateRange) -> Result<Vec<String>, AppError> {
        let mut services = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;

        loop {
            if pages >= MAX_PAGES {
                return Err(too_many_pages());
            }
            let mut body = json!({
                "TimePeriod": {
                    "Start": range.start.format("%Y-%m-%d").to_string(),
                    "End": range.end.format("%Y-%m-%d").to_string(),
                },
                "Dimension": "SERVICE",
            });
            if let Some(t) = &token {
                body["NextPageToken"] = Value::String(t.clone());
            }

            let raw = self.call("GetDimensionValues", &body).await?;
            let page: DimensionValuesResponse = serde_json::from_value(raw)
                .map_err(|e| DataErrorKind::MalformedResponse(e.to_string()))?;
            services.extend(page.dimension_values.into_iter().map(|d| d.value));
            pages += 1;

            token = page.next_page_token.filter(|t| !t.is_empty());
            if token.is_none() {
                break;
            }
        }

        services.sort();
        services.dedup();
        Ok(services)
    }
}
