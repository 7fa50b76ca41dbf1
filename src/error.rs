use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialsErrorKind {
    #[error("AWS credentials not found")]
    Missing,

    #[error("AWS rejected the configured credentials: {0}")]
    Invalid(String),

    #[error("AWS session token has expired")]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiErrorKind {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("request was throttled by Cost Explorer: {0}")]
    RateLimited(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("Cost Explorer returned HTTP {status}: {message}")]
    Service { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataErrorKind {
    #[error("malformed Cost Explorer response: {0}")]
    MalformedResponse(String),

    #[error("Cost Explorer returned no data")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationErrorKind {
    #[error("start date must be before end date")]
    InvertedRange,

    #[error("date range cannot exceed {max_days} days (requested {days})")]
    RangeTooLong { days: i64, max_days: i64 },

    #[error("end date cannot be in the future")]
    EndInFuture,

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("unsupported granularity '{0}'. Use HOURLY, DAILY, WEEKLY or MONTHLY")]
    InvalidGranularity(String),

    #[error("unsupported time period '{0}'")]
    InvalidPreset(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("credentials error: {0}")]
    Credentials(#[from] CredentialsErrorKind),

    #[error("api error: {0}")]
    Api(#[from] ApiErrorKind),

    #[error("data error: {0}")]
    Data(#[from] DataErrorKind),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationErrorKind),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Keyring(#[from] keyring::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl AppError {
    /// Short machine-readable category used by the web API.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Credentials(_) => "credentials",
            AppError::Api(_) | AppError::Http(_) => "api",
            AppError::Data(_) | AppError::Json(_) => "data",
            AppError::Validation(_) => "validation",
            _ => "internal",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }

    /// Message shown inline on the dashboard.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Credentials(CredentialsErrorKind::Missing) => {
                "AWS connection failed: no credentials configured. Set AWS_ACCESS_KEY_ID and \
                 AWS_SECRET_ACCESS_KEY, or run `aws-billing-dashboard configure`."
                    .into()
            }
            AppError::Credentials(CredentialsErrorKind::Expired) => {
                "AWS connection failed: the session token has expired. Refresh your credentials."
                    .into()
            }
            AppError::Credentials(CredentialsErrorKind::Invalid(_)) => {
                "AWS connection failed: the credentials were rejected. Check the access key pair."
                    .into()
            }
            AppError::Api(ApiErrorKind::PermissionDenied(_)) => {
                "Access denied. The IAM identity needs ce:GetCostAndUsage and \
                 ce:GetDimensionValues permissions."
                    .into()
            }
            AppError::Api(ApiErrorKind::RateLimited(_)) => {
                "Cost Explorer is throttling requests. Wait a moment and refresh.".into()
            }
            AppError::Api(ApiErrorKind::MalformedRequest(msg)) => {
                format!("Cost Explorer rejected the request: {msg}")
            }
            AppError::Api(ApiErrorKind::Service { status, .. }) => {
                format!("Cost Explorer is unavailable (HTTP {status}). Try again later.")
            }
            AppError::Http(e) => format!("Could not reach Cost Explorer: {e}"),
            AppError::Data(DataErrorKind::EmptyResponse) => {
                "No billing data found for the selected period.".into()
            }
            AppError::Data(_) | AppError::Json(_) => {
                "Cost Explorer returned data in an unexpected shape; charts are empty.".into()
            }
            AppError::Validation(kind) => kind.to_string(),
            other => other.to_string(),
        }
    }
}
