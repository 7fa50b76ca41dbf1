use crate::error::{AppError, CredentialsErrorKind};
use crate::models::Granularity;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "aws-billing-dashboard";

/// Cost Explorer is only served from us-east-1.
pub const COST_EXPLORER_REGION: &str = "us-east-1";

const ACCESS_KEY_ENTRY: &str = "aws:access_key_id";
const SECRET_KEY_ENTRY: &str = "aws:secret_access_key";

/// Set to any non-empty value to skip the OS keyring when loading credentials.
pub const DISABLE_KEYRING_ENV: &str = "BILLING_DASH_DISABLE_KEYRING";

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("BILLING_DASH_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "billing-dash", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".aws-billing-dashboard"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub region: String,
    pub endpoint: Option<String>,
    pub metric: String,
    pub cache_ttl_seconds: u64,
    pub default_days_back: i64,
    pub max_days_back: i64,
    pub top_services_count: usize,
    pub default_granularity: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8501,
            region: COST_EXPLORER_REGION.into(),
            endpoint: None,
            metric: "BlendedCost".into(),
            cache_ttl_seconds: 3600,
            default_days_back: 90,
            max_days_back: 365,
            top_services_count: 10,
            default_granularity: "MONTHLY".into(),
        }
    }
}

impl AppConfig {
    pub fn granularity(&self) -> Granularity {
        Granularity::parse(&self.default_granularity).unwrap_or(Granularity::Monthly)
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    Ok(())
}

/// Repairs hand-edited values; returns whether anything changed.
fn normalize_config(config: &mut AppConfig) -> bool {
    let defaults = AppConfig::default();
    let mut changed = false;

    let granularity = config.default_granularity.trim().to_ascii_uppercase();
    let granularity = match Granularity::parse(&granularity) {
        Ok(g) => g.as_label().to_string(),
        Err(_) => defaults.default_granularity.clone(),
    };
    if granularity != config.default_granularity {
        config.default_granularity = granularity;
        changed = true;
    }

    let metric = config.metric.trim().to_string();
    if metric.is_empty() {
        config.metric = defaults.metric.clone();
        changed = true;
    } else if metric != config.metric {
        config.metric = metric;
        changed = true;
    }

    if config.cache_ttl_seconds == 0 {
        config.cache_ttl_seconds = defaults.cache_ttl_seconds;
        changed = true;
    }
    if config.max_days_back <= 0 || config.max_days_back > defaults.max_days_back {
        config.max_days_back = defaults.max_days_back;
        changed = true;
    }
    if config.default_days_back <= 0 || config.default_days_back > config.max_days_back {
        config.default_days_back = defaults.default_days_back.min(config.max_days_back);
        changed = true;
    }
    if config.top_services_count == 0 {
        config.top_services_count = defaults.top_services_count;
        changed = true;
    }
    if config
        .endpoint
        .as_deref()
        .is_some_and(|e| e.trim().is_empty())
    {
        config.endpoint = None;
        changed = true;
    }

    changed
}

pub fn load_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw_str = fs::read_to_string(&path)?;
    let mut parsed: AppConfig = toml::from_str(&raw_str)?;
    if normalize_config(&mut parsed) {
        save_config(&parsed)?;
    }

    Ok(parsed)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}

#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn keyring_entry(user: &str) -> Result<keyring::Entry, AppError> {
    Ok(keyring::Entry::new(SERVICE_NAME, user)?)
}

fn read_keyring(user: &str) -> Result<Option<String>, AppError> {
    match keyring_entry(user)?.get_password() {
        Ok(v) if !v.is_empty() => Ok(Some(v)),
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(AppError::Keyring(e)),
    }
}

pub fn set_credentials(access_key_id: &str, secret_access_key: &str) -> Result<(), AppError> {
    keyring_entry(ACCESS_KEY_ENTRY)?.set_password(access_key_id.trim())?;
    keyring_entry(SECRET_KEY_ENTRY)?.set_password(secret_access_key.trim())?;
    Ok(())
}

pub fn delete_credentials() -> Result<(), AppError> {
    for user in [ACCESS_KEY_ENTRY, SECRET_KEY_ENTRY] {
        match keyring_entry(user)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(AppError::Keyring(e)),
        }
    }
    Ok(())
}

/// Standard AWS environment variables first, then the OS keyring unless
/// `BILLING_DASH_DISABLE_KEYRING` is set.
pub fn load_credentials() -> Result<AwsCredentials, AppError> {
    if let (Some(access_key_id), Some(secret_access_key)) = (
        non_empty_env("AWS_ACCESS_KEY_ID"),
        non_empty_env("AWS_SECRET_ACCESS_KEY"),
    ) {
        return Ok(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token: non_empty_env("AWS_SESSION_TOKEN"),
        });
    }

    if non_empty_env(DISABLE_KEYRING_ENV).is_some() {
        return Err(CredentialsErrorKind::Missing.into());
    }

    // A broken keyring backend is treated like an empty one.
    let stored = (
        read_keyring(ACCESS_KEY_ENTRY).ok().flatten(),
        read_keyring(SECRET_KEY_ENTRY).ok().flatten(),
    );
    match stored {
        (Some(access_key_id), Some(secret_access_key)) => Ok(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token: None,
        }),
        _ => Err(CredentialsErrorKind::Missing.into()),
    }
}

/// Signing region for Cost Explorer requests. Only a custom endpoint may
/// use something other than us-east-1.
pub fn resolve_region(cfg: &AppConfig) -> String {
    if cfg.endpoint.is_none() && cfg.region != COST_EXPLORER_REGION {
        tracing::debug!(
            configured = %cfg.region,
            "Cost Explorer is only available in us-east-1; ignoring configured region"
        );
        return COST_EXPLORER_REGION.into();
    }
    cfg.region.clone()
}
