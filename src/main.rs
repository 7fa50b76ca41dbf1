mod aws;
mod cache;
mod charts;
mod config;
mod demo;
mod error;
mod models;
mod processor;
mod report;
mod service;
mod web;

use aws::client::CostExplorerClient;
use aws::CostExplorerApi;
use cache::CostCache;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use config::{
    delete_credentials, ensure_initialized, load_config, load_credentials, resolve_region,
    set_credentials, AppConfig,
};
use demo::DemoClient;
use error::{AppError, CredentialsErrorKind};
use report::{records_to_csv, summary_text};
use serde_json::json;
use service::{DashboardQuery, DashboardService, DashboardSettings};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "aws-billing-dashboard")]
#[command(about = "Web dashboard for AWS Cost Explorer billing data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args, Default)]
struct RangeArgs {
    /// Start date, YYYY-MM-DD (inclusive)
    #[arg(long)]
    start: Option<String>,
    /// End date, YYYY-MM-DD (exclusive)
    #[arg(long)]
    end: Option<String>,
    /// HOURLY, DAILY, WEEKLY or MONTHLY
    #[arg(long)]
    granularity: Option<String>,
    /// 7d, 30d, 3m, 6m, 12m or custom
    #[arg(long)]
    preset: Option<String>,
}

impl RangeArgs {
    fn to_query(&self) -> DashboardQuery {
        DashboardQuery {
            start: self.start.clone(),
            end: self.end.clone(),
            granularity: self.granularity.clone(),
            preset: self.preset.clone(),
            refresh: false,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    /// Store AWS access keys in the OS keyring
    Configure {
        #[arg(long, required_unless_present = "clear")]
        access_key_id: Option<String>,
        #[arg(long, required_unless_present = "clear")]
        secret_access_key: Option<String>,
        #[arg(long, conflicts_with_all = ["access_key_id", "secret_access_key"])]
        clear: bool,
    },
    /// Verify the credentials can read Cost Explorer data
    Check,
    /// Serve the dashboard against live Cost Explorer data
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Serve the dashboard with synthetic data
    Demo {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Report {
        #[arg(long)]
        demo: bool,
        /// Plain-text report instead of JSON
        #[arg(long)]
        text: bool,
        #[command(flatten)]
        range: RangeArgs,
    },
    Export {
        #[arg(long)]
        demo: bool,
        #[arg(long, default_value = "json")]
        format: String,
        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Json,
    Csv,
}

fn validate_format(input: &str) -> Result<ExportFormat, AppError> {
    if input.eq_ignore_ascii_case("json") {
        Ok(ExportFormat::Json)
    } else if input.eq_ignore_ascii_case("csv") {
        Ok(ExportFormat::Csv)
    } else {
        Err(AppError::Config(
            "Unsupported export format. Use json or csv".into(),
        ))
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aws_billing_dashboard=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn live_client(cfg: &AppConfig) -> Result<Arc<dyn CostExplorerApi>, AppError> {
    let credentials = load_credentials()?;
    let client =
        CostExplorerClient::new(credentials, &resolve_region(cfg), cfg.endpoint.as_deref())?;
    Ok(Arc::new(client))
}

fn build_service(cfg: &AppConfig, demo: bool) -> Result<Arc<DashboardService>, AppError> {
    let client: Arc<dyn CostExplorerApi> = if demo {
        Arc::new(DemoClient)
    } else {
        live_client(cfg)?
    };
    let cache = Arc::new(CostCache::new(Duration::from_secs(cfg.cache_ttl_seconds)));
    Ok(Arc::new(DashboardService::new(
        client,
        cache,
        DashboardSettings::from(cfg),
    )))
}

fn print_credential_help() {
    eprintln!("No AWS credentials found. Provide them in one of these ways:");
    eprintln!("  export AWS_ACCESS_KEY_ID=... AWS_SECRET_ACCESS_KEY=...");
    eprintln!("  aws-billing-dashboard configure --access-key-id ... --secret-access-key ...");
    eprintln!("Or try the dashboard with sample data: aws-billing-dashboard demo");
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized aws-billing-dashboard config directory.");
        }
        Commands::Configure {
            access_key_id,
            secret_access_key,
            clear,
        } => {
            ensure_initialized()?;
            if clear {
                delete_credentials()?;
                println!("Stored AWS credentials removed.");
            } else if let (Some(id), Some(secret)) = (access_key_id, secret_access_key) {
                set_credentials(&id, &secret)?;
                println!("AWS credentials stored in the OS keyring.");
            }
        }
        Commands::Check => {
            ensure_initialized()?;
            let cfg = load_config()?;
            live_client(&cfg)?.check_credentials().await?;
            println!("AWS credentials are valid and can read Cost Explorer data.");
        }
        Commands::Serve { host, port } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let svc = match build_service(&cfg, false) {
                Err(AppError::Credentials(CredentialsErrorKind::Missing)) => {
                    print_credential_help();
                    return Err(CredentialsErrorKind::Missing.into());
                }
                other => other?,
            };
            if !svc.check_connection().await {
                eprintln!(
                    "warning: AWS credential check failed; the dashboard will show the error."
                );
            }
            let host = host.unwrap_or_else(|| cfg.host.clone());
            web::serve(svc, &host, port.unwrap_or(cfg.port)).await?;
        }
        Commands::Demo { host, port } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let svc = build_service(&cfg, true)?;
            println!("Running with synthetic billing data.");
            let host = host.unwrap_or_else(|| cfg.host.clone());
            web::serve(svc, &host, port.unwrap_or(cfg.port)).await?;
        }
        Commands::Report { demo, text, range } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let svc = build_service(&cfg, demo)?;
            let request = svc.resolve_request(&range.to_query(), Utc::now().date_naive())?;
            let view = svc.build_view(&request).await?;

            if text {
                print!("{}", summary_text(&view, Utc::now()));
            } else {
                let out = json!({
                    "source": view.source,
                    "range": view.range,
                    "granularity": view.granularity,
                    "summary": view.summary,
                    "period_change": view.period_change,
                    "top_services": view.top_services.entries,
                    "notice": view.notice,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
        Commands::Export {
            demo,
            format,
            range,
        } => {
            let format = validate_format(&format)?;
            ensure_initialized()?;
            let cfg = load_config()?;
            let svc = build_service(&cfg, demo)?;
            let request = svc.resolve_request(&range.to_query(), Utc::now().date_naive())?;
            let table = svc.load_table(&request).await?;

            match format {
                ExportFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(table.records())?);
                }
                ExportFormat::Csv => {
                    print!("{}", records_to_csv(&table, Some(request.granularity)));
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
