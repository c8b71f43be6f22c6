use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netmend::config::Config;
use netmend::discovery::{ConsulBackend, Deregistration, ServiceRegistryClient};
use netmend::error::{Error, NetmendErrorTrait};
use netmend::http::{ApiRequest, AuthenticatedHttpClient, CredentialMode, ResponseBody};

#[derive(Parser)]
#[command(
    name = "netmend",
    version,
    about = "Authenticated API requests and service registry operations",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// TOML config file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue one authenticated request against the API
    Fetch {
        /// Absolute URL or path relative to the API base URL
        url: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Cookie header to forward; switches to forwarded-header mode
        #[arg(long)]
        cookie: Option<String>,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Register this instance, wait for Ctrl-C, then deregister
    Register,

    /// Resolve a service to a passing instance address
    Resolve {
        /// Service name
        service: String,

        /// Print every passing instance instead of one random pick
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());

    // Initialize tracing/logging
    setup_tracing(&log_format, &config.logging.filter_directive(cli.verbose))?;

    if let Err(e) = netmend::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let result = match cli.command {
        Commands::Fetch {
            url,
            method,
            cookie,
            data,
        } => {
            tracing::info!(
                url = %url,
                method = %method,
                forwarded_cookie = cookie.is_some(),
                "Starting fetch command"
            );
            fetch(config, url, method, cookie, data).await
        }

        Commands::Register => {
            tracing::info!(
                service = %config.registry.service_name,
                "Starting register command"
            );
            register(config).await
        }

        Commands::Resolve { service, all } => {
            tracing::info!(service = %service, all = all, "Starting resolve command");
            resolve(config, service, all).await
        }
    };

    if cli.metrics {
        match netmend::metrics::encode_metrics() {
            Ok(text) => eprintln!("{text}"),
            Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
        }
    }

    if let Err(e) = &result {
        tracing::error!(
            category = e.category().label(),
            recoverable = e.is_recoverable(),
            "{e}"
        );
    }

    result.map_err(anyhow::Error::from)
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, directive: &str) -> Result<()> {
    // RUST_LOG wins over the configured level
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn fetch(
    mut config: Config,
    url: String,
    method: String,
    cookie: Option<String>,
    data: Option<String>,
) -> netmend::error::Result<()> {
    let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::config(format!("invalid HTTP method: {method}")))?;

    let mut request = ApiRequest::new(method, url);
    if let Some(cookie) = cookie {
        config.http.credential_mode = CredentialMode::ForwardedHeader;
        request = request.with_cookie(cookie);
    }
    if let Some(data) = data {
        request = request.with_body(serde_json::from_str(&data)?);
    }

    let client = AuthenticatedHttpClient::new(config.http)?;
    match client.issue(&request).await? {
        ResponseBody::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        ResponseBody::Text(text) => println!("{text}"),
        ResponseBody::Empty => println!("(empty response)"),
    }

    Ok(())
}

async fn register(config: Config) -> netmend::error::Result<()> {
    let backend = Arc::new(ConsulBackend::new(&config.registry)?);
    let client = ServiceRegistryClient::new(config.registry, backend);

    let instance = client.register().await?;
    println!("Registered {} ({})", instance.instance_id, instance.service_name);
    println!("Press Ctrl-C to deregister and exit");

    tokio::signal::ctrl_c().await?;

    match client.deregister().await {
        Deregistration::Completed => println!("Deregistered {}", instance.instance_id),
        Deregistration::Skipped => println!("Nothing to deregister"),
        Deregistration::Failed(reason) => {
            println!("Deregistration failed: {reason}");
        }
    }

    Ok(())
}

async fn resolve(config: Config, service: String, all: bool) -> netmend::error::Result<()> {
    let backend = Arc::new(ConsulBackend::new(&config.registry)?);
    let client = ServiceRegistryClient::new(config.registry, backend);

    if all {
        for address in client.resolve_addresses(&service).await? {
            println!("{address}");
        }
    } else {
        println!("{}", client.resolve_one(&service).await?);
    }

    Ok(())
}
