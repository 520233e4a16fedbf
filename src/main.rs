//! specauth CLI - authenticate requests to any OpenAPI-described API
//!
//! Run `specauth --help` for usage information.

use clap::{Parser, Subcommand};
use reqwest::Method;
use specauth::client::ClientError;
use specauth::config::{Config, ConfigError, LogFormat, SourceKind};
use specauth::credentials::{
    ChainSource, CredentialSource, CredentialStore, EnvSource, FileSecretStore, PromptSource,
    SecretStoreSource,
};
use specauth::router::{RequirementMode, SecurityResolver};
use specauth::spec::{LoadOptions, SpecIndex};
use specauth::{RequestAuthenticator, SpecAuthError, SpecClient};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "specauth",
    about = "Authenticate outgoing requests using the security declarations of an OpenAPI spec",
    version
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// OpenAPI document (file path or http(s) URL), overrides the config
    #[arg(short, long, global = true)]
    spec: Option<String>,

    /// Requirement-set semantics (apply_all, first_satisfiable), overrides the config
    #[arg(long, global = true)]
    mode: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the base URL, security schemes and per-operation requirements
    Inspect,

    /// Resolve credentials for every declared scheme and report the result
    Prime {
        /// Never prompt; use only environment and secrets file
        #[arg(long)]
        non_interactive: bool,
    },

    /// Send an authenticated request (alias: req)
    #[command(alias = "req")]
    Request {
        /// Path relative to the API base URL, e.g. /users/42?page=2
        path: String,

        /// HTTP method (GET, POST, PUT, DELETE, PATCH)
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Request body (JSON string, or @filename to read from file)
        #[arg(short, long)]
        data: Option<String>,

        /// Additional headers (can be repeated: -H "Accept: application/json")
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Never prompt; use only environment and secrets file
        #[arg(long)]
        non_interactive: bool,

        /// Output only the response body (no status info)
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path).await?
    } else {
        let default_path = Config::default_path();
        if default_path.exists() {
            Config::load(&default_path).await?
        } else {
            Config::default()
        }
    };

    init_logging(&config, cli.verbose);

    if let Some(spec) = cli.spec {
        config.spec.source = Some(spec);
    }
    if let Some(mode) = cli.mode {
        config.auth.requirement_mode = RequirementMode::from_str(&mode)?;
    }

    // Execute command
    match cli.command {
        Commands::Init { force } => {
            init_config(cli.config, force).await?;
        }
        Commands::Inspect => {
            inspect(&config).await?;
        }
        Commands::Prime { non_interactive } => {
            prime(&config, non_interactive).await?;
        }
        Commands::Request {
            path,
            method,
            data,
            headers,
            non_interactive,
            quiet,
        } => {
            make_request(&config, path, method, data, headers, non_interactive, quiet).await?;
        }
    }

    Ok(())
}

/// Setup logging; `-v` flags win over the configured level, RUST_LOG over both
fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.logging.level.clone(),
        1 => Level::DEBUG.to_string(),
        _ => Level::TRACE.to_string(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = config.logging.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

/// Load the OpenAPI document named by the config
async fn load_spec(config: &Config) -> Result<Arc<SpecIndex>, SpecAuthError> {
    let source = config.spec.source.as_deref().ok_or_else(|| {
        ConfigError::Invalid(
            "no OpenAPI document given (use --spec or set [spec] source)".to_string(),
        )
    })?;

    let options = LoadOptions {
        origin: None,
        base_url_override: config.spec.base_url.clone(),
    };

    info!(source = %source, "Loading OpenAPI spec");
    let spec = SpecIndex::load(source, &options).await?;
    info!(
        base_url = %spec.base_url(),
        schemes = spec.security_schemes().len(),
        "Spec loaded"
    );
    Ok(Arc::new(spec))
}

/// Build the credential store from the configured sources
async fn build_store(
    config: &Config,
    spec: Arc<SpecIndex>,
    non_interactive: bool,
) -> Arc<CredentialStore> {
    let creds = &config.credentials;
    let mut sources: Vec<Arc<dyn CredentialSource>> = Vec::new();

    for kind in &creds.sources {
        match kind {
            SourceKind::Env => sources.push(Arc::new(EnvSource::new(creds.env_prefix.clone()))),
            SourceKind::Store => match FileSecretStore::open(&creds.store_path).await {
                Ok(store) => sources.push(Arc::new(
                    SecretStoreSource::new(Arc::new(store))
                        .with_retry(creds.store_retries, Duration::from_millis(100)),
                )),
                Err(e) => warn!(
                    path = %creds.store_path.display(),
                    error = %e,
                    "Secrets file unavailable, skipping store source"
                ),
            },
            SourceKind::Prompt if !non_interactive => sources.push(Arc::new(PromptSource::new())),
            SourceKind::Prompt => {}
        }
    }

    let priming = ChainSource::new(sources);
    let on_demand = priming.non_interactive();

    let store = CredentialStore::new(spec, Arc::new(priming))
        .with_on_demand_source(Some(Arc::new(on_demand)))
        .with_resolution_timeout(creds.resolution_timeout);

    Arc::new(store)
}

/// Initialize configuration
async fn init_config(path: Option<PathBuf>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path.unwrap_or_else(Config::default_path);

    if config_path.exists() && !force {
        return Err(format!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_path.display()
        )
        .into());
    }

    // Create config directory
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(&config_path, Config::template()).await?;

    println!("Configuration written to {}", config_path.display());
    println!("\nNext steps:");
    println!("1. Set [spec] source to your API's OpenAPI document");
    println!("2. Export SPECAUTH_<SCHEME> variables or fill the secrets file");
    println!("3. Check resolution: specauth prime");
    println!("4. Send a request: specauth request /path");

    Ok(())
}

/// Show what the document declares
async fn inspect(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let spec = load_spec(config).await?;
    let resolver = SecurityResolver::new(spec.clone());

    if let Some(title) = spec.title() {
        println!("Title:    {}", title);
    }
    println!("Base URL: {}", spec.base_url());

    println!("\nSecurity schemes:");
    if spec.scheme_names().is_empty() {
        println!("  (none)");
    }
    for name in spec.scheme_names() {
        if let Some(scheme) = spec.scheme(name) {
            println!("  {:<24} {}", name, scheme.describe());
        }
    }

    let global: Vec<String> = spec.global_security().iter().map(|r| r.to_string()).collect();
    println!(
        "\nGlobal security: {}",
        if global.is_empty() {
            "(none)".to_string()
        } else {
            global.join(" | ")
        }
    );

    println!("\n{:<8} {:<40} {}", "METHOD", "PATH", "SECURITY");
    println!("{}", "-".repeat(80));
    for op in spec.operations() {
        let effective = resolver.resolve(Some(op));
        let security = if effective.is_empty() {
            "(none)".to_string()
        } else {
            effective
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(" | ")
        };
        let marker = if op.requirements.is_some() { "" } else { " (global)" };
        println!(
            "{:<8} {:<40} {}{}",
            op.method.as_str(),
            op.path_template,
            security,
            marker
        );
    }

    Ok(())
}

/// Prime every declared scheme and report
async fn prime(config: &Config, non_interactive: bool) -> Result<(), Box<dyn std::error::Error>> {
    let spec = load_spec(config).await?;
    let store = build_store(config, spec, non_interactive).await;

    let report = store.prime_all().await;

    for name in &report.primed {
        println!("[+] {:<24} resolved", name);
    }
    for name in &report.already_cached {
        println!("[=] {:<24} already cached", name);
    }
    for (name, reason) in &report.failed {
        println!("[!] {:<24} {}", name, reason);
    }

    if !report.is_complete() {
        eprintln!(
            "\n{} scheme(s) unresolved; requests needing them will be sent without those credentials",
            report.failed.len()
        );
    }

    Ok(())
}

/// Make an authenticated request
async fn make_request(
    config: &Config,
    path: String,
    method: String,
    data: Option<String>,
    headers: Vec<String>,
    non_interactive: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = load_spec(config).await?;
    let store = build_store(config, spec.clone(), non_interactive).await;

    // Prompting happens here, before the request is in flight
    store.prime_all().await;

    let authenticator = Arc::new(
        RequestAuthenticator::new(spec, store).with_mode(config.auth.requirement_mode),
    );
    let client = SpecClient::new(authenticator, &config.client.options)?;

    let method = Method::from_str(&method.to_uppercase())
        .map_err(|_| format!("Invalid HTTP method: {}", method))?;

    let mut request = client.request(method.clone(), &path);

    // Parse headers
    for header in headers {
        if let Some((key, value)) = header.split_once(':') {
            request = request.header(key.trim(), value.trim());
        }
    }

    // Parse body - support @filename syntax
    if let Some(data_str) = data {
        let content = if let Some(filename) = data_str.strip_prefix('@') {
            tokio::fs::read_to_string(filename).await?
        } else {
            data_str
        };
        let body: serde_json::Value = serde_json::from_str(&content)?;
        request = request.json(&body);
    }

    let url = client.url(&path);
    let response = request.send().await.map_err(ClientError::from)?;
    let status = response.status();
    let body_text = response.text().await?;

    if quiet {
        print!("{}", body_text);
    } else {
        let status_emoji = if status.is_success() {
            "+"
        } else if status.is_client_error() || status.is_server_error() {
            "!"
        } else {
            ">"
        };

        eprintln!("[{}] {} {} -> {}", status_emoji, method, url, status.as_u16());

        // Pretty print JSON if possible
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body_text) {
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else {
            println!("{}", body_text);
        }
    }

    Ok(())
}
