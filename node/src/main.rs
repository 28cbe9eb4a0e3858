use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use filechain_content::{ContentStore, FsContentStore, IpfsContentStore, MemoryContentStore};
use filechain_identity::{AdminCredentials, CertificateAuthority, LocalCertificateAuthority, Wallet};
use filechain_ledger::{Gateway, Ledger, LedgerClient, LedgerSettings, RemoteLedgerClient};
use filechain_storage::{MemoryStorage, SledStorage, Storage};
use filechain_web::{start_server, AppState, AssetService, ServiceSettings};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod version;

use config::{AppConfig, ContentBackend, LedgerMode};
use version::{git_commit_hash, FILECHAIN_VERSION};

const DEFAULT_IPFS_GATEWAY: &str = "http://127.0.0.1:8080";
const LOCAL_CONTENT_BASE: &str = "/content";

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = data_dir.clone();
    }

    if let Some(host) = matches.get_one::<String>("host") {
        config.host = host.clone();
    }

    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }

    if matches.get_flag("skip-init") {
        config.skip_init = true;
    }

    if matches.get_flag("dev") {
        config.dev_mode = true;
        config.log_level = "debug".to_string();
        config.log_format = "pretty".to_string();
        if config.host == "127.0.0.1" {
            config.host = "0.0.0.0".to_string();
        }
    }
}

fn build_cli() -> Command {
    Command::new("filechain-node")
        .version(FILECHAIN_VERSION)
        .about("Filechain document registry node")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory for the wallet, CA, ledger and local content")
                .global(true),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Override HTTP bind host")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override HTTP port")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format")
                .global(true),
        )
        .arg(
            Arg::new("skip-init")
                .long("skip-init")
                .action(ArgAction::SetTrue)
                .help("Do not seed the ledger with sample assets on first bootstrap")
                .global(true),
        )
        .arg(
            Arg::new("dev")
                .long("dev")
                .action(ArgAction::SetTrue)
                .help("Run in development mode (in-memory ledger and content)")
                .global(true),
        )
        .subcommand(Command::new("start").about("Start the node using the provided configuration"))
        .subcommand(
            Command::new("status")
                .about("Check the /health endpoint for a running node")
                .arg(
                    Arg::new("health-path")
                        .long("health-path")
                        .value_name("PATH")
                        .default_value("/health")
                        .help("Health endpoint path to query"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if let Some(status_matches) = matches.subcommand_matches("status") {
        let config = load_config_with_overrides(status_matches)?;
        let health_path = status_matches
            .get_one::<String>("health-path")
            .map(|value| value.as_str())
            .unwrap_or("/health");
        check_status(&config, health_path).await?;
        return Ok(());
    }

    let start_matches = matches.subcommand_matches("start").unwrap_or(&matches);
    let config = load_config_with_overrides(start_matches)?;

    init_logging(&config)?;

    info!(
        "Starting filechain node {} ({} commit {})",
        config.node_id,
        FILECHAIN_VERSION,
        git_commit_hash()
    );
    if let Some(path) = &config.config_path {
        info!("Config file: {}", path.display());
    } else {
        info!("Config file: (built-in defaults)");
    }
    info!("Data directory: {}", config.data_dir);
    info!("Development mode: {}", config.dev_mode);

    if !config.dev_mode {
        if let Ok(ip) = config.host.parse::<IpAddr>() {
            if ip.is_unspecified() {
                warn!(
                    "HTTP host {} binds to all interfaces outside dev mode; consider FILECHAIN_HOST=127.0.0.1 behind a reverse proxy",
                    config.host
                );
            }
        }
    }

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data directory {}", config.data_dir))?;
    ensure_storage_directory(&config.data_dir).map_err(anyhow::Error::msg)?;

    let node = build_node(&config).await?;

    // A failed bootstrap is retried by the first request that needs a connection.
    if let Err(err) = node.service.bootstrap().await {
        warn!("Ledger bootstrap failed, will retry on demand: {err}");
    } else {
        info!("Wallet enrolled and ledger bootstrapped");
    }

    let mut state = AppState::new(node.service.clone(), config.node_id.clone());
    state.ledger = node.ledger.clone();
    state.expose_ledger_api = config.expose_ledger_api;
    state.max_upload_bytes = config.max_upload_bytes();

    let addr = config.bind_addr();
    info!("Web interface available at: http://{}", addr);

    start_server(state, &addr, shutdown_signal()).await?;

    info!("Shutting down filechain node");
    if let Some(ledger) = &node.ledger {
        ledger.flush().context("failed to flush ledger storage")?;
    }
    info!("Filechain node shutdown complete");
    Ok(())
}

/// Wired collaborators for one node.
struct Node {
    service: Arc<AssetService>,
    /// Present when the ledger runs in this process.
    ledger: Option<Arc<Ledger>>,
}

async fn build_node(config: &AppConfig) -> Result<Node> {
    let ca = LocalCertificateAuthority::open(
        config.ca_dir(),
        config.ca_name.clone(),
        config.msp_id.clone(),
        &config.admin_id,
        &config.admin_secret,
    )
    .context("failed to open certificate authority")?;
    info!(
        "Certificate authority {} serves {} (public key {})",
        ca.name(),
        ca.msp_id(),
        ca.public_key()
    );

    let wallet = Wallet::open(config.wallet_dir()).context("failed to open wallet")?;

    let (client, ledger): (Arc<dyn LedgerClient>, Option<Arc<Ledger>>) = match config.ledger_mode {
        LedgerMode::Embedded => {
            let ledger = Arc::new(open_embedded_ledger(config, &ca)?);
            info!(
                "Embedded ledger on channel {} at height {}",
                ledger.channel(),
                ledger.height()?
            );
            let client: Arc<dyn LedgerClient> = ledger.clone();
            (client, Some(ledger))
        }
        LedgerMode::Remote => {
            let url = config
                .ledger_url
                .as_deref()
                .context("LEDGER_URL is required for a remote ledger")?;
            let remote = RemoteLedgerClient::new(
                url,
                Duration::from_secs(config.ledger_timeout_secs),
            )
            .context("failed to configure remote ledger client")?;
            info!("Using remote ledger at {}", url);
            let client: Arc<dyn LedgerClient> = Arc::new(remote);
            (client, None)
        }
    };

    let content = open_content_store(config).await?;
    info!("Content backend: {}", content.backend());

    let settings = ServiceSettings {
        channel: config.channel.clone(),
        chaincode: config.chaincode.clone(),
        msp_id: config.msp_id.clone(),
        app_user: config.app_user.clone(),
        affiliation: config.affiliation.clone(),
        admin: AdminCredentials {
            enrollment_id: config.admin_id.clone(),
            secret: config.admin_secret.clone(),
        },
        skip_init: config.skip_init,
        discovery_enabled: config.discovery_enabled,
        admin_token: config.admin_token.clone(),
    };
    if settings.admin_token.is_none() {
        info!("ADMIN_TOKEN not set; asset deletion is disabled");
    }

    let service = Arc::new(AssetService::new(
        Gateway::new(client),
        Arc::new(wallet),
        Arc::new(ca),
        content,
        settings,
    ));

    Ok(Node { service, ledger })
}

fn open_embedded_ledger(config: &AppConfig, ca: &LocalCertificateAuthority) -> Result<Ledger> {
    let storage: Arc<dyn Storage> = if config.dev_mode {
        info!("Using in-memory ledger storage (dev mode)");
        Arc::new(MemoryStorage::new())
    } else {
        let path = config.ledger_db_path();
        info!("Ledger database: {}", path.display());
        Arc::new(
            SledStorage::new(&path)
                .with_context(|| format!("failed to open ledger database {}", path.display()))?,
        )
    };

    let mut trusted_msps = config.trusted_msps.clone();
    trusted_msps.insert(config.msp_id.clone(), ca.public_key());

    Ledger::open(
        storage,
        LedgerSettings {
            channel: config.channel.clone(),
            chaincode: config.chaincode.clone(),
            trusted_msps,
        },
    )
    .context("failed to open ledger")
}

async fn open_content_store(config: &AppConfig) -> Result<Arc<dyn ContentStore>> {
    let backend = if config.dev_mode && config.content_backend == ContentBackend::Fs {
        ContentBackend::Memory
    } else {
        config.content_backend
    };

    let store: Arc<dyn ContentStore> = match backend {
        ContentBackend::Memory => Arc::new(MemoryContentStore::new(LOCAL_CONTENT_BASE)),
        ContentBackend::Fs => {
            let dir = config.content_dir();
            Arc::new(
                FsContentStore::open(&dir, LOCAL_CONTENT_BASE)
                    .await
                    .with_context(|| format!("failed to open content store {}", dir.display()))?,
            )
        }
        ContentBackend::Ipfs => {
            let api_url = config
                .ipfs_api_url
                .as_deref()
                .context("IPFS_API_URL is required for the ipfs content backend")?;
            let gateway_url = config
                .ipfs_gateway_url
                .as_deref()
                .unwrap_or(DEFAULT_IPFS_GATEWAY);
            Arc::new(
                IpfsContentStore::new(api_url, gateway_url)
                    .context("failed to configure IPFS client")?,
            )
        }
    };
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

async fn check_status(config: &AppConfig, health_path: &str) -> Result<()> {
    let mut path = health_path.to_string();
    if !path.starts_with('/') {
        path = format!("/{path}");
    }
    let host = if config.host == "0.0.0.0" {
        "127.0.0.1"
    } else {
        config.host.as_str()
    };
    let url = format!("http://{}:{}{}", host, config.port, path);
    let response = reqwest::Client::new().get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    println!("GET {url} -> {status}");
    println!("{body}");
    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Health check failed with status {status}")
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

fn ensure_storage_directory(path: &str) -> Result<(), String> {
    let dir = Path::new(path);
    if !dir.is_dir() {
        return Err(format!("Storage path {} is not a directory", dir.display()));
    }

    let probe = dir.join(".filechain_write_test");
    match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&probe)
    {
        Ok(mut file) => {
            if let Err(err) = file.write_all(b"ok") {
                return Err(format!("Unable to write into {}: {}", dir.display(), err));
            }
        }
        Err(err) => {
            return Err(format!(
                "Unable to open {} for writing: {}",
                dir.display(),
                err
            ));
        }
    }
    let _ = fs::remove_file(&probe);
    Ok(())
}
