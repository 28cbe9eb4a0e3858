use anyhow::Result;
use config::{Config, File as ConfigFile};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config/filechain.toml";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LEDGER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 64;

/// Where transactions are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// Ledger runs in this process on sled (or memory in dev mode).
    Embedded,
    /// Ledger is reached over HTTP on another node's `/api/ledger`.
    Remote,
}

impl FromStr for LedgerMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "embedded" | "local" => Ok(Self::Embedded),
            "remote" | "http" => Ok(Self::Remote),
            other => anyhow::bail!("Unknown LEDGER_MODE '{other}'; expected embedded or remote"),
        }
    }
}

impl fmt::Display for LedgerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerMode::Embedded => write!(f, "embedded"),
            LedgerMode::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentBackend {
    Memory,
    Fs,
    Ipfs,
}

impl FromStr for ContentBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "fs" | "filesystem" => Ok(Self::Fs),
            "ipfs" => Ok(Self::Ipfs),
            other => {
                anyhow::bail!("Unknown CONTENT_BACKEND '{other}'; expected memory, fs or ipfs")
            }
        }
    }
}

impl fmt::Display for ContentBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentBackend::Memory => write!(f, "memory"),
            ContentBackend::Fs => write!(f, "fs"),
            ContentBackend::Ipfs => write!(f, "ipfs"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub data_dir: String,

    // Ledger
    pub ledger_mode: LedgerMode,
    pub ledger_url: Option<String>,
    pub ledger_timeout_secs: u64,
    pub expose_ledger_api: bool,
    /// Extra organisations the embedded ledger accepts, MSP id to CA key (hex).
    pub trusted_msps: HashMap<String, String>,

    // Content
    pub content_backend: ContentBackend,
    pub ipfs_api_url: Option<String>,
    pub ipfs_gateway_url: Option<String>,
    pub max_upload_mb: usize,

    // Identity and chaincode
    pub channel: String,
    pub chaincode: String,
    pub msp_id: String,
    pub ca_name: String,
    pub app_user: String,
    pub affiliation: String,
    pub admin_id: String,
    pub admin_secret: String,
    pub admin_token: Option<String>,
    pub skip_init: bool,
    pub discovery_enabled: bool,

    pub log_level: String,
    pub log_format: String,
    pub dev_mode: bool,
}

impl AppConfig {
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Some(path)
            } else {
                None
            }
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix("FILECHAIN"));
        let config = builder.build()?;

        let ledger_mode = get_string_value(&config, &["LEDGER_MODE", "ledger.mode"])
            .map(|value| value.parse())
            .transpose()?
            .unwrap_or(LedgerMode::Embedded);
        let content_backend = get_string_value(&config, &["CONTENT_BACKEND", "content.backend"])
            .map(|value| value.parse())
            .transpose()?
            .unwrap_or(ContentBackend::Fs);
        let trusted_msps = get_string_value(&config, &["TRUSTED_MSPS", "ledger.trusted_msps"])
            .map(|raw| parse_trusted_msps(&raw))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            config_path: resolved_path,
            node_id: get_string_value(&config, &["NODE_ID", "node.id"])
                .unwrap_or_else(|| "filechain-node".to_string()),
            host: get_string_value(&config, &["HOST", "server.host"])
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: get_number_value(&config, &["PORT", "server.port"])?.unwrap_or(DEFAULT_PORT),
            data_dir: get_string_value(&config, &["DATA_DIR", "node.data_dir"])
                .unwrap_or_else(|| "./data".to_string()),
            ledger_mode,
            ledger_url: get_string_value(&config, &["LEDGER_URL", "ledger.url"]),
            ledger_timeout_secs: get_number_value(
                &config,
                &["LEDGER_TIMEOUT_SECS", "ledger.timeout_secs"],
            )?
            .unwrap_or(DEFAULT_LEDGER_TIMEOUT_SECS),
            expose_ledger_api: get_bool_value(
                &config,
                &["EXPOSE_LEDGER_API", "ledger.expose_api"],
                false,
            ),
            trusted_msps,
            content_backend,
            ipfs_api_url: get_string_value(&config, &["IPFS_API_URL", "content.ipfs_api_url"]),
            ipfs_gateway_url: get_string_value(
                &config,
                &["IPFS_GATEWAY_URL", "content.ipfs_gateway_url"],
            ),
            max_upload_mb: get_number_value(&config, &["MAX_UPLOAD_MB", "server.max_upload_mb"])?
                .unwrap_or(DEFAULT_MAX_UPLOAD_MB),
            channel: get_string_value(&config, &["CHANNEL", "ledger.channel"])
                .unwrap_or_else(|| "mychannel".to_string()),
            chaincode: get_string_value(&config, &["CHAINCODE", "ledger.chaincode"])
                .unwrap_or_else(|| "ledger".to_string()),
            msp_id: get_string_value(&config, &["MSP_ID", "identity.msp_id"])
                .unwrap_or_else(|| "Org1MSP".to_string()),
            ca_name: get_string_value(&config, &["CA_NAME", "identity.ca_name"])
                .unwrap_or_else(|| "ca.org1.example.com".to_string()),
            app_user: get_string_value(&config, &["APP_USER", "identity.app_user"])
                .unwrap_or_else(|| "appUser".to_string()),
            affiliation: get_string_value(&config, &["AFFILIATION", "identity.affiliation"])
                .unwrap_or_else(|| "org1.department1".to_string()),
            admin_id: get_string_value(&config, &["ADMIN_ID", "identity.admin_id"])
                .unwrap_or_else(|| filechain_identity::ADMIN_USER_ID.to_string()),
            admin_secret: get_string_value(&config, &["ADMIN_SECRET", "identity.admin_secret"])
                .unwrap_or_else(|| filechain_identity::ADMIN_USER_PASSWD.to_string()),
            admin_token: get_string_value(&config, &["ADMIN_TOKEN", "server.admin_token"]),
            skip_init: get_bool_value(&config, &["SKIP_INIT", "ledger.skip_init"], false),
            discovery_enabled: get_bool_value(
                &config,
                &["DISCOVERY_ENABLED", "ledger.discovery"],
                true,
            ),
            log_level: config
                .get_string("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string()),
            log_format: config
                .get_string("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string()),
            dev_mode: get_bool_value(&config, &["DEV_MODE", "node.dev"], false),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            anyhow::bail!("NODE_ID must not be empty");
        }
        if self.data_dir.trim().is_empty() {
            anyhow::bail!("DATA_DIR must not be empty");
        }
        if self.port == 0 {
            anyhow::bail!("PORT must be greater than zero");
        }
        if self.max_upload_mb == 0 {
            anyhow::bail!("MAX_UPLOAD_MB must be greater than zero");
        }
        for (label, value) in [
            ("CHANNEL", &self.channel),
            ("CHAINCODE", &self.chaincode),
            ("MSP_ID", &self.msp_id),
            ("CA_NAME", &self.ca_name),
            ("APP_USER", &self.app_user),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{label} must not be empty");
            }
        }
        if self.app_user == self.admin_id {
            anyhow::bail!("APP_USER and ADMIN_ID must be different identities");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!(
                "LOG_FORMAT '{}' is not supported; expected pretty or json",
                self.log_format
            );
        }
        match self.ledger_mode {
            LedgerMode::Remote => {
                if self.ledger_url.is_none() {
                    anyhow::bail!("LEDGER_MODE remote requires LEDGER_URL");
                }
                if self.expose_ledger_api {
                    anyhow::bail!("EXPOSE_LEDGER_API needs an embedded ledger");
                }
            }
            LedgerMode::Embedded => {}
        }
        if self.content_backend == ContentBackend::Ipfs && self.ipfs_api_url.is_none() {
            anyhow::bail!("CONTENT_BACKEND ipfs requires IPFS_API_URL");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn wallet_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("wallet")
    }

    pub fn ca_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("ca")
    }

    pub fn ledger_db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("ledger")
    }

    pub fn content_dir(&self) -> PathBuf {
        Path::new(&self.data_dir).join("content")
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}

fn get_number_value<T>(config: &Config, keys: &[&str]) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    for key in keys {
        if let Some(raw) = get_string_value(config, &[key]) {
            let value = raw
                .parse::<T>()
                .map_err(|err| anyhow::anyhow!("Invalid value '{raw}' for {key}: {err}"))?;
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Parse `Org2MSP=<hex key>,Org3MSP=<hex key>`.
fn parse_trusted_msps(raw: &str) -> Result<HashMap<String, String>> {
    let mut trusted = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((msp, key)) = entry.split_once('=') else {
            anyhow::bail!("TRUSTED_MSPS entry '{entry}' must look like MSP_ID=PUBLIC_KEY");
        };
        let key = key.trim();
        if hex::decode(key).map(|bytes| bytes.len()).unwrap_or(0) != 32 {
            anyhow::bail!("TRUSTED_MSPS key for {} is not a 32-byte hex key", msp.trim());
        }
        trusted.insert(msp.trim().to_string(), key.to_string());
    }
    Ok(trusted)
}
