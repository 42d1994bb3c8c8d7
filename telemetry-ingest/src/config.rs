use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::{fs, path::Path, str::FromStr, time::Duration};
use telemetry_client::db::SqlIdent;
use time::{macros::format_description, Date};

use crate::{
    pipeline::{FailurePolicy, ScanSettings},
    sources::retry::RetryPolicy,
};

const DEFAULT_CONFIG_PATH: &str = "scraper-config.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Web front-end origin, sent as `Origin`/`Referer`.
    pub origin: String,
    pub login_url: String,
    pub data_url: String,
    pub scope: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub customer_code: Option<String>,
    pub customer_point: Option<String>,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            origin: "https://cskh.cpc.vn".to_string(),
            login_url: "https://cskh-api.cpc.vn/api/cskh/user/login".to_string(),
            data_url: "https://cskh-api.cpc.vn/api/remote/dspm/bieudodongdien".to_string(),
            scope: "CSKH".to_string(),
            username: None,
            password: None,
            customer_code: None,
            customer_point: None,
            page_size: 1000,
            request_timeout_secs: 30,
        }
    }
}

/// Login and metering-point identity, all guaranteed non-empty.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub username: String,
    pub password: String,
    pub customer_code: String,
    pub customer_point: String,
}

impl ProviderConfig {
    pub fn identity(&self) -> Result<ProviderIdentity, ConfigError> {
        Ok(ProviderIdentity {
            username: required(&self.username, "provider.username (CPC_USERNAME)")?,
            password: required(&self.password, "provider.password (CPC_PASSWORD)")?,
            customer_code: required(&self.customer_code, "provider.customer_code (CUST_CODE)")?,
            customer_point: required(&self.customer_point, "provider.customer_point (CUST_POINT)")?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub rate_limit_cooldown_secs: u64,
    pub bad_request_cooldown_secs: u64,
    pub backoff_step_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let p = RetryPolicy::default();
        Self {
            max_attempts: p.max_attempts,
            rate_limit_cooldown_secs: p.rate_limit_cooldown.as_secs(),
            bad_request_cooldown_secs: p.bad_request_cooldown.as_secs(),
            backoff_step_secs: p.backoff_step.as_secs(),
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "fetch.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_secs),
            bad_request_cooldown: Duration::from_secs(self.bad_request_cooldown_secs),
            backoff_step: Duration::from_secs(self.backoff_step_secs),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; wins over the discrete fields below.
    pub url: Option<String>,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub max_connections: u32,
    pub table: String,
    pub transform_procedure: String,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            server: None,
            port: None,
            user: None,
            password: None,
            name: None,
            max_connections: 1,
            table: "evncpc_tb_2".to_string(),
            transform_procedure: "sp_etl_clean_evn_data".to_string(),
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = non_empty(&self.url) {
            return PgConnectOptions::from_str(url).map_err(|e| ConfigError::Invalid {
                name: "database.url",
                reason: e.to_string(),
            });
        }

        let (Some(server), Some(name)) = (non_empty(&self.server), non_empty(&self.name)) else {
            return Err(ConfigError::Missing("database.url (DATABASE_URL) or database.server + database.name"));
        };

        let mut opts = PgConnectOptions::new().host(server).database(name);
        if let Some(port) = self.port {
            opts = opts.port(port);
        }
        if let Some(user) = non_empty(&self.user) {
            opts = opts.username(user);
        }
        if let Some(password) = non_empty(&self.password) {
            opts = opts.password(password);
        }
        Ok(opts)
    }

    pub fn table(&self) -> Result<SqlIdent, ConfigError> {
        SqlIdent::parse(&self.table).map_err(|e| ConfigError::Invalid {
            name: "database.table",
            reason: e.to_string(),
        })
    }

    pub fn transform_procedure(&self) -> Result<SqlIdent, ConfigError> {
        SqlIdent::parse(&self.transform_procedure).map_err(|e| ConfigError::Invalid {
            name: "database.transform_procedure",
            reason: e.to_string(),
        })
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// First day to scan when the table is empty, `YYYY-MM-DD`.
    pub default_start: String,
    pub resume_margin_days: i64,
    pub pause_min_secs: f64,
    pub pause_max_secs: f64,
    pub on_day_failure: FailurePolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_start: "2025-12-01".to_string(),
            resume_margin_days: 1,
            pause_min_secs: 2.0,
            pause_max_secs: 5.0,
            on_day_failure: FailurePolicy::Continue,
        }
    }
}

impl ScanConfig {
    pub fn settings(&self) -> Result<ScanSettings, ConfigError> {
        let default_start = parse_day(&self.default_start).ok_or_else(|| ConfigError::Invalid {
            name: "scan.default_start",
            reason: format!("'{}' is not a YYYY-MM-DD date", self.default_start),
        })?;

        if self.resume_margin_days < 0 {
            return Err(ConfigError::Invalid {
                name: "scan.resume_margin_days",
                reason: "must not be negative".to_string(),
            });
        }

        let valid_secs = |s: f64| s.is_finite() && s >= 0.0;
        if !valid_secs(self.pause_min_secs) || !valid_secs(self.pause_max_secs) {
            return Err(ConfigError::Invalid {
                name: "scan.pause_min_secs/pause_max_secs",
                reason: "must be finite and non-negative".to_string(),
            });
        }

        Ok(ScanSettings {
            default_start,
            resume_margin: time::Duration::days(self.resume_margin_days),
            pause_min: Duration::from_secs_f64(self.pause_min_secs),
            pause_max: Duration::from_secs_f64(self.pause_max_secs),
            on_day_failure: self.on_day_failure,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append-only log file next to stdout; `None` disables it.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: Some("scraper.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub fetch: FetchConfig,
    pub database: DatabaseConfig,
    pub scan: ScanConfig,
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load `.env`, the optional TOML file and the environment overlay, then validate.
    ///
    /// `SCRAPER_CONFIG` names the TOML file; when unset, `scraper-config.toml`
    /// is read only if it exists.
    pub fn load() -> Result<Self, ConfigError> {
        use std::env;

        dotenvy::dotenv().ok();

        let mut cfg = match env::var("SCRAPER_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            Err(_) => Self::default(),
        };

        cfg.apply_env(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Overlay secrets and identity from the environment. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let p = &mut self.provider;
        overlay(&mut p.username, get("CPC_USERNAME"));
        overlay(&mut p.password, get("CPC_PASSWORD"));
        overlay(&mut p.customer_code, get("CUST_CODE"));
        overlay(&mut p.customer_point, get("CUST_POINT"));

        let db = &mut self.database;
        overlay(&mut db.url, get("DATABASE_URL"));
        overlay(&mut db.server, get("DB_SERVER"));
        overlay(&mut db.user, get("DB_USERNAME"));
        overlay(&mut db.password, get("DB_PASSWORD"));
        overlay(&mut db.name, get("DB_NAME"));
        if let Some(port) = get("DB_PORT").and_then(|v| v.trim().parse().ok()) {
            db.port = Some(port);
        }
    }

    /// Everything the job needs before it touches the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider.identity()?;
        self.fetch.retry_policy()?;
        self.database.connect_options()?;
        self.database.table()?;
        self.database.transform_procedure()?;
        self.scan.settings()?;
        Ok(())
    }
}

fn overlay(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    non_empty(value)
        .map(str::to_string)
        .ok_or(ConfigError::Missing(name))
}

pub fn parse_day(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), &format_description!("[year]-[month]-[day]")).ok()
}
