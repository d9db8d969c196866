//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the gateway runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

const MAX_TIMEOUT: Duration = Duration::from_secs(60);
const REDACTED: &str = "***";

fn default_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_modbus_port() -> u16 {
    502
}

fn default_eta_slave() -> u8 {
    1
}

fn default_helios_slave() -> u8 {
    180
}

fn default_keba_port() -> u16 {
    7090
}

fn default_fronius_device() -> u32 {
    1
}

fn default_netatmo_address() -> Url {
    Url::parse("https://api.netatmo.net/").expect("valid default netatmo address")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default api address")
}

/// Primary configuration object for the gateway daemon.
///
/// Every device section is optional; an absent section leaves that gateway disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub em300lr: Option<Em300lrSettings>,
    #[serde(default)]
    pub etapu11: Option<Etapu11Settings>,
    #[serde(default)]
    pub fronius: Option<FroniusSettings>,
    #[serde(default)]
    pub helios: Option<HeliosSettings>,
    #[serde(default)]
    pub netatmo: Option<NetatmoSettings>,
    #[serde(default)]
    pub wallbox: Option<WallboxSettings>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "DEVGW_CONFIG";

    /// Load configuration from disk, respecting the `DEVGW_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Names of the gateways enabled by this configuration, in a fixed order.
    pub fn enabled_gateways(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.em300lr.is_some() {
            names.push("em300lr");
        }
        if self.etapu11.is_some() {
            names.push("etapu11");
        }
        if self.fronius.is_some() {
            names.push("fronius");
        }
        if self.helios.is_some() {
            names.push("helios");
        }
        if self.netatmo.is_some() {
            names.push("netatmo");
        }
        if self.wallbox.is_some() {
            names.push("wallbox");
        }
        names
    }

    /// Copy with every credential masked, for printing.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if let Some(settings) = copy.em300lr.as_mut() {
            settings.password = REDACTED.into();
        }
        if let Some(settings) = copy.netatmo.as_mut() {
            settings.password = REDACTED.into();
            settings.client_secret = REDACTED.into();
        }
        copy
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.enabled_gateways().is_empty() {
            return Err(anyhow!("configuration must enable at least one gateway"));
        }
        if let Some(settings) = &self.em300lr {
            settings.validate().context("invalid [em300lr] section")?;
        }
        if let Some(settings) = &self.etapu11 {
            settings.validate().context("invalid [etapu11] section")?;
        }
        if let Some(settings) = &self.fronius {
            settings.validate().context("invalid [fronius] section")?;
        }
        if let Some(settings) = &self.helios {
            settings.validate().context("invalid [helios] section")?;
        }
        if let Some(settings) = &self.netatmo {
            settings.validate().context("invalid [netatmo] section")?;
        }
        if let Some(settings) = &self.wallbox {
            settings.validate().context("invalid [wallbox] section")?;
        }
        self.polling.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() || timeout > MAX_TIMEOUT {
        return Err(anyhow!(
            "timeout must be between 1 ms and {} s, got {} ms",
            MAX_TIMEOUT.as_secs(),
            timeout.as_millis()
        ));
    }
    Ok(())
}

fn validate_not_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field} must not be empty"));
    }
    Ok(())
}

fn validate_http_address(address: &Url) -> Result<()> {
    match address.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("address scheme must be http or https, got {other}")),
    }
    if address.host_str().is_none() {
        return Err(anyhow!("address {address} has no host"));
    }
    Ok(())
}

fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(anyhow!("port must be non-zero"));
    }
    Ok(())
}

/// TQ EM300-LR energy meter web service.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Em300lrSettings {
    pub address: Url,
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    pub password: String,
    pub serial_number: String,
}

impl fmt::Debug for Em300lrSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Em300lrSettings")
            .field("address", &self.address.as_str())
            .field("timeout", &self.timeout)
            .field("password", &REDACTED)
            .field("serial_number", &self.serial_number)
            .finish()
    }
}

impl Em300lrSettings {
    pub fn validate(&self) -> Result<()> {
        validate_http_address(&self.address)?;
        validate_timeout(self.timeout)?;
        validate_not_empty("password", &self.password)?;
        validate_not_empty("serial_number", &self.serial_number)?;
        Ok(())
    }
}

/// ETA PU 11 pellet boiler reachable via Modbus TCP.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Etapu11Settings {
    pub address: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    #[serde(default = "default_eta_slave")]
    pub slave_id: u8,
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
}

impl Etapu11Settings {
    pub fn validate(&self) -> Result<()> {
        validate_not_empty("address", &self.address)?;
        validate_port(self.port)?;
        validate_timeout(self.timeout)?;
        if self.slave_id == 0 || self.slave_id > 247 {
            return Err(anyhow!("slave_id must be within 1..=247"));
        }
        Ok(())
    }
}

/// Fronius inverter Solar API (v1).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FroniusSettings {
    pub address: Url,
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_fronius_device")]
    pub device_id: u32,
}

impl FroniusSettings {
    pub fn validate(&self) -> Result<()> {
        validate_http_address(&self.address)?;
        validate_timeout(self.timeout)?;
        Ok(())
    }
}

/// Helios KWL ventilation unit (easyControls Modbus TCP).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeliosSettings {
    pub address: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    #[serde(default = "default_helios_slave")]
    pub slave_id: u8,
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
}

impl HeliosSettings {
    pub fn validate(&self) -> Result<()> {
        validate_not_empty("address", &self.address)?;
        validate_port(self.port)?;
        validate_timeout(self.timeout)?;
        Ok(())
    }
}

/// Netatmo weather station cloud API.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetatmoSettings {
    #[serde(default = "default_netatmo_address")]
    pub address: Url,
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    pub user: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    pub device_id: String,
}

impl fmt::Debug for NetatmoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetatmoSettings")
            .field("address", &self.address.as_str())
            .field("timeout", &self.timeout)
            .field("user", &self.user)
            .field("password", &REDACTED)
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("device_id", &self.device_id)
            .finish()
    }
}

impl NetatmoSettings {
    pub fn validate(&self) -> Result<()> {
        validate_http_address(&self.address)?;
        validate_timeout(self.timeout)?;
        validate_not_empty("user", &self.user)?;
        validate_not_empty("password", &self.password)?;
        validate_not_empty("client_id", &self.client_id)?;
        validate_not_empty("client_secret", &self.client_secret)?;
        validate_not_empty("device_id", &self.device_id)?;
        Ok(())
    }
}

/// KEBA KeContact P30 wallbox (UDP report protocol).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallboxSettings {
    pub address: String,
    #[serde(default = "default_keba_port")]
    pub port: u16,
    /// Local UDP port to bind. The charger answers to port 7090, `0` picks an ephemeral port.
    #[serde(default = "default_keba_port")]
    pub local_port: u16,
    #[serde(default = "default_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
}

impl WallboxSettings {
    pub fn validate(&self) -> Result<()> {
        validate_not_empty("address", &self.address)?;
        validate_port(self.port)?;
        validate_timeout(self.timeout)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

/// Optional background refresh of every gateway. Disabled unless an interval is set.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub interval: Option<Duration>,
}

impl PollingConfig {
    pub fn validate(&self) -> Result<()> {
        if matches!(self.interval, Some(interval) if interval.is_zero()) {
            return Err(anyhow!("polling interval must be at least one second"));
        }
        Ok(())
    }
}
