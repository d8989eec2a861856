//! # Configuration Management
//!
//! Centralized configuration for the BNCS client.
//!
//! ## Configuration Sources
//! - TOML files via [`Config::from_file`]
//! - Direct instantiation with defaults
//! - Environment overrides via [`Config::from_env`] / [`Config::apply_env`]
//!
//! ## Defaults
//! [`ClientConfig::default`] is the one explicit default value. A caller that
//! builds a partial config can fill its empty fields with
//! [`ClientConfig::merge_defaults`]; fields the caller set always win.
//!
//! A product or game version of zero means "infer at client construction"
//! from the CD key count and the install directory.

use crate::core::payloads::{FourCC, LANGUAGE_EN_US, PLATFORM_X86};
use crate::crypto::ProofScheme;
use crate::error::{ProtocolError, Result};
use crate::transport::ConnSettings;
use crate::utils::rate_limit::RateLimitConfig;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Protocol id advertised in the version request.
pub const PROTOCOL_ID: u32 = 0;

/// Game version used when nothing else is known.
pub const DEFAULT_GAME_VERSION: u32 = 31;

/// Longest account name the server accepts.
pub const MAX_USERNAME_LEN: usize = 15;

/// Top-level configuration file layout
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `BNCS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Override fields from `BNCS_*` environment variables.
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(addr) = std::env::var("BNCS_SERVER_ADDR") {
            self.client.server_addr = addr;
        }
        if let Ok(user) = std::env::var("BNCS_USERNAME") {
            self.client.username = user;
        }
        if let Ok(pass) = std::env::var("BNCS_PASSWORD") {
            self.client.password = pass;
        }
        if let Ok(keys) = std::env::var("BNCS_CD_KEYS") {
            self.client.cd_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(path) = std::env::var("BNCS_BIN_PATH") {
            self.client.bin_path = PathBuf::from(path);
        }
        if let Ok(ms) = std::env::var("BNCS_KEEPALIVE_MS") {
            let ms = ms.parse::<u64>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid BNCS_KEEPALIVE_MS '{ms}': {e}"))
            })?;
            self.client.keep_alive_interval = Duration::from_millis(ms);
        }
        if let Ok(level) = std::env::var("BNCS_LOG_LEVEL") {
            self.logging.log_level = level.parse().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid BNCS_LOG_LEVEL '{level}'"))
            })?;
        }
        Ok(self)
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.client.validate();
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Fields of the version request (0x50)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub platform_code: FourCC,

    /// Zero picks ROC or TFT by CD key count
    pub product: FourCC,

    /// Minor game version; zero infers it from the executable
    pub version: u32,

    pub language_code: FourCC,
    pub local_ip: Ipv4Addr,
    pub time_zone_bias: u32,
    pub mpq_locale_id: u32,
    pub user_language_id: u32,
    pub country_abbreviation: String,
    pub country: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            platform_code: PLATFORM_X86,
            product: FourCC(0),
            version: 0,
            language_code: LANGUAGE_EN_US,
            local_ip: Ipv4Addr::UNSPECIFIED,
            time_zone_bias: 4_294_967_176,
            mpq_locale_id: 1033,
            user_language_id: 1033,
            country_abbreviation: String::from("USA"),
            country: String::from("United States"),
        }
    }
}

/// Per-step deadlines
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "duration_serde")]
    pub connect: Duration,

    #[serde(with = "duration_serde")]
    pub write: Duration,

    /// First response of each handshake step
    #[serde(with = "duration_serde")]
    pub handshake: Duration,

    /// First response of logon and password steps
    #[serde(with = "duration_serde")]
    pub logon: Duration,

    /// Steady-state silence before the connection is dropped; zero waits forever
    #[serde(with = "duration_serde")]
    pub read: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: timeout::CONNECT_TIMEOUT,
            write: timeout::WRITE_TIMEOUT,
            handshake: timeout::DEFAULT_TIMEOUT,
            logon: timeout::LOGON_TIMEOUT,
            read: timeout::READ_TIMEOUT,
        }
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host[:port]`; port 6112 when omitted
    pub server_addr: String,

    /// Zero disables keep-alives
    #[serde(with = "duration_serde")]
    pub keep_alive_interval: Duration,

    pub platform: PlatformConfig,

    /// Game install directory, for executable hashing and saved credentials
    pub bin_path: PathBuf,

    /// Precomputed executable details; zero/empty derives them from `bin_path`
    pub exe_info: String,
    pub exe_version: u32,
    pub exe_hash: u32,

    /// Check the server signature in the version challenge
    pub verify_signature: bool,

    pub proof_scheme: ProofScheme,

    pub username: String,
    pub password: String,

    pub cd_key_owner: String,
    pub cd_keys: Vec<String>,

    /// Advertised before entering chat; zero skips the advertisement
    pub game_port: u16,

    /// Channel joined after entering chat
    pub home_channel: String,

    pub timeouts: TimeoutConfig,

    pub rate_limit: RateLimitConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: String::new(),
            keep_alive_interval: timeout::KEEPALIVE_INTERVAL,
            platform: PlatformConfig::default(),
            bin_path: PathBuf::new(),
            exe_info: String::new(),
            exe_version: 0,
            exe_hash: 0,
            verify_signature: false,
            proof_scheme: ProofScheme::default(),
            username: String::new(),
            password: String::new(),
            cd_key_owner: String::from("bncs-protocol"),
            cd_keys: Vec::new(),
            game_port: 6112,
            home_channel: String::from("W3"),
            timeouts: TimeoutConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn fill_str(field: &mut String, default: &str) {
    if field.is_empty() {
        *field = default.to_string();
    }
}

fn fill_code(field: &mut FourCC, default: FourCC) {
    if field.is_zero() {
        *field = default;
    }
}

fn fill_num<T: Copy + Default + PartialEq>(field: &mut T, default: T) {
    if *field == T::default() {
        *field = default;
    }
}

impl ClientConfig {
    /// Fill empty or zero fields from `defaults`.
    ///
    /// Booleans, durations and the nested timeout and rate-limit tables are
    /// taken as given, since their zero values are meaningful.
    pub fn merge(mut self, defaults: &ClientConfig) -> Self {
        fill_str(&mut self.server_addr, &defaults.server_addr);

        let p = &mut self.platform;
        let d = &defaults.platform;
        fill_code(&mut p.platform_code, d.platform_code);
        fill_code(&mut p.product, d.product);
        fill_num(&mut p.version, d.version);
        fill_code(&mut p.language_code, d.language_code);
        if p.local_ip.is_unspecified() {
            p.local_ip = d.local_ip;
        }
        fill_num(&mut p.time_zone_bias, d.time_zone_bias);
        fill_num(&mut p.mpq_locale_id, d.mpq_locale_id);
        fill_num(&mut p.user_language_id, d.user_language_id);
        fill_str(&mut p.country_abbreviation, &d.country_abbreviation);
        fill_str(&mut p.country, &d.country);

        if self.bin_path.as_os_str().is_empty() {
            self.bin_path = defaults.bin_path.clone();
        }
        fill_str(&mut self.exe_info, &defaults.exe_info);
        fill_num(&mut self.exe_version, defaults.exe_version);
        fill_num(&mut self.exe_hash, defaults.exe_hash);
        fill_str(&mut self.username, &defaults.username);
        fill_str(&mut self.password, &defaults.password);
        fill_str(&mut self.cd_key_owner, &defaults.cd_key_owner);
        if self.cd_keys.is_empty() {
            self.cd_keys = defaults.cd_keys.clone();
        }
        fill_num(&mut self.game_port, defaults.game_port);
        fill_str(&mut self.home_channel, &defaults.home_channel);
        self
    }

    pub fn merge_defaults(self) -> Self {
        self.merge(&ClientConfig::default())
    }

    pub fn conn_settings(&self) -> ConnSettings {
        ConnSettings {
            connect_timeout: self.timeouts.connect,
            write_timeout: self.timeouts.write,
            rate_limit: self.rate_limit.clone(),
        }
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server_addr.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        }

        if self.username.len() > MAX_USERNAME_LEN {
            errors.push(format!(
                "Username too long: {} characters (maximum: {MAX_USERNAME_LEN})",
                self.username.len()
            ));
        }

        if self.cd_keys.len() > 2 {
            errors.push(format!(
                "Too many CD keys: {} (maximum: 2)",
                self.cd_keys.len()
            ));
        }

        if self.home_channel.is_empty() {
            errors.push("Home channel cannot be empty".to_string());
        }

        if self.platform.platform_code.is_zero() {
            errors.push("Platform code cannot be empty".to_string());
        }

        if self.platform.language_code.is_zero() {
            errors.push("Language code cannot be empty".to_string());
        }

        if !self.keep_alive_interval.is_zero() && self.keep_alive_interval.as_secs() < 1 {
            errors.push("Keep-alive interval too short (minimum: 1s)".to_string());
        }

        let t = &self.timeouts;
        for (name, value) in [
            ("connect", t.connect),
            ("write", t.write),
            ("handshake", t.handshake),
            ("logon", t.logon),
        ] {
            if value.as_millis() < 100 {
                errors.push(format!("{name} timeout too short (minimum: 100ms)"));
            }
        }

        errors.extend(self.rate_limit.validate());
        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Include the event target (module path)
    pub with_target: bool,

    /// Colored output
    pub ansi: bool,

    /// Single-line compact formatter
    pub compact: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            with_target: true,
            ansi: true,
            compact: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.compact && !self.with_target && self.log_level == Level::TRACE {
            errors.push(
                "Trace logging without targets is hard to read; enable with_target".to_string(),
            );
        }
        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
