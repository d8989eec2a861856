//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bncs_protocol::config::{ClientConfig, Config, LoggingConfig, TimeoutConfig};
use bncs_protocol::core::payloads::FourCC;
use bncs_protocol::utils::RateLimitConfig;
use std::time::Duration;
use tracing::Level;

fn valid() -> Config {
    Config {
        client: ClientConfig {
            server_addr: "127.0.0.1:6112".into(),
            ..ClientConfig::default()
        },
        logging: LoggingConfig::default(),
    }
}

#[test]
fn test_default_config_validates_with_address() {
    let errors = valid().validate();
    assert!(
        errors.is_empty(),
        "Config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_empty_server_address() {
    let errors = Config::default().validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_username_too_long() {
    let mut config = valid();
    config.client.username = "a".repeat(16);

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Username too long")));
}

#[test]
fn test_too_many_cd_keys() {
    let mut config = valid();
    config.client.cd_keys = vec!["k".into(); 3];

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Too many CD keys")));
}

#[test]
fn test_zero_platform_code() {
    let mut config = valid();
    config.client.platform.platform_code = FourCC(0);

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Platform code")));
}

#[test]
fn test_keepalive_disabled_is_valid() {
    let mut config = valid();
    config.client.keep_alive_interval = Duration::ZERO;
    assert!(config.validate().is_empty());

    config.client.keep_alive_interval = Duration::from_millis(10);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Keep-alive interval too short")));
}

#[test]
fn test_timeouts_too_short() {
    let mut config = valid();
    config.client.timeouts = TimeoutConfig {
        connect: Duration::from_millis(10),
        logon: Duration::from_millis(50),
        ..TimeoutConfig::default()
    };

    let errors = config.validate();
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors.iter().any(|e| e.contains("connect timeout")));
    assert!(errors.iter().any(|e| e.contains("logon timeout")));
}

#[test]
fn test_rate_limit_validation_is_included() {
    let mut config = valid();
    config.client.rate_limit = RateLimitConfig {
        bytes_per_second: 0,
        ..RateLimitConfig::default()
    };
    assert!(!config.validate().is_empty());
}

#[test]
fn test_multiple_errors_accumulated() {
    let mut config = Config::default();
    config.client.home_channel = String::new();
    config.client.username = "x".repeat(20);

    let errors = config.validate();
    assert!(errors.len() >= 3, "{errors:?}");
    assert!(config.validate_strict().is_err());
}

#[test]
fn test_validate_strict_message() {
    let err = Config::default().validate_strict().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Configuration validation failed"));
    assert!(message.contains("Server address"));
}

#[test]
fn test_toml_file_roundtrip() {
    let dir = std::env::temp_dir().join(format!("bncs-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("client.toml");

    let mut config = valid();
    config.client.home_channel = "Clan BNCS".into();
    config.logging.log_level = Level::DEBUG;
    config.save_to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.client, config.client);
    assert_eq!(loaded.logging.log_level, Level::DEBUG);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_bad_toml_is_config_error() {
    let err = Config::from_toml("[client]\nkeep_alive_interval = \"soon\"").unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));

    let err = Config::from_toml("[logging]\nlog_level = \"loud\"").unwrap_err();
    assert!(err.to_string().contains("Invalid log level"));
}

#[test]
fn test_unknown_product_code_rejected() {
    let err = Config::from_toml("[client.platform]\nproduct = \"TOOLONG\"").unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_env_overrides() {
    std::env::set_var("BNCS_SERVER_ADDR", "env.example:6200");
    std::env::set_var("BNCS_CD_KEYS", "AAAA, BBBB ,");
    std::env::set_var("BNCS_KEEPALIVE_MS", "45000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.client.server_addr, "env.example:6200");
    assert_eq!(config.client.cd_keys, vec!["AAAA", "BBBB"]);
    assert_eq!(config.client.keep_alive_interval, Duration::from_secs(45));

    std::env::set_var("BNCS_KEEPALIVE_MS", "often");
    assert!(Config::from_env().is_err());

    std::env::remove_var("BNCS_SERVER_ADDR");
    std::env::remove_var("BNCS_CD_KEYS");
    std::env::remove_var("BNCS_KEEPALIVE_MS");
}
