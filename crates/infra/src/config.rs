//! Runtime configuration.
//!
//! Loaded from an optional TOML file and `STOCKWISE__*` environment variables
//! (double underscore between section and key, e.g. `STOCKWISE__INVENTORY__APPROVAL_THRESHOLD`).
//! Every value has a default, so an empty environment yields a working setup.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use stockwise_core::Money;
use stockwise_inventory::{AdjustmentType, ApprovalPolicy, ValuationMethod};
pub use stockwise_observability::LoggingConfig;

const ENV_PREFIX: &str = "STOCKWISE";
const DEFAULT_CONFIG_FILE: &str = "config/stockwise";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub inventory: InventoryConfig,
    pub jobs: JobsConfig,
    pub accounting: AccountingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// HS256 signing secret for bearer tokens.
    pub jwt_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            jwt_secret: "dev-secret".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub valuation_method: ValuationMethod,
    pub approval_threshold: Decimal,
    pub auto_approve_types: Vec<AdjustmentType>,
    pub reservation_ttl_secs: u64,
    pub lock_timeout_ms: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            valuation_method: ValuationMethod::Fifo,
            approval_threshold: Decimal::new(100_000, 2),
            auto_approve_types: vec![
                AdjustmentType::PhysicalCount,
                AdjustmentType::SystemCorrection,
            ],
            reservation_ttl_secs: 86_400,
            lock_timeout_ms: 2_000,
        }
    }
}

impl InventoryConfig {
    pub fn approval_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy {
            threshold: Money::new(self.approval_threshold),
            auto_approve_types: self.auto_approve_types.clone(),
        }
    }

    /// `None` when the configured seconds do not fit a `chrono::Duration`.
    pub fn reservation_ttl(&self) -> Option<chrono::Duration> {
        i64::try_from(self.reservation_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub sweep_interval_secs: u64,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    /// How long finished sweeps stay listed before the scheduler drops them.
    pub completed_retention_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            poll_interval_ms: 100,
            max_attempts: 5,
            completed_retention_secs: 3600,
        }
    }
}

impl JobsConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    /// Decimal places allowed on journal amounts.
    pub currency_scale: u32,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self { currency_scale: 2 }
    }
}

impl Settings {
    /// Load from `config/stockwise.{toml,yaml,json}` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("inventory.auto_approve_types"),
            )
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        match self.inventory.reservation_ttl() {
            Some(ttl) if ttl > chrono::Duration::zero() => Ok(self),
            _ => Err(ConfigError::Message(format!(
                "inventory.reservation_ttl_secs out of range: {}",
                self.inventory.reservation_ttl_secs
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(settings.inventory.approval_threshold, dec!(1000.00));
        assert_eq!(settings.inventory.reservation_ttl_secs, 86_400);
        assert_eq!(settings.inventory.valuation_method, ValuationMethod::Fifo);
        assert_eq!(settings.accounting.currency_scale, 2);
        assert_eq!(settings.jobs.sweep_interval_secs, 60);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load_from("does/not/exist").unwrap();
        assert_eq!(settings.inventory.lock_timeout_ms, 2_000);
        assert!(settings.logging.json);
    }

    #[test]
    fn unrepresentable_reservation_ttl_is_rejected() {
        let mut settings = Settings::default();
        settings.inventory.reservation_ttl_secs = u64::MAX;
        assert_eq!(settings.inventory.reservation_ttl(), None);
        assert!(settings.clone().validated().is_err());

        settings.inventory.reservation_ttl_secs = 0;
        assert!(settings.validated().is_err());
    }

    #[test]
    fn approval_policy_carries_threshold_and_exemptions() {
        let policy = InventoryConfig::default().approval_policy();
        assert_eq!(policy.threshold, Money::new(dec!(1000)));
        assert!(policy.auto_approve_types.contains(&AdjustmentType::PhysicalCount));
    }
}
