use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::platform::{RiskLimits, ZeroFillPolicy};
use crate::strategy::{SettlementDelay, StrategyParams};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of each priority tier before drop-oldest kicks in
    pub tier_capacity: usize,
    /// How long the worker waits on an empty queue before re-checking the stop flag
    pub poll_timeout_ms: u64,
    /// Portfolio value the risk fractions are measured against
    pub portfolio_value: Decimal,
    pub zero_fill_policy: ZeroFillPolicy,
    /// Pickups allowed under the requeue policy before rejecting
    pub max_requeue_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tier_capacity: 1000,
            poll_timeout_ms: 1000,
            portfolio_value: dec!(100000),
            zero_fill_policy: ZeroFillPolicy::Reject,
            max_requeue_attempts: 3,
        }
    }
}

impl EngineConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Risk limits as fractions of portfolio value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_position_size: Decimal,
    pub max_total_risk: Decimal,
    pub max_daily_loss: Decimal,
    pub max_order_size: Decimal,
    pub max_open_positions: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let limits = RiskLimits::default();
        Self {
            max_position_size: limits.max_position_size,
            max_total_risk: limits.max_total_risk,
            max_daily_loss: limits.max_daily_loss,
            max_order_size: limits.max_order_size,
            max_open_positions: limits.max_open_positions,
        }
    }
}

impl RiskConfig {
    pub fn to_limits(&self) -> RiskLimits {
        RiskLimits {
            max_position_size: self.max_position_size,
            max_total_risk: self.max_total_risk,
            max_daily_loss: self.max_daily_loss,
            max_order_size: self.max_order_size,
            max_open_positions: self.max_open_positions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub twap_slices: usize,
    /// Visible clip as a fraction of order quantity (e.g., 0.10 = 10%)
    pub iceberg_visible_fraction: Decimal,
    /// Used when the snapshot carries no participation
    pub default_participation: Decimal,
    /// Used when the snapshot carries no volume curve
    pub default_volume_distribution: Vec<Decimal>,
    pub min_slice_quantity: Decimal,
    pub max_slices: usize,
    pub twap_delay_ms: u64,
    pub vwap_delay_ms: u64,
    pub iceberg_delay_ms: u64,
    pub participate_delay_ms: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let params = StrategyParams::default();
        Self {
            twap_slices: params.twap_slices,
            iceberg_visible_fraction: params.iceberg_visible_fraction,
            default_participation: params.default_participation,
            default_volume_distribution: params.default_volume_distribution,
            min_slice_quantity: params.min_slice_quantity,
            max_slices: params.max_slices,
            twap_delay_ms: 100,
            vwap_delay_ms: 100,
            iceberg_delay_ms: 200,
            participate_delay_ms: 100,
        }
    }
}

impl StrategyConfig {
    pub fn params(&self) -> StrategyParams {
        StrategyParams {
            twap_slices: self.twap_slices,
            iceberg_visible_fraction: self.iceberg_visible_fraction,
            default_participation: self.default_participation,
            default_volume_distribution: self.default_volume_distribution.clone(),
            min_slice_quantity: self.min_slice_quantity,
            max_slices: self.max_slices,
        }
    }

    pub fn settlement_delay(&self) -> SettlementDelay {
        SettlementDelay::from_millis(
            self.twap_delay_ms,
            self.vwap_delay_ms,
            self.iceberg_delay_ms,
            self.participate_delay_ms,
        )
    }
}

/// Simulated market data supplier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Base price per symbol
    pub base_prices: HashMap<String, Decimal>,
    /// Price for symbols missing from `base_prices` (unset = unavailable)
    pub default_price: Option<Decimal>,
    /// Random walk amplitude per snapshot, in basis points (0 = static)
    pub jitter_bps: u32,
    pub volume_distribution: Option<Vec<Decimal>>,
    pub market_participation: Option<Decimal>,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_prices: HashMap::new(),
            default_price: Some(dec!(100)),
            jitter_bps: 0,
            volume_distribution: None,
            market_participation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Webhook receiving execution events as JSON (unset = log only)
    pub webhook_url: Option<String>,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_retries: 3,
            initial_backoff_ms: 200,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("WARMACHINE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // WARMACHINE__RISK__MAX_ORDER_SIZE=0.05, etc.
            .add_source(
                Environment::with_prefix("WARMACHINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Engine
        if self.engine.tier_capacity == 0 {
            errors.push("engine.tier_capacity must be positive".to_string());
        }
        if self.engine.poll_timeout_ms == 0 {
            errors.push("engine.poll_timeout_ms must be positive".to_string());
        }
        if self.engine.portfolio_value <= Decimal::ZERO {
            errors.push("engine.portfolio_value must be positive".to_string());
        }

        // Risk
        if let Err(e) = self.risk.to_limits().validate() {
            errors.push(format!("risk: {e}"));
        }

        // Strategy
        let s = &self.strategy;
        if s.twap_slices == 0 {
            errors.push("strategy.twap_slices must be positive".to_string());
        }
        if s.max_slices == 0 {
            errors.push("strategy.max_slices must be positive".to_string());
        }
        if !is_fraction(s.iceberg_visible_fraction) {
            errors.push("strategy.iceberg_visible_fraction must be within (0, 1]".to_string());
        }
        if !is_fraction(s.default_participation) {
            errors.push("strategy.default_participation must be within (0, 1]".to_string());
        }
        if s.min_slice_quantity < Decimal::ZERO {
            errors.push("strategy.min_slice_quantity must not be negative".to_string());
        }
        if s.default_volume_distribution.is_empty()
            || s.default_volume_distribution.iter().any(|w| *w < Decimal::ZERO)
        {
            errors.push(
                "strategy.default_volume_distribution must be non-empty with non-negative weights"
                    .to_string(),
            );
        }

        // Market data
        let m = &self.market_data;
        if m.base_prices.values().any(|p| *p <= Decimal::ZERO) {
            errors.push("market_data.base_prices must all be positive".to_string());
        }
        if matches!(m.default_price, Some(p) if p <= Decimal::ZERO) {
            errors.push("market_data.default_price must be positive".to_string());
        }
        if matches!(m.market_participation, Some(p) if !is_fraction(p)) {
            errors.push("market_data.market_participation must be within (0, 1]".to_string());
        }

        // Notification
        if let Some(url) = &self.notification.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push(format!("notification.webhook_url is not an http(s) URL: {url}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_fraction(value: Decimal) -> bool {
    value > Decimal::ZERO && value <= Decimal::ONE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.tier_capacity, 1000);
        assert_eq!(config.risk.to_limits(), RiskLimits::default());
        assert_eq!(config.strategy.params(), StrategyParams::default());
        assert_eq!(
            config.strategy.settlement_delay(),
            SettlementDelay::default()
        );
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = AppConfig::default();
        config.engine.tier_capacity = 0;
        config.risk.max_order_size = dec!(1.5);
        config.strategy.twap_slices = 0;
        config.notification.webhook_url = Some("ftp://example".to_string());

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("max_order_size")));
    }

    #[test]
    fn test_missing_directory_yields_defaults() {
        let config = AppConfig::load_from("/nonexistent/warmachine-config").unwrap();
        assert_eq!(config.engine.portfolio_value, dec!(100000));
        assert_eq!(config.logging.level, "info");
    }
}
