//! Configuration - Type-safe, validated config

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bank settings
    pub bank: BankConfig,

    /// Order engine settings
    pub orders: OrderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankConfig {
    /// Bank routing code
    pub bank_code: u64,

    /// First account number the allocator hands out
    pub base_number: u64,

    /// Exclusive upper bound of the account number range
    pub max_number: u64,

    /// Overdraft limit for newly opened checking accounts (account currency)
    pub default_overdraft: rust_decimal::Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    /// Milliseconds between price polls of a watch task
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bank: BankConfig {
                bank_code: 12345678,
                base_number: 1000,
                max_number: 10000,
                default_overdraft: rust_decimal::Decimal::from(1000),
            },
            orders: OrderConfig {
                poll_interval_ms: 1000,
            },
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &PathBuf) -> crate::core::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::core::Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::core::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::core::Result<()> {
        if self.bank.base_number >= self.bank.max_number {
            return Err(crate::core::Error::Config(
                "base_number must be below max_number".into(),
            ));
        }
        if self.bank.default_overdraft < rust_decimal::Decimal::ZERO {
            return Err(crate::core::Error::Config(
                "default_overdraft must not be negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parses_toml() {
        let raw = r#"
            [bank]
            bank_code = 777
            base_number = 100
            max_number = 200
            default_overdraft = 500.0

            [orders]
            poll_interval_ms = 50
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.bank.bank_code, 777);
        assert_eq!(config.orders.poll_interval_ms, 50);
    }

    #[test]
    fn rejects_inverted_number_range() {
        let mut config = Config::default();
        config.bank.base_number = config.bank.max_number;
        assert!(config.validate().is_err());
    }
}
