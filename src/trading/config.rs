//! Bot configuration and the registry of configured bots.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

/// How a configured value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    /// Absolute amount in quote currency.
    Fixed,
    /// Percentage, 0 to 100.
    Percentage,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::Fixed => f.write_str("FIXED"),
            ValueType::Percentage => f.write_str("PERCENTAGE"),
        }
    }
}

/// Supported exchange backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
}

/// Base and quote currency of the traded symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    /// Parse a `BASE/QUOTE` symbol.
    pub fn parse(symbol: &str) -> Result<Self> {
        match symbol.split_once('/') {
            Some((base, quote))
                if !base.trim().is_empty() && !quote.trim().is_empty() && !quote.contains('/') =>
            {
                Ok(Self {
                    base: base.trim().to_uppercase(),
                    quote: quote.trim().to_uppercase(),
                })
            }
            _ => Err(BotError::Configuration(format!(
                "malformed symbol '{}', expected BASE/QUOTE",
                symbol
            ))),
        }
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Configuration for one rebalancing bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Registry key; also namespaces the persisted state
    #[serde(default)]
    pub id: String,

    /// Pair traded, e.g. "BTC/USDT"
    pub symbol: String,

    /// Exchange backend
    pub exchange: ExchangeId,

    /// Use the exchange's test environment
    #[serde(default)]
    pub testnet: bool,

    /// Wait multipliers cycled through between iterations
    pub time_sequence: Vec<u64>,

    /// Seconds per wait multiplier unit
    pub time_sequence_multiplier: u64,

    /// Target for base holdings: quote value (FIXED) or share of balance (PERCENTAGE)
    pub condition_value: Decimal,
    pub condition_type: ValueType,

    /// Price move from the anchor required before acting
    pub min_diff_value: Decimal,
    pub min_diff_type: ValueType,

    /// Submit maker-only orders and chase the book when they would take
    #[serde(default)]
    pub post_only: bool,

    /// Re-placements allowed after post-only rejections in one cycle
    #[serde(default = "default_max_chase_retries")]
    pub max_chase_retries: u32,
}

fn default_max_chase_retries() -> u32 {
    25
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            id: "001".to_string(),
            symbol: "BTC/USDT".to_string(),
            exchange: ExchangeId::Binance,
            testnet: true,
            time_sequence: vec![1],
            time_sequence_multiplier: 60,
            condition_value: dec!(10),
            condition_type: ValueType::Fixed,
            min_diff_value: dec!(0.35),
            min_diff_type: ValueType::Percentage,
            post_only: true,
            max_chase_retries: default_max_chase_retries(),
        }
    }
}

impl BotConfig {
    pub fn pair(&self) -> Result<TradingPair> {
        TradingPair::parse(&self.symbol)
    }

    pub fn validate(&self) -> Result<()> {
        self.pair()?;

        if self.time_sequence.is_empty() {
            return Err(self.invalid("time_sequence must not be empty"));
        }
        if self.time_sequence_multiplier == 0 {
            return Err(self.invalid("time_sequence_multiplier must be positive"));
        }
        if self.condition_value < Decimal::ZERO {
            return Err(self.invalid("condition_value must not be negative"));
        }
        if self.min_diff_value < Decimal::ZERO {
            return Err(self.invalid("min_diff_value must not be negative"));
        }
        Ok(())
    }

    fn invalid(&self, msg: &str) -> BotError {
        BotError::Configuration(format!("bot '{}': {}", self.id, msg))
    }
}

/// API credentials for the exchange account.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials for a bot from the environment:
    /// - STICK_REBALANCER_<ID>_API_KEY / STICK_REBALANCER_<ID>_API_SECRET,
    ///   with `<ID>` upper-cased and non-alphanumerics mapped to `_`
    /// - falling back to BINANCE_API_KEY / BINANCE_API_SECRET
    pub fn from_env(bot_id: &str) -> Result<Self> {
        let id: String = bot_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        let prefix = format!("STICK_REBALANCER_{}", id);
        let api_key = env_with_fallback(&format!("{}_API_KEY", prefix), "BINANCE_API_KEY")?;
        let api_secret =
            env_with_fallback(&format!("{}_API_SECRET", prefix), "BINANCE_API_SECRET")?;
        Ok(Self { api_key, api_secret })
    }
}

fn env_with_fallback(primary: &str, fallback: &str) -> Result<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .map_err(|_| BotError::Configuration(format!("{} (or {}) not set", primary, fallback)))
}

/// All configured bots, keyed by identifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotRegistry {
    #[serde(default)]
    bots: BTreeMap<String, BotConfig>,
}

impl BotRegistry {
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut registry: BotRegistry = toml::from_str(content)
            .map_err(|e| BotError::Configuration(format!("failed to parse registry: {}", e)))?;

        for (id, config) in registry.bots.iter_mut() {
            config.id = id.clone();
            config.validate()?;
        }

        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BotError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Look up a bot; unknown identifiers are a configuration error.
    pub fn get(&self, id: &str) -> Result<BotConfig> {
        self.bots
            .get(id)
            .cloned()
            .ok_or_else(|| BotError::Configuration(format!("unknown bot id '{}'", id)))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.bots.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
        [bots.001]
        symbol = "BSV/USDT"
        exchange = "binance"
        time_sequence = [1]
        time_sequence_multiplier = 60
        condition_value = 10
        condition_type = "FIXED"
        min_diff_value = 0.35
        min_diff_type = "PERCENTAGE"
        post_only = true

        [bots.eth]
        symbol = "ETH/USDT"
        exchange = "binance"
        testnet = true
        time_sequence = [1, 2, 5]
        time_sequence_multiplier = 30
        condition_value = "50"
        condition_type = "PERCENTAGE"
        min_diff_value = "25"
        min_diff_type = "FIXED"
        max_chase_retries = 3
    "#;

    #[test]
    fn test_registry_parses_and_fills_ids() {
        let registry = BotRegistry::from_toml(REGISTRY).unwrap();
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["001", "eth"]);

        let bot = registry.get("001").unwrap();
        assert_eq!(bot.id, "001");
        assert_eq!(bot.condition_type, ValueType::Fixed);
        assert_eq!(bot.min_diff_type, ValueType::Percentage);
        assert_eq!(bot.min_diff_value, dec!(0.35));
        assert!(bot.post_only);
        assert!(!bot.testnet);
        assert_eq!(bot.max_chase_retries, 25);

        let eth = registry.get("eth").unwrap();
        assert_eq!(eth.time_sequence, vec![1, 2, 5]);
        assert_eq!(eth.condition_value, dec!(50));
        assert!(!eth.post_only);
        assert_eq!(eth.max_chase_retries, 3);
    }

    #[test]
    fn test_unknown_bot_is_configuration_error() {
        let registry = BotRegistry::from_toml(REGISTRY).unwrap();
        let err = registry.get("999").unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_pair_parsing() {
        let pair = TradingPair::parse("bsv/usdt").unwrap();
        assert_eq!(pair.base, "BSV");
        assert_eq!(pair.quote, "USDT");
        assert_eq!(pair.to_string(), "BSV/USDT");

        for bad in ["BSVUSDT", "/USDT", "BSV/", "A/B/C", ""] {
            assert!(
                matches!(TradingPair::parse(bad), Err(BotError::Configuration(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_validation_rejects_bad_schedule() {
        let config = BotConfig {
            time_sequence: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BotConfig {
            time_sequence_multiplier: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(BotConfig::default().validate().is_ok());
    }

    #[test]
    fn test_malformed_symbol_in_registry_fails_load() {
        let toml = REGISTRY.replace("BSV/USDT", "BSVUSDT");
        assert!(matches!(
            BotRegistry::from_toml(&toml),
            Err(BotError::Configuration(_))
        ));
    }

    #[test]
    fn test_credentials_env_name_from_bot_id() {
        std::env::set_var("STICK_REBALANCER_TEST_HALF_API_KEY", "key");
        std::env::set_var("STICK_REBALANCER_TEST_HALF_API_SECRET", "secret");

        let creds = Credentials::from_env("test-half").unwrap();
        assert_eq!(creds.api_key, "key");
        assert_eq!(creds.api_secret, "secret");
        assert!(!format!("{:?}", creds).contains("secret\""));
    }

    #[test]
    fn test_unknown_exchange_fails_load() {
        let toml = REGISTRY.replace("\"binance\"", "\"kraken\"");
        assert!(BotRegistry::from_toml(&toml).is_err());
    }

    #[test]
    fn test_kucoin_is_not_supported() {
        let toml = REGISTRY.replace("\"binance\"", "\"kucoin\"");
        assert!(BotRegistry::from_toml(&toml).is_err());
    }
}
