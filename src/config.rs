use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::Result;

/// Exchange connectivity settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
    /// Optional HTTPS proxy, e.g. "http://127.0.0.1:7890"
    pub proxy: Option<String>,
    /// Attempt budget for each REST call and for order-state polling
    pub retries: u32,
    pub requests_per_second: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.okx.com".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            passphrase: String::new(),
            proxy: None,
            retries: 3,
            requests_per_second: 10,
        }
    }
}

impl ExchangeConfig {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Strategy parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Fixed quantity for every buy, in base currency
    pub trade_size: f64,
    /// Bars to hold a long before selling
    pub min_hold_bars: u64,
    /// Advisory price sent with market orders; last close when unset
    pub price_hint: Option<f64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_period: 5,
            slow_period: 20,
            trade_size: 0.0003,
            min_hold_bars: 2,
            price_hint: None,
        }
    }
}

/// Market data settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub symbol: String,
    pub timeframe_minutes: u32,
    /// Historical bars fetched before going live
    pub backfill_bars: u32,
    pub poll_secs: u64,
    /// Consecutive poll failures before reporting a disconnect
    pub max_failures: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USDT".to_string(),
            timeframe_minutes: 1,
            backfill_bars: 50,
            poll_secs: 10,
            max_failures: 3,
        }
    }
}

/// Wallets logged alongside each live bar
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub quote_asset: String,
    pub base_asset: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            base_asset: "BTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub exchange: ExchangeConfig,
    pub strategy: StrategyConfig,
    pub feed: FeedConfig,
    pub wallet: WalletConfig,
}

impl BotConfig {
    /// Load configuration from an optional TOML file with
    /// `CROSSBOT_`-prefixed environment overrides on top
    /// (e.g. `CROSSBOT_EXCHANGE__API_KEY`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let cfg: Self = builder
            .add_source(Environment::with_prefix("CROSSBOT").separator("__"))
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse configuration from a TOML string (tests, embedded defaults)
    pub fn from_toml(toml: &str) -> Result<Self> {
        let cfg: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.strategy.fast_period == 0 || self.strategy.slow_period == 0 {
            anyhow::bail!("EMA periods must be positive");
        }
        if self.strategy.fast_period >= self.strategy.slow_period {
            anyhow::bail!(
                "fast EMA period {} must be shorter than slow period {}",
                self.strategy.fast_period,
                self.strategy.slow_period
            );
        }
        if self.strategy.trade_size <= 0.0 {
            anyhow::bail!("trade_size must be positive");
        }
        if self.feed.backfill_bars < self.strategy.slow_period as u32 {
            anyhow::bail!(
                "backfill_bars {} leaves the EMA({}) cold at go-live",
                self.feed.backfill_bars,
                self.strategy.slow_period
            );
        }
        Ok(())
    }
}
