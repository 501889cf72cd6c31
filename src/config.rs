//! Bridge configuration
//!
//! Loaded from a TOML file with one `[reference]` chain, any number of
//! `[[chains]]` to scan, scanner pacing and the optional status API.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{REFERENCE_SYMBOL, SCAN_BATCH};
use crate::crypto::AddressParams;
use crate::pax::ScanConfig;
use crate::rpc::{ChainHandle, ChainMode, RpcEndpoint};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// One chain the bridge talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Ticker symbol
    pub symbol: String,

    #[serde(default)]
    pub mode: ChainMode,

    /// Daemon JSON-RPC URL
    #[serde(default)]
    pub rpc_url: String,

    #[serde(default)]
    pub rpc_user: Option<String>,

    #[serde(default)]
    pub rpc_password: Option<String>,

    /// Address version bytes
    #[serde(default)]
    pub params: AddressParams,

    /// Accept short positions instead of long ones
    #[serde(default)]
    pub short: bool,

    #[serde(default = "default_start_height")]
    pub start_height: u32,

    /// Daemon request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_start_height() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

impl ChainConfig {
    /// Daemon-backed chain at `rpc_url`
    pub fn new(symbol: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            mode: ChainMode::ExternalPassthrough,
            rpc_url: rpc_url.into(),
            rpc_user: None,
            rpc_password: None,
            params: AddressParams::default(),
            short: false,
            start_height: default_start_height(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Set RPC authentication.
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self.rpc_password = Some(password.into());
        self
    }

    pub fn with_mode(mut self, mode: ChainMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_params(mut self, params: AddressParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_short(mut self, short: bool) -> Self {
        self.short = short;
        self
    }

    pub fn with_start_height(mut self, height: u32) -> Self {
        self.start_height = height;
        self
    }

    /// Set connection timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Router identity for this chain
    pub fn handle(&self) -> ChainHandle {
        let endpoint = RpcEndpoint {
            url: self.rpc_url.clone(),
            user: self.rpc_user.clone(),
            password: self.rpc_password.clone(),
        };
        let mut handle = ChainHandle::external(self.symbol.clone(), endpoint).with_params(self.params);
        handle.mode = self.mode;
        handle
    }

    /// Validate the chain entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let symbol_ok = self.symbol.len() == 3 && self.symbol.bytes().all(|b| b.is_ascii_alphabetic());
        if !symbol_ok {
            return Err(ConfigError::Invalid(format!(
                "symbol {:?} must be three letters",
                self.symbol
            )));
        }

        if self.mode == ChainMode::ExternalPassthrough && self.rpc_url.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{}: RPC URL is required",
                self.symbol
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "{}: timeout must be at least 1 second",
                self.symbol
            )));
        }

        Ok(())
    }
}

/// Scanner pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Heights per drive cycle
    pub batch_size: u32,
    pub pace_ms: u64,
    pub backoff_ms: u64,
    pub poll_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            batch_size: SCAN_BATCH,
            pace_ms: 10,
            backoff_ms: 3000,
            poll_ms: 1000,
        }
    }
}

/// Status API settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Listen port; the API is off when unset
    #[serde(default)]
    pub port: Option<u16>,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub reference: ChainConfig,

    #[serde(default)]
    pub chains: Vec<ChainConfig>,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

impl BridgeConfig {
    /// Create a configuration with only the reference chain.
    pub fn new(reference: ChainConfig) -> Self {
        Self {
            reference,
            chains: Vec::new(),
            scanner: ScannerConfig::default(),
            api: ApiConfig::default(),
        }
    }

    /// Add a chain to scan.
    pub fn with_chain(mut self, chain: ChainConfig) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn with_scanner(mut self, scanner: ScannerConfig) -> Self {
        self.scanner = scanner;
        self
    }

    /// Serve the status API on `port`.
    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api.port = Some(port);
        self
    }

    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reference.validate()?;
        for chain in &self.chains {
            chain.validate()?;
            if chain.symbol.eq_ignore_ascii_case(&self.reference.symbol) {
                return Err(ConfigError::Invalid(format!(
                    "{} is the reference chain and cannot be scanned for withdrawals",
                    chain.symbol
                )));
            }
        }

        if self.scanner.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "Scanner batch size must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Scanner settings for `chain`
    pub fn scan_config(&self, chain: &ChainConfig) -> ScanConfig {
        let mut scan = ScanConfig::new(chain.symbol.clone())
            .with_short(chain.short)
            .with_start_height(chain.start_height)
            .with_batch_size(self.scanner.batch_size)
            .with_timing(
                Duration::from_millis(self.scanner.pace_ms),
                Duration::from_millis(self.scanner.backoff_ms),
                Duration::from_millis(self.scanner.poll_ms),
            );
        scan.reference_symbol = self.reference.symbol.clone();
        scan
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(ChainConfig::new(REFERENCE_SYMBOL, "http://127.0.0.1:7771"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [reference]
        symbol = "KMD"
        rpc_url = "http://127.0.0.1:7771"
        rpc_user = "user"
        rpc_password = "pass"

        [[chains]]
        symbol = "BTC"
        mode = "external"
        rpc_url = "http://127.0.0.1:8332"
        short = true
        start_height = 500

        [[chains]]
        symbol = "LTC"
        mode = "embedded_light"

        [scanner]
        batch_size = 50

        [api]
        port = 7780
    "#;

    #[test]
    fn test_parse_sample() {
        let config = BridgeConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.reference.rpc_user, Some("user".to_string()));
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.chains[0].mode, ChainMode::ExternalPassthrough);
        assert!(config.chains[0].short);
        assert_eq!(config.chains[1].mode, ChainMode::EmbeddedLight);
        assert_eq!(config.chains[1].start_height, 1);
        assert_eq!(config.scanner.batch_size, 50);
        assert_eq!(config.scanner.backoff_ms, 3000);
        assert_eq!(config.api.port, Some(7780));
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::default()
            .with_chain(
                ChainConfig::new("BTC", "http://localhost:8332")
                    .with_auth("user", "pass")
                    .with_short(true)
                    .with_start_height(10),
            )
            .with_api_port(9000);

        assert!(config.validate().is_ok());
        let scan = config.scan_config(&config.chains[0]);
        assert_eq!(scan.symbol, "BTC");
        assert!(scan.short_flag);
        assert_eq!(scan.start_height, 10);
        assert_eq!(scan.batch_size, SCAN_BATCH);
        assert_eq!(scan.pace, Duration::from_millis(10));

        let handle = config.chains[0].handle();
        assert_eq!(handle.endpoint.password, Some("pass".to_string()));
        assert_eq!(handle.mode, ChainMode::ExternalPassthrough);
    }

    #[test]
    fn test_validate_rejects() {
        let missing_url = BridgeConfig::default().with_chain(ChainConfig::new("BTC", ""));
        assert!(matches!(missing_url.validate(), Err(ConfigError::Invalid(_))));

        let light = BridgeConfig::default()
            .with_chain(ChainConfig::new("BTC", "").with_mode(ChainMode::EmbeddedLight));
        assert!(light.validate().is_ok());

        let bad_symbol = BridgeConfig::default().with_chain(ChainConfig::new("BEER", "http://x"));
        assert!(bad_symbol.validate().is_err());

        let reference = BridgeConfig::default().with_chain(ChainConfig::new("kmd", "http://x"));
        assert!(reference.validate().is_err());

        let zero_batch = BridgeConfig::default().with_scanner(ScannerConfig {
            batch_size: 0,
            ..ScannerConfig::default()
        });
        assert!(zero_batch.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            BridgeConfig::from_toml_str("reference = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
