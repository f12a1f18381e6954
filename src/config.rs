//! Service configuration
//!
//! All configuration values with defaults matching the UN Comtrade
//! query shape for Japan imports by HS code.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // === Server ===
    /// Port for the HTTP API
    pub api_port: u16,

    // === Local dataset ===
    /// Path to the HS-code CSV dataset (descriptions + precomputed gains)
    pub dataset_path: String,
    /// HS6 code to select at startup, if any (bookmark restore)
    pub startup_hs6: Option<String>,

    // === Remote API ===
    /// Base URL of the Comtrade-style `get` endpoint
    pub api_endpoint: String,
    /// Reporter country code (392 = Japan)
    pub reporter: u32,
    /// Trade flow code (1 = imports to the reporter)
    pub flow: u32,
    /// Data frequency ("A" = annual)
    pub frequency: String,

    // === Loader ===
    /// Partner code for the home country fetched in the primary round (124 = Canada)
    pub home_partner: u32,
    /// Minimum share of World trade a partner needs to earn a full-history fetch
    pub share_threshold: Decimal,
    /// Number of partner codes per top-up request
    pub topup_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            api_port: 8000,

            // Local dataset
            dataset_path: "data/the-data.csv".to_string(),
            startup_hs6: None,

            // Remote API
            api_endpoint: "https://comtrade.un.org/api/get".to_string(),
            reporter: 392,
            flow: 1,
            frequency: "A".to_string(),

            // Loader
            home_partner: 124,
            share_threshold: dec!(0.05),
            topup_batch_size: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server
        if let Ok(v) = std::env::var("API_PORT") {
            if let Ok(p) = v.parse() {
                config.api_port = p;
            }
        }

        // Local dataset
        if let Ok(v) = std::env::var("DATASET_PATH") {
            config.dataset_path = v;
        }
        if let Ok(v) = std::env::var("HS6") {
            if !v.is_empty() {
                config.startup_hs6 = Some(v);
            }
        }

        // Remote API
        if let Ok(v) = std::env::var("TRADE_API_ENDPOINT") {
            config.api_endpoint = v;
        }

        // Loader
        if let Ok(v) = std::env::var("SHARE_THRESHOLD") {
            if let Ok(d) = v.parse() {
                config.share_threshold = d;
            }
        }
        if let Ok(v) = std::env::var("TOPUP_BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                config.topup_batch_size = n;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_source_pages() {
        let config = Config::default();
        assert_eq!(config.reporter, 392);
        assert_eq!(config.flow, 1);
        assert_eq!(config.home_partner, 124);
        assert_eq!(config.share_threshold, dec!(0.05));
        assert_eq!(config.topup_batch_size, 5);
    }
}
