use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::source::DEFAULT_ENDPOINT;
use crate::util;

/// Default scan interval: six hours.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Shortest scan interval accepted from configuration.
pub const MINIMUM_SCAN_INTERVAL: Duration = Duration::from_secs(30);

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json`.
//
// It defines:
// - Symbols to track from startup
// - Scan interval (or none, for on-demand only)
// - Endpoint and coordinator timings
// - Optional debug configuration
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Symbols tracked from startup
    pub symbols: Vec<SymbolEntry>,

    /// Seconds between timer-driven refreshes, or "none"
    #[serde(default)]
    pub scan_interval: Option<ScanIntervalSetting>,

    /// Default target currency for symbols that do not set one
    pub target_currency: Option<String>,

    /// Base URL, symbols are appended comma separated
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub timings: Timings,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

// ------------------------------------------------------------
// Symbol entries
// ------------------------------------------------------------
//
// Either a bare symbol ("AAPL") or an object carrying a
// per-symbol target currency.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum SymbolEntry {
    Plain(String),
    Detailed {
        symbol: String,
        target_currency: Option<String>,
    },
}

/// Normalized symbol definition handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDefinition {
    pub symbol: String,
    pub target_currency: Option<String>,
}

/// Raw scan interval value.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum ScanIntervalSetting {
    Seconds(u64),
    Keyword(String),
}

// ------------------------------------------------------------
// Coordinator timings
// ------------------------------------------------------------
//
// All delays are fixed; there is no exponential backoff.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timings {
    /// Upper bound for one fetch
    pub fetch_timeout_secs: u64,

    /// Wait before retrying a failed refresh
    pub failure_delay_secs: u64,

    /// Wait after a new symbol is added before refreshing
    pub warmup_delay_secs: u64,

    /// Window in which refresh requests collapse into one
    pub debounce_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 15,
            failure_delay_secs: 20,
            warmup_delay_secs: 5,
            debounce_ms: 1000,
        }
    }
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Lifts the default log filter to debug
    pub log: Option<bool>,
}

impl Config {
    /// Deduplicated, upper-cased symbol definitions.
    ///
    /// The first definition of a symbol wins. A symbol-level target
    /// currency overrides the global one.
    pub fn symbol_definitions(&self) -> Result<Vec<SymbolDefinition>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.symbols.len());

        for entry in &self.symbols {
            let (raw, target) = match entry {
                SymbolEntry::Plain(s) => (s.as_str(), None),
                SymbolEntry::Detailed { symbol, target_currency } => {
                    (symbol.as_str(), target_currency.as_deref())
                }
            };

            let Some(symbol) = util::normalize_symbol(raw) else {
                bail!("Empty symbol in configuration");
            };

            if !seen.insert(symbol.clone()) {
                continue;
            }

            let target_currency = target
                .or(self.target_currency.as_deref())
                .and_then(util::normalize_symbol);

            out.push(SymbolDefinition { symbol, target_currency });
        }

        if out.is_empty() {
            bail!("No symbols configured");
        }

        Ok(out)
    }

    /// Effective scan interval. `None` disables timer-driven refresh.
    ///
    /// Accepts seconds, `"HH:MM"` / `"HH:MM:SS"` strings or `"none"`.
    pub fn scan_interval(&self) -> Result<Option<Duration>> {
        let interval = match &self.scan_interval {
            None => return Ok(Some(DEFAULT_SCAN_INTERVAL)),
            Some(ScanIntervalSetting::Keyword(k)) if k.eq_ignore_ascii_case("none") => {
                return Ok(None);
            }
            Some(ScanIntervalSetting::Keyword(k)) => match parse_time_period(k) {
                Some(interval) => interval,
                None => bail!("Invalid scan_interval specified: {}", k),
            },
            Some(ScanIntervalSetting::Seconds(secs)) => Duration::from_secs(*secs),
        };

        if interval < MINIMUM_SCAN_INTERVAL {
            bail!("Scan interval should be at least 30 seconds.");
        }
        Ok(Some(interval))
    }

    pub fn debug_log(&self) -> bool {
        self.debug
            .as_ref()
            .is_some_and(|d| d.log.unwrap_or(false))
    }
}

/// Parses `"HH:MM"` or `"HH:MM:SS"`.
fn parse_time_period(value: &str) -> Option<Duration> {
    let parts = value
        .trim()
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    Some(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}

/// Reads and validates a JSON configuration file.
pub fn load_config(path: &str) -> Result<Config> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    parse_config(&data)
}

/// Parses configuration text and runs semantic validation.
pub fn parse_config(data: &str) -> Result<Config> {
    let cfg: Config = serde_json::from_str(data)?;
    cfg.symbol_definitions()?;
    cfg.scan_interval()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(r#"{"symbols": ["aapl"]}"#).unwrap();

        assert_eq!(cfg.scan_interval().unwrap(), Some(DEFAULT_SCAN_INTERVAL));
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(cfg.timings.fetch_timeout_secs, 15);
        assert_eq!(cfg.timings.failure_delay_secs, 20);
        assert_eq!(cfg.timings.warmup_delay_secs, 5);
        assert!(!cfg.debug_log());
    }

    #[test]
    fn symbols_are_normalized_and_deduplicated() {
        let cfg = parse_config(
            r#"{
                "symbols": ["baba", {"symbol": "BABA", "target_currency": "eur"},
                            {"symbol": "msft", "target_currency": "gbp"}, "AAPL"],
                "target_currency": "usd"
            }"#,
        )
        .unwrap();

        let defs = cfg.symbol_definitions().unwrap();
        assert_eq!(
            defs,
            vec![
                SymbolDefinition { symbol: "BABA".into(), target_currency: Some("USD".into()) },
                SymbolDefinition { symbol: "MSFT".into(), target_currency: Some("GBP".into()) },
                SymbolDefinition { symbol: "AAPL".into(), target_currency: Some("USD".into()) },
            ]
        );
    }

    #[test]
    fn scan_interval_none_keyword() {
        let cfg = parse_config(r#"{"symbols": ["X"], "scan_interval": "None"}"#).unwrap();
        assert_eq!(cfg.scan_interval().unwrap(), None);
    }

    #[test]
    fn scan_interval_validation() {
        assert!(parse_config(r#"{"symbols": ["X"], "scan_interval": 29}"#).is_err());
        assert!(parse_config(r#"{"symbols": ["X"], "scan_interval": "soon"}"#).is_err());

        let cfg = parse_config(r#"{"symbols": ["X"], "scan_interval": 30}"#).unwrap();
        assert_eq!(cfg.scan_interval().unwrap(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn scan_interval_accepts_clock_strings() {
        let cfg = parse_config(r#"{"symbols": ["X"], "scan_interval": "01:30:00"}"#).unwrap();
        assert_eq!(cfg.scan_interval().unwrap(), Some(Duration::from_secs(5400)));

        let cfg = parse_config(r#"{"symbols": ["X"], "scan_interval": "00:05"}"#).unwrap();
        assert_eq!(cfg.scan_interval().unwrap(), Some(Duration::from_secs(300)));

        // below the minimum
        assert!(parse_config(r#"{"symbols": ["X"], "scan_interval": "00:00:10"}"#).is_err());
        assert!(parse_config(r#"{"symbols": ["X"], "scan_interval": "00:75:00"}"#).is_err());
        assert!(parse_config(r#"{"symbols": ["X"], "scan_interval": "1:2:3:4"}"#).is_err());
    }

    #[test]
    fn empty_symbols_are_rejected() {
        assert!(parse_config(r#"{"symbols": []}"#).is_err());
        assert!(parse_config(r#"{"symbols": ["  "]}"#).is_err());
    }

    #[test]
    fn partial_timings_keep_other_defaults() {
        let cfg = parse_config(
            r#"{"symbols": ["X"], "timings": {"failure_delay_secs": 60}, "debug": {"log": true}}"#,
        )
        .unwrap();
        assert_eq!(cfg.timings.failure_delay_secs, 60);
        assert_eq!(cfg.timings.debounce_ms, 1000);
        assert!(cfg.debug_log());
    }
}
