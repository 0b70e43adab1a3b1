/// Utility helpers shared by the coordinator, the config loader
/// and the consumer.
///
/// This module contains:
/// - Symbol normalization helpers
/// - Request target construction
/// - Time helpers
///
/// IMPORTANT:
/// - No network or scheduling logic should live here.
/// - This module must remain lightweight and deterministic.
///

use std::time::{SystemTime, UNIX_EPOCH};

/// Normalize a symbol into its canonical tracked form.
///
/// Canonical form is trimmed and upper case, so `" baba "` and `"BABA"`
/// are the same symbol.
///
/// Examples:
/// - "aapl"      -> "AAPL"
/// - "eurusd=x"  -> "EURUSD=X"
/// - " ^gspc "   -> "^GSPC"
///
/// Returns `None` for an empty or whitespace-only identifier.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_uppercase())
}

/// Join tracked symbols into the request target.
///
/// The quote endpoint takes a single comma separated list, in the same
/// order the symbols were first tracked.
pub fn join_symbols(symbols: &[String]) -> String {
    symbols.join(",")
}

/// Builds the FX pair symbol used to convert `currency` into `target`.
///
/// Examples:
/// - ("USD", "EUR") -> "USDEUR=X"
/// - ("gbp", "usd") -> "GBPUSD=X"
pub fn fx_symbol(currency: &str, target: &str) -> String {
    format!("{}{}=X", currency.to_uppercase(), target.to_uppercase())
}

/// Returns the current Unix timestamp in milliseconds.
///
/// Used for metrics reporting and log correlation.
///
/// PANIC:
/// - Panics if system time is before UNIX_EPOCH (should never happen).
///
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System time is before UNIX_EPOCH")
        .as_millis() as i64
}
