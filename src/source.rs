use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use reqwest::Url;
use serde_json::Value;

use crate::util;

/// Default quote endpoint. The comma joined symbol list goes into the
/// `symbols` query parameter.
pub const DEFAULT_ENDPOINT: &str = "https://query1.finance.yahoo.com/v7/finance/quote?symbols=";

/// QuoteSource is the seam between the update coordinator and
/// the network.
///
/// Implementations must:
/// - Perform exactly one request per call
/// - Return the parsed JSON document, or `None` for an empty body
/// - Surface transport problems as errors
///
/// MUST NOT:
/// - Retry internally (retry policy belongs to the coordinator)
/// - Validate the payload shape
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - One instance is shared by the coordinator and its timer tasks
///
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    /// Human readable source name, used in logs.
    fn name(&self) -> &'static str;

    /// Fetches quotes for `symbols`, in the given order.
    async fn fetch(&self, symbols: &[String]) -> Result<Option<Value>>;
}

/// HTTP quote source backed by a pooled `reqwest::Client`.
pub struct YahooQuoteSource {
    client: reqwest::Client,
    endpoint: Url,
}

impl YahooQuoteSource {
    /// Creates a source that hits `endpoint`.
    ///
    /// `timeout` is applied at the client level too, so an abandoned
    /// request does not keep a pooled connection busy.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quote-coordinator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: base_url(endpoint)?,
        })
    }

    fn url_for(&self, symbols: &[String]) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("symbols", &util::join_symbols(symbols));
        url
    }
}

/// Parses `endpoint` and drops any `symbols` parameter it already
/// carries. Other query parameters are kept.
fn base_url(endpoint: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint).with_context(|| format!("invalid endpoint {endpoint}"))?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "symbols")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.set_query(None);
    if !kept.is_empty() {
        url.query_pairs_mut().extend_pairs(kept);
    }
    Ok(url)
}

#[async_trait::async_trait]
impl QuoteSource for YahooQuoteSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch(&self, symbols: &[String]) -> Result<Option<Value>> {
        let url = self.url_for(symbols);
        let response = self.client.get(url.as_str()).send().await?;

        // Error statuses still carry a quoteResponse body with the
        // upstream error, so the body is parsed regardless.
        debug!("GET {} -> {}", url, response.status());

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let json: Value = serde_json::from_str(&body)?;
        debug!("Data = {}", json);
        Ok(Some(json))
    }
}
