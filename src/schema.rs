use std::collections::BTreeMap;
use std::ops::Index;

use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::error::UpdateFailed;

// ------------------------------------------------------------
// Quote field table
// ------------------------------------------------------------
//
// The closed set of per-symbol attributes the coordinator
// produces and consumers read.
//
// IMPORTANT:
// - Wire names must match the quote endpoint exactly
// - Unknown keys in the payload are ignored
// - Missing keys never fail a refresh, they default
//

/// How a field is read from the payload and what it defaults to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Read as `f64`, defaults to `0.0`.
    Numeric,

    /// Read as text, defaults to absent.
    Text,
}

macro_rules! quote_fields {
    ($( $variant:ident => $wire:literal : $kind:ident ),+ $(,)?) => {
        /// Known quote attributes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub enum QuoteField {
            $( #[serde(rename = $wire)] $variant, )+
        }

        impl QuoteField {
            /// Every field, in schema order.
            pub const ALL: &'static [QuoteField] = &[ $( QuoteField::$variant, )+ ];

            /// Key used in the JSON payload.
            pub fn wire_name(self) -> &'static str {
                match self {
                    $( QuoteField::$variant => $wire, )+
                }
            }

            pub fn kind(self) -> FieldKind {
                match self {
                    $( QuoteField::$variant => FieldKind::$kind, )+
                }
            }
        }
    };
}

quote_fields! {
    RegularMarketPrice => "regularMarketPrice": Numeric,
    RegularMarketChange => "regularMarketChange": Numeric,
    RegularMarketChangePercent => "regularMarketChangePercent": Numeric,
    RegularMarketPreviousClose => "regularMarketPreviousClose": Numeric,
    RegularMarketOpen => "regularMarketOpen": Numeric,
    RegularMarketDayHigh => "regularMarketDayHigh": Numeric,
    RegularMarketDayLow => "regularMarketDayLow": Numeric,
    RegularMarketVolume => "regularMarketVolume": Numeric,
    AverageDailyVolume3Month => "averageDailyVolume3Month": Numeric,
    AverageDailyVolume10Day => "averageDailyVolume10Day": Numeric,
    FiftyDayAverage => "fiftyDayAverage": Numeric,
    FiftyDayAverageChange => "fiftyDayAverageChange": Numeric,
    FiftyDayAverageChangePercent => "fiftyDayAverageChangePercent": Numeric,
    TwoHundredDayAverage => "twoHundredDayAverage": Numeric,
    TwoHundredDayAverageChange => "twoHundredDayAverageChange": Numeric,
    TwoHundredDayAverageChangePercent => "twoHundredDayAverageChangePercent": Numeric,
    FiftyTwoWeekLow => "fiftyTwoWeekLow": Numeric,
    FiftyTwoWeekHigh => "fiftyTwoWeekHigh": Numeric,
    PreMarketPrice => "preMarketPrice": Numeric,
    PreMarketChange => "preMarketChange": Numeric,
    PreMarketChangePercent => "preMarketChangePercent": Numeric,
    PostMarketPrice => "postMarketPrice": Numeric,
    PostMarketChange => "postMarketChange": Numeric,
    PostMarketChangePercent => "postMarketChangePercent": Numeric,
    TrailingAnnualDividendRate => "trailingAnnualDividendRate": Numeric,
    TrailingAnnualDividendYield => "trailingAnnualDividendYield": Numeric,
    Currency => "currency": Text,
    ShortName => "shortName": Text,
    LongName => "longName": Text,
    MarketState => "marketState": Text,
    QuoteType => "quoteType": Text,
    FinancialCurrency => "financialCurrency": Text,
    DividendDate => "dividendDate": Text,
}

/// A single extracted value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(Option<String>),
}

// ------------------------------------------------------------
// Quote record
// ------------------------------------------------------------
//
// One record per tracked symbol. Always holds an entry for
// every field in `QuoteField::ALL`.
//
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteRecord {
    values: BTreeMap<QuoteField, FieldValue>,
}

impl QuoteRecord {
    /// Builds a record from one element of the result list.
    ///
    /// Table driven: each known field is read with its kind's rule,
    /// every other key of `source` is ignored.
    pub fn from_json(source: &Value) -> Self {
        let values = QuoteField::ALL
            .iter()
            .map(|&field| {
                let raw = source.get(field.wire_name());
                let value = match field.kind() {
                    FieldKind::Numeric => FieldValue::Number(read_number(raw)),
                    FieldKind::Text => FieldValue::Text(read_text(raw)),
                };
                (field, value)
            })
            .collect();

        Self { values }
    }

    /// Numeric value of `field`, `None` if the field is not numeric.
    pub fn number(&self, field: QuoteField) -> Option<f64> {
        match self.values.get(&field)? {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    /// Text value of `field`, `None` if absent or not a text field.
    pub fn text(&self, field: QuoteField) -> Option<&str> {
        match self.values.get(&field)? {
            FieldValue::Text(s) => s.as_deref(),
            FieldValue::Number(_) => None,
        }
    }

    /// Market price, `0.0` when the source did not report one.
    pub fn price(&self) -> f64 {
        self.number(QuoteField::RegularMarketPrice).unwrap_or_default()
    }

    /// Dividend date as a UTC calendar date.
    ///
    /// The source reports epoch seconds, either as a number or as a
    /// numeric string. Anything else yields `None`.
    pub fn dividend_date(&self) -> Option<NaiveDate> {
        let secs = self.text(QuoteField::DividendDate)?.parse::<i64>().ok()?;
        DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.date_naive())
    }
}

impl Index<QuoteField> for QuoteRecord {
    type Output = FieldValue;

    fn index(&self, field: QuoteField) -> &FieldValue {
        &self.values[&field]
    }
}

fn read_number(raw: Option<&Value>) -> f64 {
    match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    }
}

fn read_text(raw: Option<&Value>) -> Option<String> {
    match raw {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

// ------------------------------------------------------------
// Snapshot
// ------------------------------------------------------------
//
// Result of one fully successful refresh. Never mutated after
// construction; the coordinator swaps it out wholesale.
//
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    records: BTreeMap<String, QuoteRecord>,
}

impl Snapshot {
    pub fn get(&self, symbol: &str) -> Option<&QuoteRecord> {
        self.records.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.records.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Index<&str> for Snapshot {
    type Output = QuoteRecord;

    fn index(&self, symbol: &str) -> &QuoteRecord {
        &self.records[symbol]
    }
}

/// Validates a quote payload and builds the snapshot it describes.
///
/// Expected wire shape:
///
/// ```text
/// {"quoteResponse": {"error": null, "result": [{"symbol": "...", ...}]}}
/// ```
///
/// ERROR HANDLING:
/// - Each structural violation maps to its own `UpdateFailed` variant
/// - Result elements without a `symbol` are skipped
///
pub fn parse_quote_response(payload: Option<&Value>) -> Result<Snapshot, UpdateFailed> {
    let payload = match payload {
        Some(Value::Null) | None => return Err(UpdateFailed::NoData),
        Some(v) => v,
    };

    let container = payload
        .get("quoteResponse")
        .ok_or(UpdateFailed::MissingContainer)?;

    match container.get("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(msg)) => return Err(UpdateFailed::Upstream(msg.clone())),
        Some(other) => return Err(UpdateFailed::Upstream(other.to_string())),
    }

    let result = match container.get("result") {
        None => return Err(UpdateFailed::MissingResult),
        Some(Value::Null) => return Err(UpdateFailed::NullResult),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(UpdateFailed::MalformedResult),
    };

    let mut records = BTreeMap::new();
    for item in result {
        let Some(symbol) = item.get("symbol").and_then(Value::as_str) else {
            debug!("Skipping result element without symbol: {}", item);
            continue;
        };

        let record = QuoteRecord::from_json(item);
        debug!("Updated {} to {}", symbol, record.price());
        records.insert(symbol.to_string(), record);
    }

    Ok(Snapshot { records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn baba_payload() -> Value {
        json!({
            "quoteResponse": {
                "error": null,
                "result": [{
                    "symbol": "BABA",
                    "regularMarketPrice": 232.73,
                    "regularMarketChange": -5.66,
                    "twoHundredDayAverageChangePercent": -0.1261
                }]
            }
        })
    }

    #[test]
    fn well_formed_payload_builds_snapshot() {
        let payload = baba_payload();
        let snapshot = parse_quote_response(Some(&payload)).unwrap();

        assert_eq!(snapshot.len(), 1);
        let baba = &snapshot["BABA"];
        assert_eq!(baba.number(QuoteField::RegularMarketPrice), Some(232.73));
        assert_eq!(baba.number(QuoteField::RegularMarketChange), Some(-5.66));
        assert_eq!(
            baba.number(QuoteField::TwoHundredDayAverageChangePercent),
            Some(-0.1261)
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let payload = baba_payload();
        let snapshot = parse_quote_response(Some(&payload)).unwrap();
        let baba = &snapshot["BABA"];

        for &field in QuoteField::ALL {
            match field.kind() {
                FieldKind::Numeric => assert!(baba.number(field).is_some()),
                FieldKind::Text => assert_eq!(baba.text(field), None),
            }
        }
        assert_eq!(baba.number(QuoteField::FiftyDayAverage), Some(0.0));
        assert_eq!(baba[QuoteField::Currency], FieldValue::Text(None));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let item = json!({"symbol": "X", "somethingNew": [1, 2], "currency": "USD"});
        let record = QuoteRecord::from_json(&item);
        assert_eq!(record.text(QuoteField::Currency), Some("USD"));
        assert_eq!(record.price(), 0.0);
    }

    #[test]
    fn numeric_strings_and_nulls() {
        let item = json!({"regularMarketPrice": "12.5", "regularMarketOpen": null});
        let record = QuoteRecord::from_json(&item);
        assert_eq!(record.price(), 12.5);
        assert_eq!(record.number(QuoteField::RegularMarketOpen), Some(0.0));
    }

    #[test]
    fn text_accessor_rejects_numeric_field() {
        let record = QuoteRecord::from_json(&json!({"regularMarketPrice": 1.0}));
        assert_eq!(record.text(QuoteField::RegularMarketPrice), None);
        assert_eq!(record.number(QuoteField::ShortName), None);
    }

    #[test]
    fn dividend_date_parsing() {
        let cases = [
            (json!(null), None),
            (json!(1642118400), NaiveDate::from_ymd_opt(2022, 1, 14)),
            (json!(1646870400), NaiveDate::from_ymd_opt(2022, 3, 10)),
            (json!("1646870400"), NaiveDate::from_ymd_opt(2022, 3, 10)),
            (json!("164687040 0"), None),
        ];

        for (raw, expected) in cases {
            let record = QuoteRecord::from_json(&json!({ "dividendDate": raw }));
            assert_eq!(record.dividend_date(), expected, "input {raw}");
        }
    }

    #[test]
    fn absent_payload_is_no_data() {
        assert!(matches!(parse_quote_response(None), Err(UpdateFailed::NoData)));
        assert!(matches!(
            parse_quote_response(Some(&Value::Null)),
            Err(UpdateFailed::NoData)
        ));
    }

    #[test]
    fn each_violation_has_its_own_diagnostic() {
        let missing_container = json!({"somethingElse": {}});
        let embedded_error = json!({"quoteResponse": {"error": "rate limited", "result": null}});
        let object_error = json!({"quoteResponse": {"error": {"code": "Bad"}, "result": []}});
        let missing_result = json!({"quoteResponse": {"error": null}});
        let null_result = json!({"quoteResponse": {"result": null}});
        let not_a_list = json!({"quoteResponse": {"result": {"symbol": "X"}}});

        assert!(matches!(
            parse_quote_response(Some(&missing_container)),
            Err(UpdateFailed::MissingContainer)
        ));
        match parse_quote_response(Some(&embedded_error)) {
            Err(UpdateFailed::Upstream(msg)) => assert_eq!(msg, "rate limited"),
            other => panic!("unexpected {other:?}"),
        }
        match parse_quote_response(Some(&object_error)) {
            Err(UpdateFailed::Upstream(msg)) => assert!(msg.contains("Bad")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_quote_response(Some(&missing_result)),
            Err(UpdateFailed::MissingResult)
        ));
        assert!(matches!(
            parse_quote_response(Some(&null_result)),
            Err(UpdateFailed::NullResult)
        ));
        assert!(matches!(
            parse_quote_response(Some(&not_a_list)),
            Err(UpdateFailed::MalformedResult)
        ));
    }

    #[test]
    fn elements_without_symbol_are_skipped() {
        let payload = json!({
            "quoteResponse": {"result": [{"regularMarketPrice": 1.0}, {"symbol": "A"}]}
        });
        let snapshot = parse_quote_response(Some(&payload)).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("A"));
    }

    #[test]
    fn identical_payloads_give_identical_snapshots() {
        let payload = baba_payload();
        let first = parse_quote_response(Some(&payload)).unwrap();
        let second = parse_quote_response(Some(&payload)).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
