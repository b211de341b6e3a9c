//! Decoding of raw feed frames into [`MarketSnapshot`]s.
//!
//! A frame maps market ids to field maps. Inside a field map, keys starting
//! with [`META_PREFIX`] carry market metadata and every other key is an
//! entity id whose value is a quote record. The backend cache wraps the
//! collection in an `ff_cache` object; a bare collection is accepted too.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::state::{EntityQuote, MarketSnapshot};

/// Marks market-level metadata keys.
pub const META_PREFIX: char = '_';

/// Key the backend nests the market collection under.
pub const COLLECTION_KEY: &str = "ff_cache";

/// Result of decoding one frame.
#[derive(Debug, Default)]
pub struct ParsedFrame {
    /// Successfully decoded markets, unordered.
    pub markets: Vec<MarketSnapshot>,
    /// Markets dropped from this frame, one error each.
    pub rejected: Vec<ParseError>,
}

impl ParsedFrame {
    /// Every market id the frame mentioned, decoded or not.
    pub fn seen_ids(&self) -> impl Iterator<Item = &str> {
        self.markets
            .iter()
            .map(|m| m.market_id.as_str())
            .chain(self.rejected.iter().filter_map(|e| e.market_id()))
    }
}

/// Decode a text frame.
pub fn parse_frame(text: &str) -> Result<ParsedFrame, ParseError> {
    let root: Value = serde_json::from_str(text)?;
    parse_value(root)
}

/// Decode a frame in place with simd-json. The buffer is clobbered.
pub fn parse_frame_bytes(bytes: &mut [u8]) -> Result<ParsedFrame, ParseError> {
    let root: Value = simd_json::serde::from_slice(bytes)?;
    parse_value(root)
}

pub fn parse_value(root: Value) -> Result<ParsedFrame, ParseError> {
    let Value::Object(mut root) = root else {
        return Err(ParseError::RootNotObject);
    };

    let collection = match root.remove(COLLECTION_KEY) {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ParseError::CollectionNotObject),
        None => root,
    };

    let mut frame = ParsedFrame::default();
    for (market_id, fields) in collection {
        match parse_market(market_id, fields) {
            Ok(market) => frame.markets.push(market),
            Err(e) => frame.rejected.push(e),
        }
    }
    Ok(frame)
}

fn parse_market(market_id: String, fields: Value) -> Result<MarketSnapshot, ParseError> {
    let Value::Object(fields) = fields else {
        return Err(ParseError::MarketNotObject { market_id });
    };

    let mut market = MarketSnapshot::new(market_id);
    for (key, value) in fields {
        if key.starts_with(META_PREFIX) {
            apply_metadata(&mut market, &key, value)?;
            continue;
        }

        let record: QuoteRecord =
            serde_json::from_value(value).map_err(|source| ParseError::Quote {
                market_id: market.market_id.clone(),
                entity_id: key.clone(),
                source,
            })?;
        market.entities.push(record.into_quote(key));
    }

    market.sort_entities();
    Ok(market)
}

fn apply_metadata(market: &mut MarketSnapshot, key: &str, value: Value) -> Result<(), ParseError> {
    let id = market.market_id.as_str();
    match key {
        "_seconds_to_start" | "_secondsToStart" => {
            market.seconds_to_start = number(id, key, value)?
        }
        "_back_overrun" | "_overrunBack" => market.overrun_back = number(id, key, value)?,
        "_lay_overrun" | "_overrunLay" => market.overrun_lay = number(id, key, value)?,
        "_last_overrun" | "_overrunLast" => market.overrun_last = number(id, key, value)?,
        "_race_title" | "_title" => market.title = string(id, key, value)?,
        "_race_start_time" | "_startTime" => market.start_time = string(id, key, value)?,
        "_orders" => {
            market.orders = match value {
                Value::Array(orders) => orders,
                _ => Vec::new(),
            }
        }
        "_strategy_status" | "_strategyStatus" => {
            market.strategy_status = Some(value).filter(|v| !v.is_null())
        }
        _ => {}
    }
    Ok(())
}

fn number(market_id: &str, key: &str, value: Value) -> Result<Option<f64>, ParseError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        other => Err(bad_metadata(market_id, key, "a number", &other)),
    }
}

fn string(market_id: &str, key: &str, value: Value) -> Result<Option<String>, ParseError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(bad_metadata(market_id, key, "a string", &other)),
    }
}

fn bad_metadata(market_id: &str, key: &str, expected: &str, got: &Value) -> ParseError {
    ParseError::Metadata {
        market_id: market_id.to_string(),
        key: key.to_string(),
        reason: format!("expected {}, got {}", expected, got),
    }
}

// Wire shape of one entity. Both the backend's snake_case keys and the
// camelCase spelling are accepted.
#[derive(Deserialize, Debug)]
struct QuoteRecord {
    #[serde(default)]
    back: Option<f64>,
    #[serde(default)]
    lay: Option<f64>,
    #[serde(default)]
    last: Option<f64>,
    #[serde(default, rename = "_back_moving_avg", alias = "backMovingAvg")]
    back_moving_avg: Option<f64>,
    #[serde(default, rename = "_lay_moving_avg", alias = "layMovingAvg")]
    lay_moving_avg: Option<f64>,
    #[serde(default, rename = "_last_moving_avg", alias = "lastMovingAvg")]
    last_moving_avg: Option<f64>,
    #[serde(default, rename = "_back_min", alias = "backMin")]
    back_min: Option<f64>,
    #[serde(default, rename = "_back_max", alias = "backMax")]
    back_max: Option<f64>,
    #[serde(default, rename = "_lay_min", alias = "layMin")]
    lay_min: Option<f64>,
    #[serde(default, rename = "_lay_max", alias = "layMax")]
    lay_max: Option<f64>,
    #[serde(default, rename = "_last_min", alias = "lastMin")]
    last_min: Option<f64>,
    #[serde(default, rename = "_last_max", alias = "lastMax")]
    last_max: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default, rename = "_runner_name", alias = "runnerName")]
    runner_name: Option<String>,
    #[serde(
        default,
        rename = "_horse_info",
        alias = "infoTable",
        deserialize_with = "info_table"
    )]
    info_table: BTreeMap<String, String>,
    #[serde(default, rename = "_strategy_status", alias = "strategyStatus")]
    strategy_status: Option<Value>,
}

impl QuoteRecord {
    fn into_quote(self, entity_id: String) -> EntityQuote {
        EntityQuote {
            entity_id,
            back: self.back,
            lay: self.lay,
            last: self.last,
            back_moving_avg: self.back_moving_avg,
            lay_moving_avg: self.lay_moving_avg,
            last_moving_avg: self.last_moving_avg,
            back_min: self.back_min,
            back_max: self.back_max,
            lay_min: self.lay_min,
            lay_max: self.lay_max,
            last_min: self.last_min,
            last_max: self.last_max,
            volume: self.volume,
            display_name: self.runner_name,
            info_table: self.info_table,
            strategy_status: self.strategy_status,
        }
    }
}

/// Scraped attributes are mostly strings but occasionally numbers; keep them
/// all as display strings. Null entries and a null table are dropped.
fn info_table<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Map<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_frame() {
        let frame = parse_frame(
            r#"{"race1": {"_secondsToStart": 120, "_overrunBack": 0.9, "_overrunLay": 1.05,
                "h1": {"back":0.5,"lay":0.45,"last":0.48}}}"#,
        )
        .unwrap();

        assert!(frame.rejected.is_empty());
        assert_eq!(frame.markets.len(), 1);

        let market = &frame.markets[0];
        assert_eq!(market.market_id, "race1");
        assert_eq!(market.seconds_to_start, Some(120.0));
        assert_eq!(market.overrun_back, Some(0.9));
        assert_eq!(market.overrun_lay, Some(1.05));
        assert_eq!(market.overrun_last, None);
        assert_eq!(market.entities.len(), 1);

        let h1 = &market.entities[0];
        assert_eq!(h1.entity_id, "h1");
        assert_eq!(h1.back, Some(0.5));
        assert_eq!(h1.lay, Some(0.45));
        assert_eq!(h1.last, Some(0.48));
    }

    #[test]
    fn test_parse_backend_wrapped_frame() {
        let frame = parse_frame(
            r#"{"ff_cache": {"1.2001": {
                "_seconds_to_start": 95.5,
                "_back_overrun": 1.02,
                "_lay_overrun": 0.98,
                "_last_overrun": 1.0,
                "_race_title": "R3 Flemington 1200m",
                "_race_start_time": "2024-03-02T04:35:00+00:00",
                "_orders": [{"bet_id": "1", "size": 2}],
                "_strategy_status": {"123": "armed"},
                "123": {"back": 0.25, "lay": 0.24, "last": 0.245,
                        "_back_moving_avg": 0.251, "_last_min": 0.2, "_last_max": 0.3,
                        "_runner_name": "Fast Horse",
                        "_horse_info": {"Bar": "4", "Rtg": 72, "Wgt": null},
                        "_strategy_status": {"lay_the_fav": false}}
            }}}"#,
        )
        .unwrap();

        let market = &frame.markets[0];
        assert_eq!(market.title.as_deref(), Some("R3 Flemington 1200m"));
        assert_eq!(market.start_time.as_deref(), Some("2024-03-02T04:35:00+00:00"));
        assert_eq!(market.seconds_to_start, Some(95.5));
        assert_eq!(market.overrun_last, Some(1.0));
        assert_eq!(market.orders.len(), 1);
        assert!(market.strategy_status.is_some());

        let runner = &market.entities[0];
        assert_eq!(runner.display_name.as_deref(), Some("Fast Horse"));
        assert_eq!(runner.back_moving_avg, Some(0.251));
        assert_eq!(runner.lay_moving_avg, None);
        assert_eq!(runner.last_min, Some(0.2));
        assert_eq!(runner.last_max, Some(0.3));
        assert_eq!(runner.info_table.get("Bar").map(String::as_str), Some("4"));
        assert_eq!(runner.info_table.get("Rtg").map(String::as_str), Some("72"));
        assert!(!runner.info_table.contains_key("Wgt"));
        assert_eq!(
            runner.strategy_status,
            Some(serde_json::json!({"lay_the_fav": false}))
        );
    }

    #[test]
    fn test_prefixed_keys_never_become_entities() {
        let frame = parse_frame(
            r#"{"m": {"_seconds_to_start": 10, "_unknown_meta": {"x": 1},
                "_another": 5, "a": {"last": 0.3}, "b": {"last": 0.6}}}"#,
        )
        .unwrap();

        for market in &frame.markets {
            for entity in &market.entities {
                assert!(!entity.entity_id.starts_with(META_PREFIX));
            }
        }
        assert_eq!(frame.markets[0].entities.len(), 2);
    }

    #[test]
    fn test_entities_sorted_favourite_first() {
        let frame = parse_frame(
            r#"{"m": {"a": {"last": 0.1}, "b": {"last": null}, "c": {"last": 0.6},
                "d": {"last": 0}, "e": {"last": 0.3}}}"#,
        )
        .unwrap();

        let ids: Vec<_> = frame.markets[0]
            .entities
            .iter()
            .map(|e| e.entity_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "e", "a", "b", "d"]);
    }

    #[test]
    fn test_market_without_metadata() {
        let frame = parse_frame(r#"{"m": {"a": {"back": 0.5}}}"#).unwrap();
        let market = &frame.markets[0];

        assert_eq!(market.title, None);
        assert_eq!(market.seconds_to_start, None);
        assert_eq!(market.overrun_back, None);
        assert_eq!(market.overrun_lay, None);
        assert!(market.orders.is_empty());
        assert!(market.strategy_status.is_none());
        assert!(market.entities[0].info_table.is_empty());
    }

    #[test]
    fn test_null_optionals_default() {
        let frame = parse_frame(
            r#"{"m": {"_orders": null, "_strategy_status": null,
                "a": {"back": null, "_horse_info": null}}}"#,
        )
        .unwrap();
        let market = &frame.markets[0];

        assert!(market.orders.is_empty());
        assert!(market.strategy_status.is_none());
        assert!(market.entities[0].info_table.is_empty());
        assert_eq!(market.entities[0].back, None);
    }

    #[test]
    fn test_bad_market_is_isolated() {
        let frame = parse_frame(
            r#"{"good": {"_seconds_to_start": 60, "a": {"last": 0.5}},
                "bad_quote": {"a": {"last": "evens"}},
                "bad_meta": {"_seconds_to_start": "soon"},
                "not_object": 7}"#,
        )
        .unwrap();

        assert_eq!(frame.markets.len(), 1);
        assert_eq!(frame.markets[0].market_id, "good");
        assert_eq!(frame.rejected.len(), 3);

        let mut seen: Vec<_> = frame.seen_ids().collect();
        seen.sort();
        assert_eq!(seen, vec!["bad_meta", "bad_quote", "good", "not_object"]);
    }

    #[test]
    fn test_frame_level_errors() {
        assert!(matches!(parse_frame("not json"), Err(ParseError::Json(_))));
        assert!(matches!(parse_frame("[1, 2]"), Err(ParseError::RootNotObject)));
        assert!(matches!(
            parse_frame(r#"{"ff_cache": []}"#),
            Err(ParseError::CollectionNotObject)
        ));
    }

    #[test]
    fn test_empty_collection() {
        let frame = parse_frame(r#"{"ff_cache": {}}"#).unwrap();
        assert!(frame.markets.is_empty());
        assert!(frame.rejected.is_empty());
    }

    #[test]
    fn test_simd_path_matches() {
        let text = r#"{"ff_cache": {"m": {"_seconds_to_start": 30, "h": {"back": 0.25}}}}"#;
        let mut bytes = text.as_bytes().to_vec();

        let frame = parse_frame_bytes(&mut bytes).unwrap();
        assert_eq!(frame.markets.len(), 1);
        assert_eq!(frame.markets[0].seconds_to_start, Some(30.0));
        assert_eq!(frame.markets[0].entities[0].back, Some(0.25));
    }
}
