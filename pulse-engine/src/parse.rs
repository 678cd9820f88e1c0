//! Raw-message parsing with the historical field aliases.
//!
//! The upstream extractors emitted several generations of payload shapes;
//! all of them remain accepted here. Numbers may arrive as JSON numbers or
//! numeric strings, timestamps in milliseconds or nanoseconds (normalized to
//! milliseconds), and book levels as `[price, size]` pairs or objects keyed
//! `price`/`size`, `price`/`quantity` or `p`/`v`.

use serde_json::Value;
use smol_str::SmolStr;

use pulse_indicators::event::{Bar, BookSide, BookSnapshot, BookUpdate, Level, Side, Trade};

use crate::engine::FlowFrame;
use crate::error::ParseError;

const TRADE_TS: &[&str] = &["ts", "t", "timestamp"];
const TRADE_PRICE: &[&str] = &["price", "p", "px", "last", "mp", "avg"];
const TRADE_SIZE: &[&str] = &["size", "qty", "q", "volume", "vol", "sz", "amount"];
const SYMBOL: &[&str] = &["symbol", "sym", "ticker", "S", "eventSymbol"];
const BOOK_TS: &[&str] = &["ts", "time", "eventTime"];

fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| value.get(name))
        .filter(|v| !v.is_null())
}

/// Numeric field that may arrive as a JSON number or a numeric string.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_f64(value: &Value, names: &[&str], tag: &'static str) -> Result<f64, ParseError> {
    let raw = field(value, names).ok_or(ParseError::MissingField(tag))?;
    let parsed = as_f64(raw).ok_or(ParseError::InvalidNumber(tag))?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(ParseError::InvalidNumber(tag))
    }
}

fn required_ts(value: &Value, names: &[&str]) -> Result<i64, ParseError> {
    let raw = field(value, names).ok_or(ParseError::MissingField("ts"))?;
    as_i64(raw)
        .map(normalize_ts_ms)
        .ok_or(ParseError::InvalidNumber("ts"))
}

fn required_symbol(value: &Value) -> Result<SmolStr, ParseError> {
    field(value, SYMBOL)
        .and_then(Value::as_str)
        .map(SmolStr::new)
        .ok_or(ParseError::MissingField("symbol"))
}

/// dxFeed-style feeds publish nanosecond timestamps; anything above 1e15 is
/// treated as nanoseconds and scaled down to milliseconds.
pub fn normalize_ts_ms(ts: i64) -> i64 {
    if ts > 1_000_000_000_000_000 {
        ts / 1_000_000
    } else {
        ts
    }
}

fn parse_side(value: &Value) -> Option<Side> {
    let raw = field(value, &["side", "s", "aggressor"])?.as_str()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "b" | "buy" | "bid" | "aggressor_buy" | "buyer" | "buyer_initiator" => Some(Side::Buy),
        "s" | "sell" | "ask" | "aggressor_sell" | "seller" | "seller_initiator" => Some(Side::Sell),
        _ => None,
    }
}

pub fn parse_trade(raw: &Value) -> Result<Trade, ParseError> {
    let ts = required_ts(raw, TRADE_TS)?;
    let price = required_f64(raw, TRADE_PRICE, "price")?;
    let size = required_f64(raw, TRADE_SIZE, "size")?;
    let symbol = required_symbol(raw)?;
    let exchange = field(raw, &["exchange", "exch", "X"])
        .and_then(Value::as_str)
        .map(SmolStr::new);

    Ok(Trade::new(ts, symbol, price, size, parse_side(raw), exchange))
}

pub fn parse_bar(raw: &Value) -> Result<Bar, ParseError> {
    let ts = required_ts(raw, &["ts"])?;
    let symbol = required_symbol(raw)?;
    let tf = field(raw, &["tf"])
        .and_then(Value::as_str)
        .map_or_else(|| SmolStr::new("-"), SmolStr::new);
    let open = required_f64(raw, &["open", "o"], "open")?;
    let high = required_f64(raw, &["high", "h"], "high")?;
    let low = required_f64(raw, &["low", "l"], "low")?;
    let close = required_f64(raw, &["close", "c"], "close")?;
    let volume = field(raw, &["volume", "v"])
        .and_then(as_f64)
        .unwrap_or(0.0);

    Ok(Bar::new(ts, symbol, tf, open, high, low, close, volume))
}

/// One level from any of the historical encodings; `None` for levels that do
/// not parse or have non-positive size.
fn parse_level(raw: &Value) -> Option<Level> {
    let (price, size) = match raw {
        Value::Object(_) => (
            field(raw, &["price", "p"]).and_then(as_f64)?,
            field(raw, &["size", "quantity", "v"]).and_then(as_f64)?,
        ),
        Value::Array(items) if items.len() >= 2 => {
            (as_f64(&items[0])?, as_f64(&items[1])?)
        }
        _ => return None,
    };
    (price.is_finite() && size.is_finite() && size > 0.0).then_some(Level::new(price, size))
}

fn parse_levels(raw: Option<&Value>) -> Option<Vec<Level>> {
    let array = raw?.as_array()?;
    Some(array.iter().filter_map(parse_level).collect())
}

/// Full book snapshot from any of the three historically-supported shapes:
/// level arrays (`bids`/`asks` or `bidLevels`/`askLevels`), single
/// top-of-book objects (`b1`/`a1`), or flat BBO scalars
/// (`bid`/`bidSize`/`ask`/`askSize`). A shape matching none of these is an
/// upstream contract break and surfaces as [`ParseError::UnknownBookShape`].
pub fn parse_book_snapshot(raw: &Value) -> Result<BookSnapshot, ParseError> {
    let symbol = required_symbol(raw)?;
    let ts = required_ts(raw, BOOK_TS)?;

    // shape 1: level arrays
    let bids = parse_levels(field(raw, &["bids", "bidLevels"]));
    let asks = parse_levels(field(raw, &["asks", "askLevels"]));
    if bids.is_some() || asks.is_some() {
        let mut bids = bids.unwrap_or_default();
        let mut asks = asks.unwrap_or_default();
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        return Ok(BookSnapshot::new(ts, symbol, bids, asks));
    }

    // shape 2: single top-of-book objects
    let b1 = field(raw, &["b1"]).and_then(parse_level);
    let a1 = field(raw, &["a1"]).and_then(parse_level);
    if b1.is_some() || a1.is_some() {
        return Ok(BookSnapshot::new(
            ts,
            symbol,
            b1.into_iter().collect(),
            a1.into_iter().collect(),
        ));
    }

    // shape 3: flat BBO scalars
    let bid = field(raw, &["bid"]).and_then(as_f64);
    let ask = field(raw, &["ask"]).and_then(as_f64);
    if bid.is_some() || ask.is_some() {
        let level = |price: Option<f64>, size_key: &[&str]| -> Vec<Level> {
            let Some(price) = price.filter(|p| p.is_finite()) else {
                return Vec::new();
            };
            let size = field(raw, size_key).and_then(as_f64).unwrap_or(0.0);
            if size > 0.0 {
                vec![Level::new(price, size)]
            } else {
                Vec::new()
            }
        };
        return Ok(BookSnapshot::new(
            ts,
            symbol,
            level(bid, &["bidSize", "bid_size"]),
            level(ask, &["askSize", "ask_size"]),
        ));
    }

    Err(ParseError::UnknownBookShape)
}

pub fn parse_book_update(raw: &Value) -> Result<BookUpdate, ParseError> {
    let symbol = required_symbol(raw)?;
    let ts = required_ts(raw, BOOK_TS)?;
    let side_raw = field(raw, &["side", "action"])
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField("side"))?;
    let side = match side_raw.trim().to_ascii_lowercase().as_str() {
        "bid" | "b" | "buy" => BookSide::Bid,
        "ask" | "a" | "sell" => BookSide::Ask,
        other => return Err(ParseError::InvalidSide(other.to_owned())),
    };
    let price = required_f64(raw, &["price", "p"], "price")?;
    // size 0 is a legitimate delete, so it is not validated positive
    let size_raw = field(raw, &["size", "quantity", "v"]).ok_or(ParseError::MissingField("size"))?;
    let size = as_f64(size_raw).ok_or(ParseError::InvalidNumber("size"))?;

    Ok(BookUpdate::new(ts, symbol, side, price, size))
}

/// True when a raw book message is a single-level update rather than a
/// snapshot.
pub fn is_book_update(raw: &Value) -> bool {
    field(raw, &["side", "action"]).is_some() && field(raw, &["price", "p"]).is_some()
}

/// Aggregated order-flow frame from an upstream window aggregator.
pub fn parse_flow_frame(raw: &Value) -> Result<FlowFrame, ParseError> {
    let symbol = required_symbol(raw)?;
    let ts = required_ts(raw, TRADE_TS)?;
    let buy = field(raw, &["buy"]).and_then(as_f64).unwrap_or(0.0);
    let sell = field(raw, &["sell"]).and_then(as_f64).unwrap_or(0.0);
    let delta = field(raw, &["delta"])
        .and_then(as_f64)
        .unwrap_or(buy - sell);
    let window_ms = field(raw, &["windowMs", "window_ms"])
        .and_then(as_i64)
        .unwrap_or(0);

    Ok(FlowFrame {
        ts,
        symbol,
        window_ms,
        buy,
        sell,
        delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trade_aliases_resolve() {
        let trade = parse_trade(&json!({
            "t": 1_700_000_000_000_i64,
            "px": "100.5",
            "qty": 3,
            "sym": "ES",
            "s": "SELL",
            "exch": "CME"
        }))
        .expect("parses");

        assert_eq!(trade.ts, 1_700_000_000_000);
        assert_eq!(trade.price, 100.5);
        assert_eq!(trade.size, 3.0);
        assert_eq!(trade.symbol, "ES");
        assert_eq!(trade.side, Some(Side::Sell));
        assert_eq!(trade.exchange.as_deref(), Some("CME"));
    }

    #[test]
    fn trade_without_price_is_an_error() {
        let err = parse_trade(&json!({"ts": 1, "size": 2, "symbol": "ES"}));
        assert_eq!(err, Err(ParseError::MissingField("price")));
    }

    #[test]
    fn unknown_side_string_is_ignored() {
        let trade = parse_trade(&json!({
            "ts": 1, "price": 100.0, "size": 1, "symbol": "ES", "side": "??"
        }))
        .expect("parses");
        assert_eq!(trade.side, None);
    }

    #[test]
    fn bar_short_aliases_and_defaults() {
        let bar = parse_bar(&json!({
            "ts": 60_000, "symbol": "ES",
            "o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5
        }))
        .expect("parses");
        assert_eq!(bar.tf, "-");
        assert_eq!(bar.volume, 0.0);
        assert_eq!(bar.high, 2.0);
    }

    #[test]
    fn book_l2_shape_with_object_levels() {
        let snap = parse_book_snapshot(&json!({
            "ts": 1_000,
            "symbol": "AAPL",
            "bids": [{"p": 149.9, "v": 10.0}, {"p": 149.8, "v": 5.0}],
            "asks": [{"p": 150.1, "v": 10.0}, {"p": 150.2, "v": 5.0}]
        }))
        .expect("parses");

        assert_eq!(snap.bids.len(), 2);
        assert_eq!(snap.bids[0], Level::new(149.9, 10.0));
        assert_eq!(snap.asks[0], Level::new(150.1, 10.0));
    }

    #[test]
    fn book_pair_levels_sort_best_first() {
        let snap = parse_book_snapshot(&json!({
            "eventSymbol": "ESZ5",
            "time": 1_726_500_000_000_000_000_i64,
            "bids": [[4999.25, 2], [4999.50, 5]],
            "asks": [[5000.25, 4], [5000.00, 3]]
        }))
        .expect("parses");

        // nanosecond timestamp normalized to milliseconds
        assert_eq!(snap.ts, 1_726_500_000_000);
        assert_eq!(snap.bids[0].price, 4999.50);
        assert_eq!(snap.asks[0].price, 5000.00);
    }

    #[test]
    fn book_frame_shape_with_b1_a1() {
        let snap = parse_book_snapshot(&json!({
            "type": "book_frame",
            "ts": 1_000,
            "symbol": "AAPL",
            "b1": {"p": 149.9, "v": 10.0},
            "a1": {"p": 150.1, "v": 10.0}
        }))
        .expect("parses");
        assert_eq!(snap.bids, vec![Level::new(149.9, 10.0)]);
        assert_eq!(snap.asks, vec![Level::new(150.1, 10.0)]);
    }

    #[test]
    fn bbo_frame_shape_with_flat_scalars() {
        let snap = parse_book_snapshot(&json!({
            "type": "bbo_frame",
            "ts": 1_000,
            "symbol": "AAPL",
            "bid": 149.9, "bidSize": 10.0,
            "ask": 150.1, "askSize": 10.0
        }))
        .expect("parses");
        assert_eq!(snap.bids, vec![Level::new(149.9, 10.0)]);
        assert_eq!(snap.asks, vec![Level::new(150.1, 10.0)]);
    }

    #[test]
    fn unknown_book_shape_is_a_contract_break() {
        let err = parse_book_snapshot(&json!({"ts": 1_000, "symbol": "AAPL"}));
        assert_eq!(err, Err(ParseError::UnknownBookShape));
    }

    #[test]
    fn book_update_parses_and_detects() {
        let raw = json!({
            "eventSymbol": "ESZ5",
            "side": "ask",
            "price": 5000.0,
            "size": 0,
            "time": 1_726_500_000_500_000_000_i64
        });
        assert!(is_book_update(&raw));
        let update = parse_book_update(&raw).expect("parses");
        assert_eq!(update.side, BookSide::Ask);
        assert_eq!(update.size, 0.0);
        assert_eq!(update.ts, 1_726_500_000_500);
    }

    #[test]
    fn flow_frame_derives_delta_when_absent() {
        let frame = parse_flow_frame(&json!({
            "symbol": "SPY", "ts": 1_760_123_113_372_i64,
            "windowMs": 5_000, "buy": 8_160.0, "sell": 9_648.0
        }))
        .expect("parses");
        assert_eq!(frame.delta, -1_488.0);
        assert_eq!(frame.window_ms, 5_000);
    }

    #[test]
    fn zero_size_levels_are_dropped() {
        let snap = parse_book_snapshot(&json!({
            "ts": 1_000, "symbol": "AAPL",
            "bids": [[100.0, 0.0], [99.0, 2.0]],
            "asks": []
        }))
        .expect("parses");
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.bids[0].price, 99.0);
    }
}
