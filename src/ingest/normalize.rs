//! Normalization boundary: the one place that understands the exchange's
//! raw JSON field names. Everything past this point only ever sees a typed
//! `ActivityEvent`.
//!
//! The exchange reports the same logical field under several aliases
//! (`size`/`shares`/`amount`, `slug`/`eventSlug`); `serde(alias = ...)` on
//! `RawActivity` plus one explicit fallback for the two slug fields collapse
//! that onto one canonical name instead of repeating the fallback chain by
//! hand at every call site.

use crate::clients::clob::RawActivity;
use crate::models::{ActivityEvent, ActivityType, Outcome, Side, SkipReason, TargetWallet};

/// `timestamp` fields under this are assumed to be Unix seconds, not ms.
const SECONDS_THRESHOLD: i64 = 1_000_000_000_000;

pub fn normalize(raw: &RawActivity) -> Result<ActivityEvent, SkipReason> {
    let activity_type = parse_activity_type(&raw.activity_type).ok_or(SkipReason::ParseError)?;

    if !raw.price.is_finite() || !raw.size.is_finite() || raw.size < 0.0 {
        return Err(SkipReason::ParseError);
    }
    let outcome = parse_outcome(&raw.outcome).ok_or(SkipReason::ParseError)?;

    let trade_side = raw.side.as_deref().and_then(parse_side);
    let side = activity_type.replication_side(trade_side);

    let market_slug = raw
        .slug
        .clone()
        .or_else(|| raw.event_slug.clone())
        .unwrap_or_default();

    let timestamp_ms = if raw.timestamp < SECONDS_THRESHOLD {
        raw.timestamp * 1000
    } else {
        raw.timestamp
    };

    let trade_id = format!("{}:{}:{}:{}", raw.transaction_hash, raw.asset, side, raw.size);

    // SPLIT has no real market price behind it; floor it so sizing never
    // derives a position from a near-zero price.
    let price = if activity_type == ActivityType::Split {
        raw.price.max(0.5)
    } else {
        raw.price
    };

    Ok(ActivityEvent {
        target_wallet: TargetWallet::new(&raw.proxy_wallet),
        trade_id,
        timestamp_ms,
        token_id: raw.asset.clone(),
        condition_id: raw.condition_id.clone(),
        market_slug,
        outcome,
        side,
        price,
        size_shares: raw.size,
        activity_type,
    })
}

fn parse_activity_type(s: &str) -> Option<ActivityType> {
    match s.to_uppercase().as_str() {
        "TRADE" => Some(ActivityType::Trade),
        "SPLIT" => Some(ActivityType::Split),
        "MERGE" => Some(ActivityType::Merge),
        "REDEEM" => Some(ActivityType::Redeem),
        // REWARD / CONVERSION / MAKER_REBATE and anything unrecognized are
        // filtered upstream of C1, per the ActivityEvent invariant.
        _ => None,
    }
}

fn parse_outcome(s: &str) -> Option<Outcome> {
    match s.to_uppercase().as_str() {
        "YES" => Some(Outcome::Yes),
        "NO" => Some(Outcome::No),
        _ => None,
    }
}

fn parse_side(s: &str) -> Option<Side> {
    match s.to_uppercase().as_str() {
        "BUY" => Some(Side::Buy),
        "SELL" => Some(Side::Sell),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(activity_type: &str, side: Option<&str>) -> RawActivity {
        RawActivity {
            proxy_wallet: "0xABC".to_string(),
            transaction_hash: "0xdeadbeef".to_string(),
            asset: "tok-1".to_string(),
            condition_id: "cond-1".to_string(),
            slug: Some("will-it-rain".to_string()),
            event_slug: None,
            outcome: "Yes".to_string(),
            outcome_index: Some(0),
            side: side.map(str::to_string),
            price: 0.42,
            size: 10.0,
            timestamp: 1_700_000_000,
            activity_type: activity_type.to_string(),
        }
    }

    #[test]
    fn trade_with_buy_side_normalizes_to_buy() {
        let event = normalize(&raw("TRADE", Some("BUY"))).unwrap();
        assert_eq!(event.side, Side::Buy);
        assert_eq!(event.target_wallet, TargetWallet::new("0xabc"));
        assert_eq!(event.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn split_always_maps_to_buy_regardless_of_side_field() {
        let event = normalize(&raw("SPLIT", Some("SELL"))).unwrap();
        assert_eq!(event.side, Side::Buy);
    }

    #[test]
    fn split_price_is_floored_at_half_dollar() {
        let mut r = raw("SPLIT", None);
        r.price = 0.1;
        let event = normalize(&r).unwrap();
        assert_eq!(event.price, 0.5);
    }

    #[test]
    fn split_price_above_floor_is_unaffected() {
        let mut r = raw("SPLIT", None);
        r.price = 0.8;
        let event = normalize(&r).unwrap();
        assert_eq!(event.price, 0.8);
    }

    #[test]
    fn trade_price_is_never_floored() {
        let mut r = raw("TRADE", Some("BUY"));
        r.price = 0.1;
        let event = normalize(&r).unwrap();
        assert_eq!(event.price, 0.1);
    }

    #[test]
    fn merge_and_redeem_map_to_sell() {
        assert_eq!(normalize(&raw("MERGE", None)).unwrap().side, Side::Sell);
        assert_eq!(normalize(&raw("REDEEM", None)).unwrap().side, Side::Sell);
    }

    #[test]
    fn reward_type_is_filtered_with_parse_error() {
        assert_eq!(normalize(&raw("REWARD", None)), Err(SkipReason::ParseError));
    }

    #[test]
    fn non_finite_price_is_rejected() {
        let mut r = raw("TRADE", Some("BUY"));
        r.price = f64::NAN;
        assert_eq!(normalize(&r), Err(SkipReason::ParseError));
    }
}
