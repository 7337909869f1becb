//! Watchlist deviation alerts. Same trigger as a percent alert, but the
//! baseline always moves to the triggering quote; there is no one-shot form.
//! Entries without a positive threshold are passive and never fire.

use super::{invalid, percent_change, Decision, Effect};
use crate::domain::alert::{AlertKind, WatchlistEntry};
use crate::domain::error::EngineError;
use crate::domain::snapshot::MarketSnapshot;

pub fn evaluate(entry: &WatchlistEntry, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
    if !(entry.threshold_pct.is_finite() && entry.threshold_pct > 0.0) {
        return Ok(Decision::Quiet);
    }
    if !(entry.base_price.is_finite() && entry.base_price > 0.0) {
        return Err(invalid(AlertKind::Watchlist, entry.id, "base price must be positive"));
    }
    let Some(price) = snapshot.quote(&entry.symbol) else {
        return Ok(Decision::no_quote(&entry.symbol));
    };

    let change = percent_change(price, entry.base_price);
    if change < entry.threshold_pct {
        return Ok(Decision::Quiet);
    }

    let message = format!(
        "📡 *Watchlist Alert for {}*\nPrice moved ±{:.1}% from ${:.2}.\nTimeframe: `{}`\nCurrent: ${:.2} ({:.2}% change)",
        entry.symbol, entry.threshold_pct, entry.base_price, entry.timeframe, price, change
    );
    Ok(Decision::fire(message, Effect::ResetBaseline { new_base: price }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::Timeframe;

    fn entry(base: f64, threshold: f64) -> WatchlistEntry {
        WatchlistEntry {
            id: 13,
            owner: 5,
            symbol: "ADA".into(),
            base_price: base,
            threshold_pct: threshold,
            timeframe: Timeframe::H4,
        }
    }

    fn snap(price: f64) -> MarketSnapshot {
        let mut s = MarketSnapshot::new();
        s.insert_quote("ADA", price);
        s
    }

    #[test]
    fn always_resets_baseline() {
        let Decision::Fired(t) = evaluate(&entry(1.0, 10.0), &snap(0.85)).unwrap() else {
            panic!("expected fire")
        };
        assert_eq!(t[0].effect, Effect::ResetBaseline { new_base: 0.85 });
        assert!(t[0].message.contains("Timeframe: `4h`"));
        assert!(t[0].message.contains("(15.00% change)"));
    }

    #[test]
    fn below_threshold_is_quiet() {
        assert_eq!(evaluate(&entry(1.0, 10.0), &snap(1.05)).unwrap(), Decision::Quiet);
    }

    #[test]
    fn passive_entry_never_fires() {
        assert_eq!(evaluate(&entry(1.0, 0.0), &snap(5.0)).unwrap(), Decision::Quiet);
    }

    #[test]
    fn zero_base_is_invalid() {
        assert!(evaluate(&entry(0.0, 5.0), &snap(1.0)).is_err());
    }
}
