//! Percent-move alerts: fires when the absolute deviation from the base price
//! reaches the threshold. A repeating alert moves its base to the triggering
//! quote.

use super::{invalid, percent_change, Decision, Effect};
use crate::domain::alert::{AlertKind, PercentAlert};
use crate::domain::error::EngineError;
use crate::domain::snapshot::MarketSnapshot;

pub fn evaluate(alert: &PercentAlert, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
    if !(alert.base_price.is_finite() && alert.base_price > 0.0) {
        return Err(invalid(AlertKind::Percent, alert.id, "base price must be positive"));
    }
    if !(alert.threshold_pct.is_finite() && alert.threshold_pct > 0.0) {
        return Err(invalid(AlertKind::Percent, alert.id, "threshold must be positive"));
    }
    let Some(price) = snapshot.quote(&alert.symbol) else {
        return Ok(Decision::no_quote(&alert.symbol));
    };

    let change = percent_change(price, alert.base_price);
    if change < alert.threshold_pct {
        return Ok(Decision::Quiet);
    }

    let effect = if alert.repeat {
        Effect::ResetBaseline { new_base: price }
    } else {
        Effect::Delete
    };
    let message = format!(
        "📉 *% Alert for {}*\nChange: {:.2}% from ${:.2}\nNow: ${:.2}",
        alert.symbol, change, alert.base_price, price
    );
    Ok(Decision::fire(message, effect))
}
