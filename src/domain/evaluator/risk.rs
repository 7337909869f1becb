//! Stop-loss / take-profit alerts. Either bound is enough; strictly between
//! the two never fires.

use super::{invalid, keep_or_delete, Decision};
use crate::domain::alert::{AlertKind, RiskAlert};
use crate::domain::error::EngineError;
use crate::domain::snapshot::MarketSnapshot;

pub fn evaluate(alert: &RiskAlert, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
    if !(alert.stop_price.is_finite() && alert.take_price.is_finite()) {
        return Err(invalid(AlertKind::Risk, alert.id, "bounds must be finite"));
    }
    if alert.stop_price >= alert.take_price {
        return Err(invalid(
            AlertKind::Risk,
            alert.id,
            format!("stop {} is not below take {}", alert.stop_price, alert.take_price),
        ));
    }
    let Some(price) = snapshot.quote(&alert.symbol) else {
        return Ok(Decision::no_quote(&alert.symbol));
    };
    if price > alert.stop_price && price < alert.take_price {
        return Ok(Decision::Quiet);
    }

    let message = format!(
        "🛡 *Risk Alert for {}*\nPrice hit ${:.2}.\nSL: {}, TP: {}",
        alert.symbol, price, alert.stop_price, alert.take_price
    );
    Ok(Decision::fire(message, keep_or_delete(alert.repeat)))
}
