//! Price threshold alerts. Strict comparison: a quote equal to the target
//! never fires.

use super::{invalid, keep_or_delete, Decision};
use crate::domain::alert::{AlertKind, PriceAlert};
use crate::domain::error::EngineError;
use crate::domain::snapshot::MarketSnapshot;

pub fn evaluate(alert: &PriceAlert, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
    if !alert.target.is_finite() {
        return Err(invalid(AlertKind::Price, alert.id, "target is not a finite number"));
    }
    let Some(price) = snapshot.quote(&alert.symbol) else {
        return Ok(Decision::no_quote(&alert.symbol));
    };
    if !alert.condition.holds(price, alert.target) {
        return Ok(Decision::Quiet);
    }
    Ok(Decision::fire(message(alert, price), keep_or_delete(alert.repeat)))
}

fn message(alert: &PriceAlert, price: f64) -> String {
    format!(
        "🔔 *Price Alert: {}*\nCurrent price: ${:.2} {} {}",
        alert.symbol, price, alert.condition, alert.target
    )
}
