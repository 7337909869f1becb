//! Combined price + indicator alerts. Both halves must hold in the same
//! snapshot; an indicator that is missing or not ready means no trigger.

use super::{invalid, keep_or_delete, Decision, SkipReason};
use crate::domain::alert::{AlertKind, IndicatorAlert};
use crate::domain::error::EngineError;
use crate::domain::indicator::Reading;
use crate::domain::snapshot::MarketSnapshot;

pub fn evaluate(alert: &IndicatorAlert, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
    if !alert.price_value.is_finite() {
        return Err(invalid(AlertKind::Indicator, alert.id, "price value is not finite"));
    }
    let Some(price) = snapshot.quote(&alert.symbol) else {
        return Ok(Decision::no_quote(&alert.symbol));
    };

    let field = alert.indicator.field();
    let reading = match snapshot.indicator(&alert.symbol, field, alert.timeframe) {
        None => return Ok(Decision::Skipped(SkipReason::IndicatorMissing)),
        Some(Reading::NotReady(why)) => {
            return Ok(Decision::Skipped(SkipReason::IndicatorNotReady(why)))
        }
        Some(Reading::Ready(v)) => v,
    };

    let price_ok = alert.price_condition.holds(price, alert.price_value);
    let indicator_ok = alert.indicator.holds(price, reading);
    if !(price_ok && indicator_ok) {
        return Ok(Decision::Quiet);
    }

    let message = format!(
        "🧠 *Custom Alert for {}*\nPrice: ${:.2} ({}{}) ✅\nIndicator: `{}` = {:.2} ({}) ✅",
        alert.symbol,
        price,
        alert.price_condition,
        alert.price_value,
        field,
        reading,
        alert.indicator,
    );
    Ok(Decision::fire(message, keep_or_delete(alert.repeat)))
}
