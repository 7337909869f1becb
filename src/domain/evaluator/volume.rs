//! Volume spike alerts: current candle volume against a multiple of the
//! trailing average. A zero or missing average is a skip, not a trigger, and
//! so is a symbol whose quote is unavailable this cycle.

use super::{invalid, keep_or_delete, Decision, SkipReason};
use crate::domain::alert::{AlertKind, VolumeAlert};
use crate::domain::error::EngineError;
use crate::domain::snapshot::MarketSnapshot;

pub fn evaluate(alert: &VolumeAlert, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
    if !(alert.multiplier.is_finite() && alert.multiplier > 0.0) {
        return Err(invalid(AlertKind::Volume, alert.id, "multiplier must be positive"));
    }
    if snapshot.quote(&alert.symbol).is_none() {
        return Ok(Decision::no_quote(&alert.symbol));
    }
    let Some(window) = snapshot.volume(&alert.symbol, alert.timeframe) else {
        return Ok(Decision::Skipped(SkipReason::NoVolumeWindow));
    };
    if !(window.average.is_finite() && window.average > 0.0) || !window.current.is_finite() {
        return Ok(Decision::Skipped(SkipReason::ZeroAverageVolume));
    }
    if window.current < window.average * alert.multiplier {
        return Ok(Decision::Quiet);
    }

    let message = format!(
        "📊 *Volume Alert: {}*\n{} Volume = {:.2}, exceeds {}× average ({:.2})",
        alert.symbol, alert.timeframe, window.current, alert.multiplier, window.average
    );
    Ok(Decision::fire(message, keep_or_delete(alert.repeat)))
}
