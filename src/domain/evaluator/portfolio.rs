//! Portfolio value limits.
//!
//! Total value is the sum of quote × quantity over every holding. If any
//! holding lacks a quote the whole total is unavailable and nothing fires.
//! The loss and profit bounds are checked independently; a one-shot bound
//! clears only itself.

use super::{invalid, money, Decision, Effect, SkipReason, Trigger};
use crate::domain::alert::{AlertKind, Bound, PortfolioLimit};
use crate::domain::error::EngineError;
use crate::domain::snapshot::MarketSnapshot;

pub fn evaluate(limit: &PortfolioLimit, snapshot: &MarketSnapshot) -> Result<Decision, EngineError> {
    if limit.loss_limit.is_none() && limit.profit_target.is_none() {
        return Ok(Decision::Quiet);
    }
    if limit.holdings.is_empty() {
        return Ok(Decision::Skipped(SkipReason::EmptyPortfolio));
    }
    if let Some(h) = limit.holdings.iter().find(|h| !h.quantity.is_finite()) {
        return Err(invalid(
            AlertKind::PortfolioLimit,
            limit.owner,
            format!("quantity for {} is not finite", h.symbol),
        ));
    }

    let mut total = 0.0;
    for holding in &limit.holdings {
        match snapshot.quote(&holding.symbol) {
            Some(price) => total += price * holding.quantity,
            None => {
                return Ok(Decision::Skipped(SkipReason::PartialPortfolio {
                    symbol: holding.symbol.clone(),
                }))
            }
        }
    }

    let mut triggers = Vec::new();
    if let Some(loss) = limit.loss_limit.filter(|l| total <= *l) {
        triggers.push(Trigger {
            message: format!(
                "⚠️ *Portfolio Loss Alert*\nYour total value dropped to ${}.\nLoss limit was: ${}",
                money(total),
                money(loss)
            ),
            effect: bound_effect(limit.repeat_loss, Bound::Loss),
        });
    }
    if let Some(target) = limit.profit_target.filter(|t| total >= *t) {
        triggers.push(Trigger {
            message: format!(
                "🎯 *Portfolio Target Reached*\nYour total value is now ${}.\nTarget goal was: ${}",
                money(total),
                money(target)
            ),
            effect: bound_effect(limit.repeat_profit, Bound::Profit),
        });
    }

    if triggers.is_empty() {
        Ok(Decision::Quiet)
    } else {
        Ok(Decision::Fired(triggers))
    }
}

fn bound_effect(repeat: bool, bound: Bound) -> Effect {
    if repeat {
        Effect::Keep
    } else {
        Effect::ClearBound(bound)
    }
}
