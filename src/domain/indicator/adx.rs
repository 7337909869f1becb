//! Average Directional Index with +DI / -DI.
//!
//! Directional movement and true range are Wilder-smoothed over n bars
//! (seed = sum of the first n, then s = s - s/n + current). DX is
//! 100 × |+DI - -DI| / (+DI + -DI); ADX is the mean of the first n DX values,
//! then Wilder-averaged. Needs 2n bars.

use super::atr::true_range;
use super::{mean, require, same_len, span, NotReady, Reading};

pub const DEFAULT_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adx {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Reading<Adx> {
    compute(highs, lows, closes, period).into()
}

struct Movement {
    tr: f64,
    plus_dm: f64,
    minus_dm: f64,
}

fn compute(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Result<Adx, NotReady> {
    let len = same_len(highs, lows, closes)?;
    require(period, span(period, period)?, len)?;

    let moves: Vec<Movement> = (1..len)
        .map(|j| {
            let up = highs[j] - highs[j - 1];
            let down = lows[j - 1] - lows[j];
            Movement {
                tr: true_range(highs[j], lows[j], closes[j - 1]),
                plus_dm: if up > down && up > 0.0 { up } else { 0.0 },
                minus_dm: if down > up && down > 0.0 { down } else { 0.0 },
            }
        })
        .collect();

    let n = period as f64;
    let mut tr_s: f64 = moves[..period].iter().map(|m| m.tr).sum();
    let mut plus_s: f64 = moves[..period].iter().map(|m| m.plus_dm).sum();
    let mut minus_s: f64 = moves[..period].iter().map(|m| m.minus_dm).sum();

    let mut di = directional(plus_s, minus_s, tr_s);
    let mut dxs = vec![dx(di)];
    for m in &moves[period..] {
        tr_s = tr_s - tr_s / n + m.tr;
        plus_s = plus_s - plus_s / n + m.plus_dm;
        minus_s = minus_s - minus_s / n + m.minus_dm;
        di = directional(plus_s, minus_s, tr_s);
        dxs.push(dx(di));
    }

    let mut adx = mean(&dxs[..period]);
    for &v in &dxs[period..] {
        adx = (adx * (n - 1.0) + v) / n;
    }

    Ok(Adx {
        adx,
        plus_di: di.0,
        minus_di: di.1,
    })
}

fn directional(plus_s: f64, minus_s: f64, tr_s: f64) -> (f64, f64) {
    if tr_s == 0.0 {
        return (0.0, 0.0);
    }
    (100.0 * plus_s / tr_s, 100.0 * minus_s / tr_s)
}

fn dx((plus_di, minus_di): (f64, f64)) -> f64 {
    let sum = plus_di + minus_di;
    if sum == 0.0 {
        return 0.0;
    }
    100.0 * (plus_di - minus_di).abs() / sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trend(n: usize, step: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + step * i as f64).collect();
        let highs = closes.iter().map(|c| c + 1.0).collect();
        let lows = closes.iter().map(|c| c - 1.0).collect();
        (highs, lows, closes)
    }

    #[test]
    fn adx_needs_two_periods() {
        let (h, l, c) = trend(27, 1.0);
        assert_eq!(
            adx(&h, &l, &c, 14),
            Reading::NotReady(NotReady::History { need: 28, have: 27 })
        );
        let (h, l, c) = trend(28, 1.0);
        assert!(adx(&h, &l, &c, 14).is_ready());
    }

    #[test]
    fn adx_steady_uptrend() {
        let (h, l, c) = trend(40, 1.0);
        let a = adx(&h, &l, &c, 14).ready().unwrap();
        assert!((a.adx - 100.0).abs() < 1e-9);
        assert!(a.plus_di > 0.0);
        assert_eq!(a.minus_di, 0.0);
    }

    #[test]
    fn adx_steady_downtrend() {
        let (h, l, c) = trend(40, -1.0);
        let a = adx(&h, &l, &c, 14).ready().unwrap();
        assert!((a.adx - 100.0).abs() < 1e-9);
        assert_eq!(a.plus_di, 0.0);
        assert!(a.minus_di > 0.0);
    }

    #[test]
    fn adx_flat_market_is_zero() {
        let flat = [10.0; 30];
        let a = adx(&flat, &flat, &flat, 14).ready().unwrap();
        assert_eq!(a.adx, 0.0);
        assert_eq!(a.plus_di, 0.0);
        assert_eq!(a.minus_di, 0.0);
    }

    #[test]
    fn adx_bounded() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.4).sin() * 8.0).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.5).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.5).collect();
        let a = adx(&highs, &lows, &closes, 14).ready().unwrap();
        assert!((0.0..=100.0).contains(&a.adx));
        assert!((0.0..=100.0).contains(&a.plus_di));
        assert!((0.0..=100.0).contains(&a.minus_di));
    }
}
