//! Commodity Channel Index.
//!
//! CCI = (TP - SMA(TP)) / (0.015 × mean absolute deviation of TP), where
//! TP = (high + low + close) / 3 over the trailing n bars. A window with zero
//! deviation reads as 0.

use super::{mean, require, same_len, NotReady, Reading};

pub const DEFAULT_PERIOD: usize = 20;
const LAMBERT: f64 = 0.015;

pub fn cci(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Reading<f64> {
    compute(highs, lows, closes, period).into()
}

fn compute(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Result<f64, NotReady> {
    let len = same_len(highs, lows, closes)?;
    require(period, period, len)?;

    let typical: Vec<f64> = (len - period..len)
        .map(|i| (highs[i] + lows[i] + closes[i]) / 3.0)
        .collect();
    let sma = mean(&typical);
    let mean_dev = typical.iter().map(|tp| (tp - sma).abs()).sum::<f64>() / period as f64;

    if mean_dev == 0.0 {
        return Ok(0.0);
    }
    Ok((typical[period - 1] - sma) / (LAMBERT * mean_dev))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cci_not_ready() {
        assert_eq!(
            cci(&[1.0], &[1.0], &[1.0], 2),
            Reading::NotReady(NotReady::History { need: 2, have: 1 })
        );
    }

    #[test]
    fn cci_known_value() {
        // typical prices equal closes when h == l == c: 1, 2, 3
        let c = [1.0, 2.0, 3.0];
        // sma 2, mean dev 2/3, last tp 3 → 1 / (0.015 * 2/3) = 100
        let v = cci(&c, &c, &c, 3).ready().unwrap();
        assert!((v - 100.0).abs() < 1e-9);
    }

    #[test]
    fn cci_flat_is_zero() {
        let flat = [7.0; 5];
        assert_eq!(cci(&flat, &flat, &flat, 5), Reading::Ready(0.0));
    }

    #[test]
    fn cci_negative_when_below_average() {
        let c = [3.0, 2.0, 1.0];
        let v = cci(&c, &c, &c, 3).ready().unwrap();
        assert!((v + 100.0).abs() < 1e-9);
    }
}
