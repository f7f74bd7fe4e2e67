//! ADX (Average Directional Index), Wilder smoothing.
//!
//! +DM/-DM and true range are Wilder-smoothed over `period`, giving +DI and
//! -DI; DX = 100 * |+DI - -DI| / (+DI + -DI); ADX is Wilder-smoothed DX.
//! Defined from index `2 * period - 1`.

use common::Candle;

use super::{true_range, wilder};

pub fn adx(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut plus_dm = vec![None; n];
    let mut minus_dm = vec![None; n];
    let mut tr = true_range(candles);
    if n > 0 {
        // Directional movement starts at the second bar; keep TR aligned.
        tr[0] = None;
    }

    for i in 1..n {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        if !(up.is_finite() && down.is_finite()) {
            continue;
        }
        plus_dm[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
    }

    let smooth_tr = wilder(&tr, period);
    let smooth_plus = wilder(&plus_dm, period);
    let smooth_minus = wilder(&minus_dm, period);

    let dx: Vec<Option<f64>> = (0..n)
        .map(|i| {
            let (tr, plus, minus) = (smooth_tr[i]?, smooth_plus[i]?, smooth_minus[i]?);
            if tr == 0.0 {
                return None;
            }
            let plus_di = 100.0 * plus / tr;
            let minus_di = 100.0 * minus / tr;
            let sum = plus_di + minus_di;
            Some(if sum == 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / sum
            })
        })
        .collect();

    wilder(&dx, period)
}
