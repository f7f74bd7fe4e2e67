use common::Candle;

/// Session VWAP: cumulative typical price × volume over cumulative volume,
/// restarting at each UTC calendar day. Undefined while the session has
/// traded no volume.
pub fn session_vwap(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(candles.len());
    let mut session = None;
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;

    for c in candles {
        let day = c.open_time.date_naive();
        if session != Some(day) {
            session = Some(day);
            cum_pv = 0.0;
            cum_vol = 0.0;
        }
        let pv = c.typical_price() * c.volume;
        if pv.is_finite() && c.volume.is_finite() {
            cum_pv += pv;
            cum_vol += c.volume;
        }
        out.push((cum_vol > 0.0).then(|| cum_pv / cum_vol));
    }
    out
}
