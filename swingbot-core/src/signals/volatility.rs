//! Realised volatility of close-to-close returns.

/// Sample standard deviation of the last `lookback` simple returns.
///
/// Returns `None` when fewer than two finite returns are available or a
/// previous close is not positive.
pub fn return_volatility(closes: &[f64], lookback: usize) -> Option<f64> {
    if closes.len() < 3 || lookback < 2 {
        return None;
    }
    let start = closes.len().saturating_sub(lookback + 1);
    let window = &closes[start..];

    let mut returns = Vec::with_capacity(window.len() - 1);
    for w in window.windows(2) {
        if w[0] <= 0.0 || !w[0].is_finite() || !w[1].is_finite() {
            return None;
        }
        returns.push(w[1] / w[0] - 1.0);
    }
    if returns.len() < 2 {
        return None;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}
