//! Linear trend slope: least-squares slope of values against bar index.

/// Slope of the ordinary least-squares fit of the trailing `window` values
/// against their index (0, 1, ..., window-1).
///
/// Returns 0.0 (neutral) when fewer than `window` values exist, when the
/// window is shorter than two points, or when the window contains NaN.
pub fn trend_slope(values: &[f64], window: usize) -> f64 {
    if window < 2 || values.len() < window {
        return 0.0;
    }
    let tail = &values[values.len() - window..];
    if tail.iter().any(|v| v.is_nan()) {
        return 0.0;
    }

    let n = window as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = tail.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in tail.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }

    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
