//! Small descriptive statistics shared by the extractors and the aggregator.

pub fn mean(x: &[f32]) -> Option<f32> {
    if x.is_empty() {
        return None;
    }
    Some(x.iter().sum::<f32>() / x.len() as f32)
}

/// Population standard deviation (divides by n).
pub fn std_dev(x: &[f32]) -> Option<f32> {
    let m = mean(x)?;
    let var = x.iter().map(|v| (v - m).powi(2)).sum::<f32>() / x.len() as f32;
    Some(var.sqrt())
}

/// Median, ignoring NaN.
pub fn median(x: &[f32]) -> Option<f32> {
    let mut v: Vec<f32> = x.iter().copied().filter(|v| !v.is_nan()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f32::total_cmp);
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 0 {
        0.5 * (v[mid - 1] + v[mid])
    } else {
        v[mid]
    })
}

/// Coefficient of variation, `None` when the mean is not positive.
pub fn coefficient_of_variation(x: &[f32]) -> Option<f32> {
    let m = mean(x)?;
    if m <= 0.0 {
        return None;
    }
    Some(std_dev(x)? / m)
}

/// Least-squares slope of `y` against its index.
pub fn linear_slope(y: &[f32]) -> Option<f32> {
    let n = y.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f32 / 2.0;
    let y_mean = mean(y)?;
    let mut num = 0.0f32;
    let mut den = 0.0f32;
    for (i, &v) in y.iter().enumerate() {
        let dx = i as f32 - x_mean;
        num += dx * (v - y_mean);
        den += dx * dx;
    }
    if den <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// Linearly interpolate the irregular series `(t, v)` (seconds) onto a
/// uniform grid starting at the first point.
pub fn resample_uniform(t: &[f32], v: &[f32], rate_hz: f32) -> Vec<f32> {
    let n = t.len().min(v.len());
    if n < 2 || !(rate_hz > 0.0) {
        return Vec::new();
    }
    let t0 = t[0];
    let span = t[n - 1] - t0;
    if span <= 0.0 {
        return Vec::new();
    }
    let count = (span * rate_hz).floor() as usize + 1;
    let step = 1.0 / rate_hz;

    let mut out = Vec::with_capacity(count);
    let mut j = 0usize;
    for i in 0..count {
        let ti = t0 + i as f32 * step;
        while j + 2 < n && t[j + 1] < ti {
            j += 1;
        }
        let (ta, tb) = (t[j], t[j + 1]);
        let frac = if tb > ta { ((ti - ta) / (tb - ta)).clamp(0.0, 1.0) } else { 0.0 };
        out.push(v[j] + frac * (v[j + 1] - v[j]));
    }
    out
}
