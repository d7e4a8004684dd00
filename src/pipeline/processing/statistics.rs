//! Numeric primitives shared by every cleaning stage: quantiles, IQR fences,
//! z-score standardization, the normality score, and price rounding.
//!
//! All functions take plain `f64` slices of valid (non-missing) values; the
//! callers strip missing entries first.

/// Linear-interpolated quantile of an already sorted slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }
    let pos = q * (sorted.len() as f64 - 1.0);
    let idx = pos.floor() as usize;
    let frac = pos - idx as f64;
    let a = sorted[idx];
    let b = sorted[(idx + 1).min(sorted.len() - 1)];
    Some(a + (b - a) * frac)
}

/// Linear-interpolated quantile; sorts a copy of the input.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, q)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by n)
pub fn population_variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / values.len() as f64)
}

/// Outlier fences `[Q1 - k*IQR, Q3 + k*IQR]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    pub fn compute(values: &[f64], multiplier: f64) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let q1 = quantile_sorted(&sorted, 0.25)?;
        let q3 = quantile_sorted(&sorted, 0.75)?;
        let iqr = q3 - q1;
        Some(Self {
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    /// Strictly outside the fences. Nothing is an outlier when the fences are NaN.
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Zero-mean, unit-variance scaling fitted on one sample.
///
/// A constant sample has zero spread; its scale is taken as 1 so every value maps to 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standardizer {
    pub mean: f64,
    pub scale: f64,
}

impl Standardizer {
    /// `None` for an empty sample or one whose moments are not finite
    pub fn fit(values: &[f64]) -> Option<Self> {
        let mean = mean(values)?;
        let std = population_variance(values)?.sqrt();
        if !mean.is_finite() || !std.is_finite() {
            return None;
        }
        let scale = if std == 0.0 { 1.0 } else { std };
        Some(Self { mean, scale })
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| (v - self.mean) / self.scale).collect()
    }
}

/// Fraction of standardized values with |z| < `z_bound`
pub fn normality_score(values: &[f64], z_bound: f64) -> Option<f64> {
    let scaler = Standardizer::fit(values)?;
    let scaled = scaler.transform(values);
    let within = scaled.iter().filter(|z| z.abs() < z_bound).count();
    Some(within as f64 / scaled.len() as f64)
}

/// Round to a fixed number of decimal places for reporting
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

/// Round to significant figures, so small positive values stay positive
pub fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let places = digits - 1 - magnitude;
    if places > 300 {
        return value;
    }
    round_to(value, places)
}

/// Whole-currency price; halves go to the even neighbour. `None` for non-finite input.
pub fn round_price(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round_ties_even();
    if rounded < i64::MIN as f64 || rounded > i64::MAX as f64 {
        return None;
    }
    Some(rounded as i64)
}
