//! Statistics over numeric series: percentiles and trends.

use serde::{Deserialize, Serialize};

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Nearest-rank percentile: sort ascending, take `ceil(p/100 * n) - 1`
/// (clamped to the first element).
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    Some(sorted[idx])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::Unknown => "unknown",
        }
    }
}

/// Early-vs-late comparison of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThirdsTrend {
    pub direction: TrendDirection,
    /// Absolute percentage change.
    pub percentage: f64,
    /// Signed percentage change.
    pub change: f64,
}

/// Percentage change that counts as a trend.
const THIRDS_THRESHOLD_PCT: f64 = 5.0;

/// Compare the mean of the first third against the mean of the last third.
///
/// Fewer than three values gives `Unknown`. A zero baseline counts as
/// increasing when the late mean is positive.
pub fn thirds_trend(values: &[f64]) -> ThirdsTrend {
    if values.len() < 3 {
        return ThirdsTrend {
            direction: TrendDirection::Unknown,
            percentage: 0.0,
            change: 0.0,
        };
    }
    let third = values.len() / 3;
    let first = mean(&values[..third]).unwrap_or(0.0);
    let last = mean(&values[values.len() - third..]).unwrap_or(0.0);

    let change = if first == 0.0 {
        if last > 0.0 { 100.0 } else if last < 0.0 { -100.0 } else { 0.0 }
    } else {
        (last - first) / first.abs() * 100.0
    };

    let direction = if change > THIRDS_THRESHOLD_PCT {
        TrendDirection::Increasing
    } else if change < -THIRDS_THRESHOLD_PCT {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    ThirdsTrend {
        direction,
        percentage: change.abs(),
        change,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    Strong,
    Moderate,
    Weak,
    InsufficientData,
}

impl TrendStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendStrength::Strong => "strong",
            TrendStrength::Moderate => "moderate",
            TrendStrength::Weak => "weak",
            TrendStrength::InsufficientData => "insufficient_data",
        }
    }
}

/// Least-squares slope over sample index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionTrend {
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    pub slope: Option<f64>,
}

/// Slope magnitude (units per sample) for a moderate trend.
const SLOPE_MODERATE: f64 = 5.0;
/// Slope magnitude for a strong trend.
const SLOPE_STRONG: f64 = 20.0;

/// Fit `y = a + b*i` and classify the slope `b`.
pub fn regression_trend(values: &[f64]) -> RegressionTrend {
    if values.len() < 3 {
        return RegressionTrend {
            direction: TrendDirection::Unknown,
            strength: TrendStrength::InsufficientData,
            slope: None,
        };
    }
    let n = values.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_xx - sum_x * sum_x);

    let (direction, strength) = if slope > SLOPE_MODERATE {
        let strength = if slope > SLOPE_STRONG {
            TrendStrength::Strong
        } else {
            TrendStrength::Moderate
        };
        (TrendDirection::Increasing, strength)
    } else if slope < -SLOPE_MODERATE {
        let strength = if slope < -SLOPE_STRONG {
            TrendStrength::Strong
        } else {
            TrendStrength::Moderate
        };
        (TrendDirection::Decreasing, strength)
    } else {
        (TrendDirection::Stable, TrendStrength::Weak)
    };

    RegressionTrend {
        direction,
        strength,
        slope: Some(slope),
    }
}
