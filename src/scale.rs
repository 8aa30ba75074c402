use crate::ir::Values;
use std::ops::Range;

/// Number of equal-width bins used for histograms.
pub const HISTOGRAM_BINS: usize = 10;

/// How one series lays out along x.
#[derive(Debug, Clone, PartialEq)]
pub enum XAxis {
    /// Every x parsed as a number.
    Continuous(Vec<f64>),
    /// Category index per point plus the category labels in first-seen order.
    Categorical { positions: Vec<f64>, categories: Vec<String> },
}

impl XAxis {
    /// Numeric unless any label fails to parse (bars always go categorical).
    pub fn from_values(values: &Values, force_categorical: bool) -> Self {
        if !force_categorical {
            if let Some(numbers) = values.strict_numbers() {
                return XAxis::Continuous(numbers);
            }
        }

        let labels = values.labels();
        let mut categories: Vec<String> = Vec::new();
        let positions = labels
            .iter()
            .map(|label| match categories.iter().position(|c| c == label) {
                Some(i) => i as f64,
                None => {
                    categories.push(label.clone());
                    (categories.len() - 1) as f64
                }
            })
            .collect();
        XAxis::Categorical { positions, categories }
    }

    pub fn positions(&self) -> &[f64] {
        match self {
            XAxis::Continuous(v) => v,
            XAxis::Categorical { positions, .. } => positions,
        }
    }

    pub fn range(&self) -> Range<f64> {
        match self {
            XAxis::Continuous(v) => pad_range(v),
            XAxis::Categorical { categories, .. } => -0.5..(categories.len().max(1) as f64 - 0.5),
        }
    }

    /// Label for a tick at `x`, if the axis is categorical.
    pub fn category_label(&self, x: f64) -> Option<String> {
        match self {
            XAxis::Continuous(_) => None,
            XAxis::Categorical { categories, .. } => {
                let idx = x.round();
                if idx < 0.0 || (x - idx).abs() > 1e-6 {
                    return Some(String::new());
                }
                Some(categories.get(idx as usize).cloned().unwrap_or_default())
            }
        }
    }
}

/// Min/max with 5% padding; a flat or empty range is widened by 1.
pub fn pad_range(values: &[f64]) -> Range<f64> {
    if values.is_empty() {
        return 0.0..1.0;
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        (min - 1.0)..(max + 1.0)
    } else {
        let padding = (max - min) * 0.05;
        (min - padding)..(max + padding)
    }
}

/// Like `pad_range` but always includes zero (bars, areas, histograms).
pub fn zero_based_range(values: &[f64]) -> Range<f64> {
    let mut with_zero = values.to_vec();
    with_zero.push(0.0);
    pad_range(&with_zero)
}

pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    let n = sorted_data.len();
    if n == 0 { return 0.0; }
    if n == 1 { return sorted_data[0]; }

    let rank = p * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;

    if lower_idx == upper_idx {
        sorted_data[lower_idx]
    } else {
        let weight = rank - lower_idx as f64;
        sorted_data[lower_idx] * (1.0 - weight) + sorted_data[upper_idx] * weight
    }
}

/// Five-number summary with 1.5 IQR whiskers.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub lower_whisker: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut ys = values.to_vec();
        ys.sort_by(|a, b| a.total_cmp(b));

        let q1 = percentile(&ys, 0.25);
        let median = percentile(&ys, 0.50);
        let q3 = percentile(&ys, 0.75);
        let iqr = q3 - q1;
        let lower_fence = q1 - 1.5 * iqr;
        let upper_fence = q3 + 1.5 * iqr;

        let lower_whisker = ys.iter().cloned().find(|&v| v >= lower_fence).unwrap_or(q1);
        let upper_whisker = ys.iter().rev().cloned().find(|&v| v <= upper_fence).unwrap_or(q3);
        let outliers = ys
            .iter()
            .cloned()
            .filter(|&v| v < lower_fence || v > upper_fence)
            .collect();

        Some(Self { lower_whisker, q1, median, q3, upper_whisker, outliers })
    }
}

/// One histogram bin: `[start, end)` and how many values fell in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width bins over the value range; the maximum lands in the last bin.
pub fn histogram(values: &[f64], bin_count: usize) -> Vec<Bin> {
    if values.is_empty() || bin_count == 0 {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    let width = if range == 0.0 { 1.0 } else { range / bin_count as f64 };

    let mut bins: Vec<Bin> = (0..bin_count)
        .map(|i| Bin {
            start: min + i as f64 * width,
            end: min + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();

    for &v in values {
        let idx = (((v - min) / width).floor() as usize).min(bin_count - 1);
        bins[idx].count += 1;
    }
    bins
}
