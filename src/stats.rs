//! Statistical primitives: aggregate moments and the tolerance predicate.
//!
//! Moments are population moments (divisor `n`), with not-a-number entries
//! treated as missing data rather than propagated.

use serde::Serialize;

use crate::error::{HarnessError, Result};

/// The three statistics compared against a baseline, in reference-file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    Mean,
    Std,
    Var,
}

impl StatKind {
    /// All kinds in the fixed reference-file order (mean, std, var).
    pub const ALL: [Self; 3] = [Self::Mean, Self::Std, Self::Var];

    /// Human-readable statistic name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Std => "standard deviation",
            Self::Var => "variance",
        }
    }
}

/// Aggregate statistics of one data slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moments {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Population variance.
    pub var: f64,
}

impl Moments {
    /// Computes moments over `data`, excluding not-a-number entries.
    ///
    /// A slice with nothing but NaN entries yields NaN moments, which fail
    /// every tolerance check downstream.
    #[must_use]
    pub fn from_samples(data: &[f64]) -> Self {
        let mut n = 0usize;
        let mut sum = 0.0;
        for &x in data {
            if !x.is_nan() {
                n += 1;
                sum += x;
            }
        }
        if n == 0 {
            return Self {
                mean: f64::NAN,
                std: f64::NAN,
                var: f64::NAN,
            };
        }
        #[allow(clippy::cast_precision_loss)]
        let count = n as f64;
        let mean = sum / count;
        let var = data
            .iter()
            .copied()
            .filter(|x| !x.is_nan())
            .map(|x| (x - mean).powi(2))
            .sum::<f64>()
            / count;
        Self {
            mean,
            std: var.sqrt(),
            var,
        }
    }

    /// Returns the value for one statistic kind.
    #[must_use]
    pub const fn get(&self, kind: StatKind) -> f64 {
        match kind {
            StatKind::Mean => self.mean,
            StatKind::Std => self.std,
            StatKind::Var => self.var,
        }
    }
}

/// Relative and absolute tolerance bounds for the closeness predicate.
///
/// Both bounds are validated non-negative at construction; this is the only
/// place the invariant is checked.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceConfig {
    rtol: f64,
    atol: f64,
}

impl ToleranceConfig {
    /// Creates a tolerance config, rejecting negative or NaN bounds.
    pub fn new(rtol: f64, atol: f64) -> Result<Self> {
        if rtol < 0.0 || atol < 0.0 || rtol.is_nan() || atol.is_nan() {
            return Err(HarnessError::Config {
                message: format!("tolerances must be non-negative, got rtol={rtol}, atol={atol}"),
            });
        }
        Ok(Self { rtol, atol })
    }

    /// Relative tolerance.
    #[must_use]
    pub const fn rtol(&self) -> f64 {
        self.rtol
    }

    /// Absolute tolerance.
    #[must_use]
    pub const fn atol(&self) -> f64 {
        self.atol
    }

    /// Closeness predicate: `|computed - reference| <= atol + rtol * |reference|`.
    ///
    /// NaN on either side fails the comparison.
    #[inline]
    #[must_use]
    pub fn within(&self, computed: f64, reference: f64) -> bool {
        (computed - reference).abs() <= self.atol + self.rtol * reference.abs()
    }
}

/// Relative difference `|(computed - reference) / reference|`, for reports.
#[inline]
#[must_use]
pub fn relative_difference(computed: f64, reference: f64) -> f64 {
    ((computed - reference) / reference).abs()
}

/// Arithmetic mean of a sample sequence, excluding not-a-number entries.
#[must_use]
pub fn nan_mean(samples: &[f64]) -> f64 {
    Moments::from_samples(samples).mean
}
