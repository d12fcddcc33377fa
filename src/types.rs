//! Common types for the harness.
//!
//! Component declarations, comparison results, retry policy and the
//! baseline accumulator.

use std::collections::BTreeMap;

use crate::error::{HarnessError, Result};
use crate::stats::{nan_mean, Moments, StatKind};

/// Declared components for a scenario: component name → dataset frame path.
///
/// Keys are unique; duplicates are rejected at declaration time so lookup
/// sites never have to re-validate.
#[derive(Debug, Clone, Default)]
pub struct ComponentSet {
    entries: BTreeMap<String, String>,
}

impl ComponentSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Declares a component, e.g. `declare("E/r", "rec/0-32_0-128")`.
    pub fn declare(&mut self, component: &str, frame_path: &str) -> Result<()> {
        if self.entries.contains_key(component) {
            return Err(HarnessError::Config {
                message: format!("component '{component}' declared twice"),
            });
        }
        self.entries
            .insert(component.to_string(), frame_path.to_string());
        Ok(())
    }

    /// Resolves a component's frame path, failing as `NotFound` if absent.
    pub fn frame_path(&self, component: &str) -> Result<&str> {
        self.entries
            .get(component)
            .map(String::as_str)
            .ok_or_else(|| HarnessError::NotFound {
                component: component.to_string(),
            })
    }

    /// Iterates declared components in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of declared components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no component is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of one per-statistic tolerance check.
#[derive(Debug, Clone, Copy)]
pub struct StatCheck {
    /// Which statistic was checked.
    pub kind: StatKind,
    /// Value computed from the run's data slice.
    pub computed: f64,
    /// Reference value from the baseline file.
    pub reference: f64,
    /// Whether the tolerance predicate held.
    pub passed: bool,
}

/// Result of comparing one component at one frame.
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    /// Component name, e.g. "E/r".
    pub component: String,
    /// Frame index compared.
    pub frame: u32,
    /// Moments computed from the run.
    pub computed: Moments,
    /// Reference moments.
    pub reference: Moments,
    /// Per-statistic verdicts in (mean, std, var) order.
    pub checks: Vec<StatCheck>,
    /// Conjunction of all per-statistic verdicts.
    pub passed: bool,
}

impl ComparisonResult {
    /// Kinds of the statistics that failed, in check order.
    pub fn failed_kinds(&self) -> impl Iterator<Item = StatKind> + '_ {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.kind)
    }
}

/// Aggregate pass/fail status of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioStatus {
    /// All declared components within tolerance.
    Passed,
    /// At least one component outside tolerance on every attempt.
    Failed,
}

impl ScenarioStatus {
    /// True for `Passed`.
    #[must_use]
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Bounded attempt count for nondeterministic scenarios.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy; at least one attempt is required.
    pub fn new(max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(HarnessError::Config {
                message: "retry policy needs at least one attempt".to_string(),
            });
        }
        Ok(Self { max_attempts })
    }

    /// Upper bound of independent attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    /// Four attempts, the bound observed to absorb unseeded-randomness noise.
    fn default() -> Self {
        Self { max_attempts: 4 }
    }
}

/// Collects per-component moment samples across repeated runs.
///
/// One sample is appended per run; `finalize` averages per statistic per
/// component and consumes the accumulator.
#[derive(Debug)]
pub struct BaselineAccumulator {
    samples: BTreeMap<String, Vec<Moments>>,
}

impl BaselineAccumulator {
    /// Prepares an empty sample list for every declared component.
    #[must_use]
    pub fn new(components: &ComponentSet) -> Self {
        let samples = components
            .iter()
            .map(|(name, _)| (name.to_string(), Vec::new()))
            .collect();
        Self { samples }
    }

    /// Appends one run's moments for a component.
    pub fn push(&mut self, component: &str, moments: Moments) -> Result<()> {
        self.samples
            .get_mut(component)
            .ok_or_else(|| HarnessError::NotFound {
                component: component.to_string(),
            })?
            .push(moments);
        Ok(())
    }

    /// Number of samples collected for a component, if declared.
    #[must_use]
    pub fn sample_count(&self, component: &str) -> Option<usize> {
        self.samples.get(component).map(Vec::len)
    }

    /// Averages every statistic per component into the baseline summary.
    #[must_use]
    pub fn finalize(self) -> BTreeMap<String, Moments> {
        self.samples
            .into_iter()
            .map(|(component, samples)| {
                let means: Vec<f64> = samples.iter().map(|m| m.mean).collect();
                let stds: Vec<f64> = samples.iter().map(|m| m.std).collect();
                let vars: Vec<f64> = samples.iter().map(|m| m.var).collect();
                let averaged = Moments {
                    mean: nan_mean(&means),
                    std: nan_mean(&stds),
                    var: nan_mean(&vars),
                };
                (component, averaged)
            })
            .collect()
    }
}
