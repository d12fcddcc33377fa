//! Statistical comparison of a run's data slices against reference values.
//!
//! Each declared component is compared at one frame: the slice's NaN-aware
//! moments against three reference scalars read from a whitespace-delimited
//! file in fixed (mean, std, var) order. The verdict is the strict AND of
//! the three per-statistic checks, and every per-statistic result is kept
//! in the report.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::error::{HarnessError, Result};
use crate::reader::{parse_float_file, FrameReader};
use crate::stats::{relative_difference, Moments, StatKind, ToleranceConfig};
use crate::types::{ComparisonResult, ComponentSet, StatCheck};

/// Compares components of one run against the reference directory.
pub struct StatisticalComparator<'a> {
    reader: &'a dyn FrameReader,
    components: &'a ComponentSet,
    reference_dir: PathBuf,
    tolerance: ToleranceConfig,
    verbose: bool,
}

impl<'a> StatisticalComparator<'a> {
    /// Creates a comparator over `reader` for the declared `components`,
    /// reading reference files under `reference_dir`.
    #[must_use]
    pub fn new(
        reader: &'a dyn FrameReader,
        components: &'a ComponentSet,
        reference_dir: PathBuf,
        tolerance: ToleranceConfig,
    ) -> Self {
        Self {
            reader,
            components,
            reference_dir,
            tolerance,
            verbose: false,
        }
    }

    /// Enables the per-statistic relative-difference report.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Compares one component at `frame`, emitting the pass/fail line and
    /// returning the full per-statistic result.
    ///
    /// An undeclared or absent component fails as `NotFound`; a missing
    /// reference file as `Environment`. A statistic outside tolerance is
    /// reported in the result, never raised.
    pub fn compare(&self, component: &str, frame: u32) -> Result<ComparisonResult> {
        let frame_path = self.components.frame_path(component)?;
        let slice = self.reader.frame_slice(component, frame_path, frame)?;
        let computed = Moments::from_samples(&slice);
        let reference = self.load_reference(component, frame_path, frame)?;

        let checks: Vec<StatCheck> = StatKind::ALL
            .iter()
            .map(|&kind| StatCheck {
                kind,
                computed: computed.get(kind),
                reference: reference.get(kind),
                passed: self.tolerance.within(computed.get(kind), reference.get(kind)),
            })
            .collect();
        let passed = checks.iter().all(|c| c.passed);

        let verdict = if passed {
            "PASSED".blue()
        } else {
            "FAILED".red()
        };
        println!("Data matching for {component}:{frame} {verdict}");

        if self.verbose {
            for check in &checks {
                let report = format!(
                    "{} of {}. test data: {}, true data: {}; Relative Difference: {}",
                    check.kind.label(),
                    component,
                    check.computed,
                    check.reference,
                    relative_difference(check.computed, check.reference)
                );
                println!("{}", report.yellow());
            }
        }

        Ok(ComparisonResult {
            component: component.to_string(),
            frame,
            computed,
            reference,
            checks,
            passed,
        })
    }

    /// Loads the three reference scalars (mean, std, var) for a component
    /// and frame from `<reference_dir>/<component>/<frame_path>/<frame>.dat`.
    fn load_reference(&self, component: &str, frame_path: &str, frame: u32) -> Result<Moments> {
        let path = self
            .reference_dir
            .join(component)
            .join(frame_path)
            .join(format!("{frame}.dat"));
        if !path.is_file() {
            return Err(HarnessError::Environment { path });
        }
        let values = parse_float_file(&path)?;
        if values.len() != 3 {
            return Err(HarnessError::Malformed {
                path,
                detail: format!("expected exactly 3 values, found {}", values.len()),
            });
        }
        Ok(Moments {
            mean: values[0],
            std: values[1],
            var: values[2],
        })
    }

    /// Reference directory this comparator reads from.
    #[must_use]
    pub fn reference_dir(&self) -> &Path {
        &self.reference_dir
    }
}
