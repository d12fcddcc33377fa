//! Summary artifact rendering seam for the regression report.
//!
//! Plot rendering proper is an external collaborator; the orchestrator only
//! hands gathered series to a `SummaryRenderer` and verifies afterwards
//! that the expected artifact files exist. `DataDumpRenderer` is the
//! shipped implementation, writing plain whitespace-data artifacts.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Turns gathered data series into on-disk summary artifacts.
pub trait SummaryRenderer {
    /// Renders one 2D field frame, returning the artifact path.
    fn render_field_frame(&self, name: &str, data: &[f64], out_dir: &Path) -> Result<PathBuf>;

    /// Renders labelled time series over a shared timeline, returning the
    /// artifact path.
    fn render_series(
        &self,
        name: &str,
        timeline: &[f64],
        series: &[(&str, &[f64])],
        out_dir: &Path,
    ) -> Result<PathBuf>;
}

/// Renderer emitting whitespace-data `.dat` artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataDumpRenderer;

impl SummaryRenderer for DataDumpRenderer {
    fn render_field_frame(&self, name: &str, data: &[f64], out_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;
        let path = out_dir.join(format!("{name}.dat"));
        let mut text = String::new();
        for value in data {
            let _ = writeln!(text, "{value}");
        }
        fs::write(&path, text)?;
        Ok(path)
    }

    fn render_series(
        &self,
        name: &str,
        timeline: &[f64],
        series: &[(&str, &[f64])],
        out_dir: &Path,
    ) -> Result<PathBuf> {
        fs::create_dir_all(out_dir)?;
        let path = out_dir.join(format!("{name}.dat"));
        let mut text = String::new();
        let _ = write!(text, "# t");
        for (label, _) in series {
            let _ = write!(text, " {label}");
        }
        let _ = writeln!(text);
        for (i, t) in timeline.iter().enumerate() {
            let _ = write!(text, "{t}");
            for (_, values) in series {
                let _ = write!(text, " {}", values.get(i).copied().unwrap_or(f64::NAN));
            }
            let _ = writeln!(text);
        }
        fs::write(&path, text)?;
        Ok(path)
    }
}

/// Evenly spaced timeline of `len` points spanning `[start, end]`.
#[must_use]
pub fn linspace(start: f64, end: f64, len: usize) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![start];
    }
    #[allow(clippy::cast_precision_loss)]
    let step = (end - start) / (len - 1) as f64;
    #[allow(clippy::cast_precision_loss)]
    (0..len).map(|i| start + step * i as f64).collect()
}
