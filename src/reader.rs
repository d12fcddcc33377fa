//! Dataset reader seam.
//!
//! The harness consumes, never implements, the simulation's output format:
//! `FrameReader` is the contract, and comparisons go through `&dyn
//! FrameReader` so tests can substitute an in-memory reader. `DatReader` is
//! the shipped implementation over the simulation's whitespace-float `.dat`
//! probe dumps plus its rendered JSON configuration for metadata.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HarnessError, Result};

/// Grid dimensions of the simulated domain.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GridSize {
    /// Radial cell count.
    pub r: usize,
    /// Longitudinal cell count.
    pub z: usize,
}

/// Simulated time range and dump step.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeRange {
    /// Simulation start time, seconds.
    pub start: f64,
    /// Simulation end time, seconds.
    pub end: f64,
    /// Time step between iterations, seconds.
    pub step: f64,
}

/// Kind of measurement probe configured in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Full 2D slice of a quantity.
    Frame,
    /// Macro-particle frame (positions/velocities in a region).
    MpFrame,
    /// Time series at a single grid point.
    Dot,
}

/// A configured measurement point or region emitting periodic dumps.
#[derive(Debug, Clone, Deserialize)]
pub struct Probe {
    pub kind: ProbeKind,
    pub component: String,
    /// Dump interval in simulation iterations.
    pub schedule: u32,
    pub r_start: usize,
    pub z_start: usize,
    #[serde(default)]
    pub r_end: usize,
    #[serde(default)]
    pub z_end: usize,
}

/// Physical constants recorded with the run.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PhysicalConstants {
    /// Elementary charge, Coulombs.
    pub electron_charge: f64,
    /// Configured beam bunch density, m^-3.
    pub bunch_density: f64,
}

/// Read access to one simulation run's output dataset.
pub trait FrameReader {
    /// Fetches the flattened data slice of `component` under `frame_path`
    /// at frame `frame`. A component absent from the dataset fails as
    /// `NotFound`.
    fn frame_slice(&self, component: &str, frame_path: &str, frame: u32) -> Result<Vec<f64>>;

    /// Fetches the per-frame value sequence of `component` at grid point
    /// `(r, z)` over frames `start_frame..=end_frame`.
    fn frame_range_at_point(
        &self,
        component: &str,
        r: usize,
        z: usize,
        start_frame: u32,
        end_frame: u32,
    ) -> Result<Vec<f64>>;

    /// Grid dimensions.
    fn grid_size(&self) -> GridSize;

    /// Simulated time range.
    fn time_range(&self) -> TimeRange;

    /// Configured probes.
    fn probes(&self) -> &[Probe];

    /// Physical constants of the run.
    fn constants(&self) -> PhysicalConstants;

    /// Maps a timestamp to the frame index of a probe with the given dump
    /// schedule.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn frame_for_timestamp(&self, timestamp: f64, schedule: u32) -> u32 {
        let time = self.time_range();
        let per_frame = time.step * f64::from(schedule);
        if per_frame <= 0.0 {
            return 0;
        }
        ((timestamp - time.start) / per_frame).round().max(0.0) as u32
    }
}

/// Run metadata parsed from the rendered configuration file.
#[derive(Debug, Clone, Deserialize)]
struct RunMeta {
    data_root: String,
    geometry: GridSize,
    time: TimeRange,
    constants: PhysicalConstants,
    #[serde(default)]
    probes: Vec<Probe>,
}

/// Reader over the flat-file probe dump layout:
/// `<data_root>/<component>/<frame_path>/<frame>.dat` for slices and
/// `<data_root>/<component>/dot_<r>:<z>/<frame>.dat` for point series,
/// whitespace-separated floats throughout.
#[derive(Debug)]
pub struct DatReader {
    data_dir: PathBuf,
    meta: RunMeta,
}

impl DatReader {
    /// Opens a run by its rendered configuration file; the data root is
    /// resolved relative to the config's directory.
    pub fn open(config_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(config_path).map_err(|_| HarnessError::Environment {
            path: config_path.to_path_buf(),
        })?;
        let meta: RunMeta =
            serde_json::from_str(&text).map_err(|e| HarnessError::Malformed {
                path: config_path.to_path_buf(),
                detail: e.to_string(),
            })?;
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            data_dir: base.join(&meta.data_root),
            meta,
        })
    }

    /// Directory holding the run's probe dumps.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl FrameReader for DatReader {
    fn frame_slice(&self, component: &str, frame_path: &str, frame: u32) -> Result<Vec<f64>> {
        let path = self
            .data_dir
            .join(component)
            .join(frame_path)
            .join(format!("{frame}.dat"));
        if !path.is_file() {
            return Err(HarnessError::NotFound {
                component: format!("{component}:{frame}"),
            });
        }
        parse_float_file(&path)
    }

    fn frame_range_at_point(
        &self,
        component: &str,
        r: usize,
        z: usize,
        start_frame: u32,
        end_frame: u32,
    ) -> Result<Vec<f64>> {
        let point_dir = self.data_dir.join(component).join(format!("dot_{r}:{z}"));
        let mut series = Vec::with_capacity((end_frame.saturating_sub(start_frame) + 1) as usize);
        for frame in start_frame..=end_frame {
            let path = point_dir.join(format!("{frame}.dat"));
            if !path.is_file() {
                return Err(HarnessError::NotFound {
                    component: format!("{component}@({r},{z}):{frame}"),
                });
            }
            let values = parse_float_file(&path)?;
            series.push(values.first().copied().unwrap_or(f64::NAN));
        }
        Ok(series)
    }

    fn grid_size(&self) -> GridSize {
        self.meta.geometry
    }

    fn time_range(&self) -> TimeRange {
        self.meta.time
    }

    fn probes(&self) -> &[Probe] {
        &self.meta.probes
    }

    fn constants(&self) -> PhysicalConstants {
        self.meta.constants
    }
}

/// Parses a whitespace-separated float file. "nan" tokens parse to NaN and
/// flow into the missing-data handling downstream.
pub fn parse_float_file(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).map_err(|_| HarnessError::Environment {
        path: path.to_path_buf(),
    })?;
    text.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| HarnessError::Malformed {
                path: path.to_path_buf(),
                detail: format!("unparseable value '{token}'"),
            })
        })
        .collect()
}
