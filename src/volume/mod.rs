//! Volumetric engine seam
//!
//! The attribute engine never touches voxels itself. It talks to a
//! [`DataSource`], which knows how to turn three bounding surfaces into a
//! [`SubVolume`] descriptor and how to fill attribute maps for a range of grid
//! cells. Data sources are opened through a [`Connector`] and handed out as a
//! [`DataSourceHandle`], which releases the source exactly once.
//!
//! # Vertical windows
//!
//! For every cell the descriptor records the native samples to read: the
//! samples between top and bottom, plus [`INTERPOLATION_MARGIN`] extra samples
//! on each side so that resampling never runs off the end of the data. A
//! window whose margin would leave the volume is rejected up front.

pub mod connector;
pub mod memory;

pub use connector::LocalConnector;
pub use memory::{InMemoryVolume, VolumeDocument};

use crate::attribute::{AttributeKind, Interpolation};
use crate::error::{VdsError, VdsResult};
use crate::request::RequestedResource;
use crate::surface::{self, Alignment, Plane, RegularSurface};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, Range};
use std::str::FromStr;
use tracing::{debug, warn};

/// Native samples kept on each side of a vertical window
pub const INTERPOLATION_MARGIN: usize = 2;

/// Most resampled samples one cell's window may hold
pub const MAX_WINDOW_SAMPLES: usize = 1 << 16;

/// Vertical distance between resampled samples, where 0 means the native
/// stride
pub fn resampling_step(stepsize: f32, sample: &Axis) -> f64 {
    if stepsize == 0.0 {
        sample.stride as f64
    } else {
        stepsize as f64
    }
}

/// Floor that forgives values a hair below an integer
pub(crate) fn floor_with_tolerance(x: f64) -> f64 {
    let rounded = x.round();
    if (x - rounded).abs() < 1e-4 {
        rounded
    } else {
        x.floor()
    }
}

/// A regularly sampled axis in annotated coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Annotated coordinate of the first sample
    pub min: f32,
    /// Distance between samples
    pub stride: f32,
    /// Number of samples
    pub nsamples: usize,
}

impl Axis {
    pub fn new(min: f32, stride: f32, nsamples: usize) -> Self {
        Self {
            min,
            stride,
            nsamples,
        }
    }

    /// Annotated coordinate of the last sample
    pub fn max(&self) -> f64 {
        self.min as f64 + self.stride as f64 * (self.nsamples.saturating_sub(1)) as f64
    }

    /// Annotated coordinate of (fractional) sample `index`
    pub fn position(&self, index: f64) -> f64 {
        self.min as f64 + self.stride as f64 * index
    }

    /// Fractional sample index of an annotated coordinate
    pub fn to_index(&self, coordinate: f64) -> f64 {
        (coordinate - self.min as f64) / self.stride as f64
    }

    /// Whether a coordinate lies within half a sample of the axis
    pub fn inrange(&self, coordinate: f64) -> bool {
        let half = 0.5 * self.stride as f64;
        self.min as f64 - half <= coordinate && coordinate < self.max() + half
    }

    pub(crate) fn validate(&self, name: &str) -> VdsResult<()> {
        if self.nsamples == 0 {
            return Err(VdsError::invalid(format!("Axis {} has no samples", name)));
        }
        if !(self.stride > 0.0) || !self.min.is_finite() || !self.stride.is_finite() {
            return Err(VdsError::invalid(format!(
                "Axis {} must have a finite, positive stride, got {}",
                name, self.stride
            )));
        }
        Ok(())
    }
}

/// Geometry of a volume: two horizontal axes, one vertical, and the
/// placement of the (iline, xline) index grid in world space
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMetadata {
    pub iline: Axis,
    pub xline: Axis,
    pub sample: Axis,
    pub plane: Plane,
}

impl VolumeMetadata {
    /// Fractional (iline, xline) indices of a world position
    pub fn world_to_index(&self, x: f64, y: f64) -> (f64, f64) {
        self.plane.to_grid(x, y)
    }

    /// Whether an index position is within half a bin of the horizontal grid
    pub fn contains_index(&self, iline: f64, xline: f64) -> bool {
        let within = |index: f64, n: usize| -0.5 <= index && index < n as f64 - 0.5;
        within(iline, self.iline.nsamples) && within(xline, self.xline.nsamples)
    }
}

/// The native samples backing one grid cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellWindow {
    pub reference: f32,
    pub top: f32,
    pub bottom: f32,
    /// Fractional iline index
    pub iline: f64,
    /// Fractional xline index
    pub xline: f64,
    /// First native sample index, margin included
    pub first_sample: usize,
    /// Number of native samples, margins included
    pub nsamples: usize,
}

impl CellWindow {
    /// Locate the native samples for a cell, rejecting windows whose margin
    /// falls outside the vertical axis
    pub fn locate(
        sample: &Axis,
        reference: f32,
        top: f32,
        bottom: f32,
        horizontal: (f64, f64),
        cell: (usize, usize),
    ) -> VdsResult<Self> {
        let stride = sample.stride as f64;
        let nearest = sample.to_index(reference as f64).round() as i64;
        let above = floor_with_tolerance((reference - top) as f64 / stride) as i64;
        let below = floor_with_tolerance((bottom - reference) as f64 / stride) as i64;
        let margin = INTERPOLATION_MARGIN as i64;

        let first = nearest - above - margin;
        let last = nearest + below + margin;

        if first < 0 || last >= sample.nsamples as i64 {
            return Err(VdsError::invalid(format!(
                "Vertical window is out of vertical bounds at row: {} col: {}. \
                 Request: [{}, {}]. Seismic bounds: [{}, {}]",
                cell.0,
                cell.1,
                sample.position(first as f64),
                sample.position(last as f64),
                sample.min,
                sample.max()
            )));
        }

        Ok(Self {
            reference,
            top,
            bottom,
            iline: horizontal.0,
            xline: horizontal.1,
            first_sample: first as usize,
            nsamples: (last - first + 1) as usize,
        })
    }

    /// Resampled steps above and below the reference at spacing `step`.
    ///
    /// `None` when the window would hold more than [`MAX_WINDOW_SAMPLES`].
    pub fn steps(&self, step: f64) -> Option<(usize, usize)> {
        let reference = self.reference as f64;
        let count = |distance: f64| {
            let n = floor_with_tolerance(distance / step);
            (n.is_finite() && (0.0..MAX_WINDOW_SAMPLES as f64).contains(&n)).then_some(n as usize)
        };

        let nabove = count(reference - self.top as f64)?;
        let nbelow = count(self.bottom as f64 - reference)?;
        nabove
            .checked_add(nbelow)?
            .checked_add(1)
            .filter(|&n| n <= MAX_WINDOW_SAMPLES)?;
        Some((nabove, nbelow))
    }
}

/// Per-cell description of what to sample, built once per request
#[derive(Debug, Clone)]
pub struct SubVolume {
    cells: Vec<Option<CellWindow>>,
    fill_value: f32,
}

impl SubVolume {
    /// `None` cells produce the fill value for every attribute
    pub fn new(cells: Vec<Option<CellWindow>>, fill_value: f32) -> Self {
        Self { cells, fill_value }
    }

    /// Number of grid cells
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, index: usize) -> Option<&CellWindow> {
        self.cells.get(index).and_then(Option::as_ref)
    }

    pub fn fill_value(&self) -> f32 {
        self.fill_value
    }

    /// Number of native samples over all cells
    pub fn nsamples(&self) -> usize {
        self.cells.iter().flatten().map(|c| c.nsamples).sum()
    }
}

/// How two volumes combine into one virtual volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl BinaryOperator {
    pub fn apply(&self, a: f32, b: f32) -> f32 {
        match self {
            Self::Addition => a + b,
            Self::Subtraction => a - b,
            Self::Multiplication => a * b,
            Self::Division => a / b,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Addition => "addition",
            Self::Subtraction => "subtraction",
            Self::Multiplication => "multiplication",
            Self::Division => "division",
        };
        f.write_str(name)
    }
}

impl FromStr for BinaryOperator {
    type Err = VdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "addition" => Ok(Self::Addition),
            "subtraction" => Ok(Self::Subtraction),
            "multiplication" => Ok(Self::Multiplication),
            "division" => Ok(Self::Division),
            _ => Err(VdsError::invalid(format!(
                "invalid binary operator '{}', valid options are: \
                 addition, subtraction, multiplication, division",
                s
            ))),
        }
    }
}

/// Read access to one volume.
///
/// Implementations must tolerate concurrent calls to the read methods: the
/// attribute engine calls [`DataSource::compute_attribute_chunk`] from several
/// workers at once, each with a disjoint cell range and output.
pub trait DataSource: Send + Sync {
    /// Geometry of the volume
    fn metadata(&self) -> &VolumeMetadata;

    /// Whether the source can interpolate with `method`
    fn supports(&self, _method: Interpolation) -> bool {
        true
    }

    /// Scan the bounding surfaces and describe what to sample per cell
    fn build_subvolume(
        &self,
        reference: &RegularSurface,
        top: &RegularSurface,
        bottom: &RegularSurface,
    ) -> VdsResult<SubVolume>;

    /// Fill `out[a][k]` with attribute `attributes[a]` of cell `cells.start + k`
    fn compute_attribute_chunk(
        &self,
        subvolume: &SubVolume,
        interpolation: Interpolation,
        attributes: &[AttributeKind],
        stepsize: f32,
        cells: Range<usize>,
        out: &mut [&mut [f32]],
    ) -> VdsResult<()>;

    /// Resample `secondary` onto `primary` and check it against the
    /// vertical axis
    fn align_surfaces(
        &self,
        primary: &RegularSurface,
        secondary: &RegularSurface,
    ) -> VdsResult<Alignment> {
        let alignment = surface::align(primary, secondary)?;
        let sample = &self.metadata().sample;

        let aligned = &alignment.aligned;
        for (i, &value) in aligned.values().iter().enumerate() {
            if aligned.is_fill(i) {
                continue;
            }
            if !sample.inrange(value as f64) {
                let (row, col) = aligned.row_col(i);
                return Err(VdsError::invalid(format!(
                    "Secondary surface value {} at ({}, {}) is outside the vertical range [{}, {}]",
                    value,
                    row,
                    col,
                    sample.min,
                    sample.max()
                )));
            }
        }

        Ok(alignment)
    }

    /// Release engine resources
    fn close(&self) -> VdsResult<()> {
        Ok(())
    }
}

/// Exclusive, scoped ownership of an open data source.
///
/// The source is closed exactly once: explicitly through
/// [`DataSourceHandle::close`], or on drop if that never happened (early
/// returns, errors, panics).
pub struct DataSourceHandle {
    url: String,
    source: Box<dyn DataSource>,
    closed: bool,
}

impl DataSourceHandle {
    pub fn new(url: impl Into<String>, source: Box<dyn DataSource>) -> Self {
        Self {
            url: url.into(),
            source,
            closed: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Close the source and report the outcome
    pub fn close(mut self) -> VdsResult<()> {
        self.closed = true;
        debug!("Closing data source {}", self.url);
        self.source.close()
    }
}

impl Deref for DataSourceHandle {
    type Target = dyn DataSource;

    fn deref(&self) -> &Self::Target {
        &*self.source
    }
}

impl Drop for DataSourceHandle {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.source.close() {
            warn!("Failed to close data source {}: {}", self.url, e);
        }
    }
}

impl fmt::Debug for DataSourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceHandle")
            .field("url", &self.url)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Opens data sources on behalf of requests
#[async_trait]
pub trait Connector: Send + Sync {
    /// Check that the resource's credentials grant read access
    async fn authorize(&self, resource: &RequestedResource) -> VdsResult<()>;

    /// Open the resource for one request
    async fn open(&self, resource: &RequestedResource) -> VdsResult<DataSourceHandle>;
}
