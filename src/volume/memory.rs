//! In-process volume engine
//!
//! `InMemoryVolume` keeps the whole sample cube in a flat `Vec<f32>` laid out
//! iline-major: `data[(il * nxl + xl) * nsamples + s]`. It implements
//! nearest and linear interpolation, horizontally and along the trace.

use super::{resampling_step, Axis, BinaryOperator, CellWindow, DataSource, SubVolume, VolumeMetadata};
use crate::attribute::{AttributeKind, Interpolation, Window};
use crate::error::{VdsError, VdsResult};
use crate::surface::{Plane, RegularSurface};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// On-disk description of a volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDocument {
    pub iline: Axis,
    pub xline: Axis,
    pub sample: Axis,
    pub plane: PlaneDocument,
    /// Samples, iline-major then xline then sample
    pub data: Vec<f32>,
}

/// Placement of the (iline, xline) index grid in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneDocument {
    pub xori: f64,
    pub yori: f64,
    pub xinc: f64,
    pub yinc: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl From<Plane> for PlaneDocument {
    fn from(plane: Plane) -> Self {
        Self {
            xori: plane.xori,
            yori: plane.yori,
            xinc: plane.xinc,
            yinc: plane.yinc,
            rotation: plane.rotation,
        }
    }
}

/// A regular volume held in memory
#[derive(Debug, Clone)]
pub struct InMemoryVolume {
    metadata: VolumeMetadata,
    data: Vec<f32>,
}

impl InMemoryVolume {
    pub fn new(metadata: VolumeMetadata, data: Vec<f32>) -> VdsResult<Self> {
        metadata.iline.validate("iline")?;
        metadata.xline.validate("xline")?;
        metadata.sample.validate("sample")?;

        let expected =
            metadata.iline.nsamples * metadata.xline.nsamples * metadata.sample.nsamples;
        if data.len() != expected {
            return Err(VdsError::invalid(format!(
                "Volume of shape ({}, {}, {}) needs {} samples, got {}",
                metadata.iline.nsamples,
                metadata.xline.nsamples,
                metadata.sample.nsamples,
                expected,
                data.len()
            )));
        }

        Ok(Self { metadata, data })
    }

    /// Build a volume from a function of (iline, xline, sample) indices
    pub fn from_fn(
        metadata: VolumeMetadata,
        f: impl Fn(usize, usize, usize) -> f32,
    ) -> VdsResult<Self> {
        let (ni, nx, ns) = (
            metadata.iline.nsamples,
            metadata.xline.nsamples,
            metadata.sample.nsamples,
        );
        let mut data = Vec::with_capacity(ni * nx * ns);
        for il in 0..ni {
            for xl in 0..nx {
                for s in 0..ns {
                    data.push(f(il, xl, s));
                }
            }
        }
        Self::new(metadata, data)
    }

    pub fn from_document(document: VolumeDocument) -> VdsResult<Self> {
        let p = document.plane;
        let metadata = VolumeMetadata {
            iline: document.iline,
            xline: document.xline,
            sample: document.sample,
            plane: Plane::new(p.xori, p.yori, p.xinc, p.yinc, p.rotation)?,
        };
        Self::new(metadata, document.data)
    }

    pub fn to_document(&self) -> VolumeDocument {
        VolumeDocument {
            iline: self.metadata.iline,
            xline: self.metadata.xline,
            sample: self.metadata.sample,
            plane: self.metadata.plane.into(),
            data: self.data.clone(),
        }
    }

    /// Element-wise combination of two volumes with identical geometry
    pub fn combine(&self, other: &Self, op: BinaryOperator) -> VdsResult<Self> {
        if self.metadata != other.metadata {
            return Err(VdsError::invalid(format!(
                "Volumes must have identical geometry to be combined with {}",
                op
            )));
        }

        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| op.apply(a, b))
            .collect();
        Ok(Self {
            metadata: self.metadata.clone(),
            data,
        })
    }

    fn sample_at(&self, il: usize, xl: usize, s: usize) -> f32 {
        let nx = self.metadata.xline.nsamples;
        let ns = self.metadata.sample.nsamples;
        self.data[(il * nx + xl) * ns + s]
    }

    /// Horizontally interpolated native samples of one cell window
    fn trace(&self, cell: &CellWindow, method: Interpolation) -> Vec<f64> {
        let range = cell.first_sample..cell.first_sample + cell.nsamples;

        match method {
            Interpolation::Linear => {
                let (il0, il1, fi) = bracket(cell.iline, self.metadata.iline.nsamples);
                let (xl0, xl1, fx) = bracket(cell.xline, self.metadata.xline.nsamples);
                range
                    .map(|s| {
                        let v00 = self.sample_at(il0, xl0, s) as f64;
                        let v01 = self.sample_at(il0, xl1, s) as f64;
                        let v10 = self.sample_at(il1, xl0, s) as f64;
                        let v11 = self.sample_at(il1, xl1, s) as f64;
                        let near = v00 + (v01 - v00) * fx;
                        let far = v10 + (v11 - v10) * fx;
                        near + (far - near) * fi
                    })
                    .collect()
            }
            _ => {
                let il = nearest(cell.iline, self.metadata.iline.nsamples);
                let xl = nearest(cell.xline, self.metadata.xline.nsamples);
                range.map(|s| self.sample_at(il, xl, s) as f64).collect()
            }
        }
    }
}

/// Nearest index, halves rounding up, clamped to the axis
fn nearest(index: f64, n: usize) -> usize {
    ((index + 0.5).floor().max(0.0) as usize).min(n - 1)
}

/// Lower and upper neighbour plus the weight of the upper one
fn bracket(index: f64, n: usize) -> (usize, usize, f64) {
    let clamped = index.clamp(0.0, (n - 1) as f64);
    let lower = clamped.floor() as usize;
    let upper = (lower + 1).min(n - 1);
    (lower, upper, clamped - lower as f64)
}

/// Value of `trace` at fractional position `t`
fn resample(trace: &[f64], t: f64, method: Interpolation) -> f64 {
    let snapped = t.round();
    let t = if (t - snapped).abs() < 1e-4 { snapped } else { t };

    match method {
        Interpolation::Linear => {
            let (lower, upper, w) = bracket(t, trace.len());
            trace[lower] + (trace[upper] - trace[lower]) * w
        }
        _ => trace[nearest(t, trace.len())],
    }
}

impl DataSource for InMemoryVolume {
    fn metadata(&self) -> &VolumeMetadata {
        &self.metadata
    }

    fn supports(&self, method: Interpolation) -> bool {
        matches!(method, Interpolation::Nearest | Interpolation::Linear)
    }

    fn build_subvolume(
        &self,
        reference: &RegularSurface,
        top: &RegularSurface,
        bottom: &RegularSurface,
    ) -> VdsResult<SubVolume> {
        if !reference.same_grid(top) || !reference.same_grid(bottom) {
            return Err(VdsError::invalid(
                "Reference, top and bottom surfaces must share the same grid",
            ));
        }

        let mut cells = Vec::with_capacity(reference.size());
        for i in 0..reference.size() {
            if reference.is_fill(i) || top.is_fill(i) || bottom.is_fill(i) {
                cells.push(None);
                continue;
            }

            let (r, t, b) = (reference.value(i), top.value(i), bottom.value(i));
            let position = reference.row_col(i);
            if !(t <= r && r <= b) {
                return Err(VdsError::invalid(format!(
                    "Surfaces are not ordered at row: {} col: {}. \
                     Expected top ({}) <= reference ({}) <= bottom ({})",
                    position.0, position.1, t, r, b
                )));
            }

            let (x, y) = reference.world_position(i);
            let (il, xl) = self.metadata.world_to_index(x, y);
            if !self.metadata.contains_index(il, xl) {
                cells.push(None);
                continue;
            }

            let cell = CellWindow::locate(&self.metadata.sample, r, t, b, (il, xl), position)?;
            cells.push(Some(cell));
        }

        Ok(SubVolume::new(cells, reference.fill_value()))
    }

    fn compute_attribute_chunk(
        &self,
        subvolume: &SubVolume,
        interpolation: Interpolation,
        attributes: &[AttributeKind],
        stepsize: f32,
        cells: Range<usize>,
        out: &mut [&mut [f32]],
    ) -> VdsResult<()> {
        if out.len() != attributes.len() || out.iter().any(|o| o.len() != cells.len()) {
            return Err(VdsError::internal(format!(
                "Output for cells {}..{} does not match {} attribute(s)",
                cells.start,
                cells.end,
                attributes.len()
            )));
        }

        let sample = &self.metadata.sample;
        let step = resampling_step(stepsize, sample);

        let mut values = Vec::new();
        for (k, i) in cells.enumerate() {
            let Some(cell) = subvolume.cell(i) else {
                for map in out.iter_mut() {
                    map[k] = subvolume.fill_value();
                }
                continue;
            };

            let trace = self.trace(cell, interpolation);
            let reference = cell.reference as f64;
            let (nabove, nbelow) = cell.steps(step).ok_or_else(|| {
                VdsError::invalid(format!("Window at cell {} holds too many samples", i))
            })?;
            let top_position = reference - nabove as f64 * step;

            values.clear();
            values.extend((0..=nabove + nbelow).map(|j| {
                let position = top_position + j as f64 * step;
                let t = sample.to_index(position) - cell.first_sample as f64;
                resample(&trace, t, interpolation)
            }));

            let window = Window {
                values: &values,
                reference_index: nabove,
                top_position,
                stepsize: step,
            };
            for (map, kind) in out.iter_mut().zip(attributes) {
                map[k] = kind.compute(&window);
            }
        }

        Ok(())
    }
}
