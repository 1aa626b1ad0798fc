//! Regular surfaces and surface alignment
//!
//! A regular surface is a 2-D grid of depth/time values positioned in world
//! space by an affine transform (origin, increments, rotation). Cells equal to
//! the surface's fill value carry no data.

use crate::error::{VdsError, VdsResult};

/// Affine placement of a grid in world coordinates.
///
/// Grid position `(row, col)` is scaled by the increments, rotated
/// counter-clockwise by `rotation` degrees and translated to the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub xori: f64,
    pub yori: f64,
    pub xinc: f64,
    pub yinc: f64,
    pub rotation: f64,
}

impl Plane {
    /// Create a plane, rejecting degenerate increments
    pub fn new(xori: f64, yori: f64, xinc: f64, yinc: f64, rotation: f64) -> VdsResult<Self> {
        let finite = [xori, yori, xinc, yinc, rotation]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(VdsError::invalid("Surface plane parameters must be finite"));
        }
        if xinc == 0.0 || yinc == 0.0 {
            return Err(VdsError::invalid(format!(
                "Surface increments must be non-zero, got xinc: {}, yinc: {}",
                xinc, yinc
            )));
        }

        Ok(Self {
            xori,
            yori,
            xinc,
            yinc,
            rotation,
        })
    }

    /// Grid position -> world coordinates
    pub fn to_world(&self, row: f64, col: f64) -> (f64, f64) {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        (
            self.xinc * cos * row - self.yinc * sin * col + self.xori,
            self.xinc * sin * row + self.yinc * cos * col + self.yori,
        )
    }

    /// World coordinates -> fractional grid position
    pub fn to_grid(&self, x: f64, y: f64) -> (f64, f64) {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let dx = x - self.xori;
        let dy = y - self.yori;
        (
            (cos * dx + sin * dy) / self.xinc,
            (-sin * dx + cos * dy) / self.yinc,
        )
    }
}

/// A 2-D grid of values positioned in world space
#[derive(Debug, Clone, PartialEq)]
pub struct RegularSurface {
    values: Vec<f32>,
    nrows: usize,
    ncols: usize,
    plane: Plane,
    fill_value: f32,
}

impl RegularSurface {
    /// Build a surface from row-major rows, which must all have equal length
    pub fn new(rows: &[Vec<f32>], plane: Plane, fill_value: f32) -> VdsResult<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);

        if nrows == 0 || ncols == 0 {
            return Err(VdsError::invalid("Surface must contain at least one value"));
        }
        if let Some(row) = rows.iter().position(|r| r.len() != ncols) {
            return Err(VdsError::invalid(format!(
                "Surface rows are not of the same length. Row 0 has {} elements, row {} has {}",
                ncols,
                row,
                rows[row].len()
            )));
        }

        let values = rows.iter().flatten().copied().collect();
        Self::from_flat(values, nrows, ncols, plane, fill_value)
    }

    /// Build a surface from a flat row-major buffer
    pub fn from_flat(
        values: Vec<f32>,
        nrows: usize,
        ncols: usize,
        plane: Plane,
        fill_value: f32,
    ) -> VdsResult<Self> {
        if values.len() != nrows * ncols || values.is_empty() {
            return Err(VdsError::invalid(format!(
                "Surface of shape ({}, {}) cannot hold {} values",
                nrows,
                ncols,
                values.len()
            )));
        }

        Ok(Self {
            values,
            nrows,
            ncols,
            plane,
            fill_value,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of cells
    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    pub fn fill_value(&self) -> f32 {
        self.fill_value
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at flat index `i`
    pub fn value(&self, i: usize) -> f32 {
        self.values[i]
    }

    /// Whether cell `i` is the "no data" sentinel
    pub fn is_fill(&self, i: usize) -> bool {
        self.values[i] == self.fill_value
    }

    /// World coordinates of cell `i`
    pub fn world_position(&self, i: usize) -> (f64, f64) {
        let row = (i / self.ncols) as f64;
        let col = (i % self.ncols) as f64;
        self.plane.to_world(row, col)
    }

    /// (row, col) of flat index `i`
    pub fn row_col(&self, i: usize) -> (usize, usize) {
        (i / self.ncols, i % self.ncols)
    }

    /// Copy of this surface with every non-fill value moved by `offset`
    pub fn shifted(&self, offset: f32) -> Self {
        let values = self
            .values
            .iter()
            .map(|&v| if v == self.fill_value { v } else { v + offset })
            .collect();
        Self {
            values,
            ..self.clone()
        }
    }

    /// Whether two surfaces share shape and placement
    pub fn same_grid(&self, other: &Self) -> bool {
        self.nrows == other.nrows && self.ncols == other.ncols && self.plane == other.plane
    }
}

/// Result of resampling a secondary surface onto a primary grid
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Secondary values on the primary grid, with the primary's fill value
    pub aligned: RegularSurface,
    /// Whether the primary surface is the shallower one
    pub primary_is_top: bool,
}

/// Tracks which surface has been above the other so far
#[derive(Default)]
struct CrossoverValidator {
    primary_above: bool,
    primary_below: bool,
}

impl CrossoverValidator {
    /// Record one cell; returns true once both orderings have been seen
    fn has_crossed(&mut self, primary: f32, secondary: f32) -> bool {
        if primary < secondary {
            self.primary_above = true;
        } else if primary > secondary {
            self.primary_below = true;
        } else {
            return false;
        }
        self.primary_above && self.primary_below
    }
}

/// Resample `secondary` onto `primary`'s grid and decide which one is on top.
///
/// Every primary cell takes the value of the nearest secondary cell. Cells
/// that are fill in either surface, or that fall outside the secondary grid,
/// become fill. Cells where the two values are equal do not decide the
/// ordering. Fails if the surfaces cross.
pub fn align(primary: &RegularSurface, secondary: &RegularSurface) -> VdsResult<Alignment> {
    let fill = primary.fill_value();
    let mut aligned = Vec::with_capacity(primary.size());
    let mut validator = CrossoverValidator::default();

    for i in 0..primary.size() {
        if primary.is_fill(i) {
            aligned.push(fill);
            continue;
        }

        let (x, y) = primary.world_position(i);
        let (row, col) = secondary.plane().to_grid(x, y);
        let row = row.round();
        let col = col.round();

        if row < 0.0
            || col < 0.0
            || row >= secondary.nrows() as f64
            || col >= secondary.ncols() as f64
        {
            aligned.push(fill);
            continue;
        }

        let j = row as usize * secondary.ncols() + col as usize;
        if secondary.is_fill(j) {
            aligned.push(fill);
            continue;
        }

        let value = secondary.value(j);
        if validator.has_crossed(primary.value(i), value) {
            let (r, c) = primary.row_col(i);
            return Err(VdsError::invalid(format!(
                "Surfaces intersect at primary surface point ({}, {})",
                r, c
            )));
        }
        aligned.push(value);
    }

    let aligned = RegularSurface::from_flat(
        aligned,
        primary.nrows(),
        primary.ncols(),
        *primary.plane(),
        fill,
    )?;

    Ok(Alignment {
        aligned,
        primary_is_top: validator.primary_above,
    })
}
