//! Attribute kinds, interpolation methods and window statistics
//!
//! Attribute and interpolation names are resolved once, when a request is
//! validated, into closed enums. Everything downstream works on the enums.

use crate::error::{VdsError, VdsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Statistic computed over the vertical window at one grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Resampled value at the reference sample
    #[serde(rename = "samplevalue")]
    SampleValue,
    Min,
    /// Vertical position of the minimum
    MinAt,
    Max,
    MaxAt,
    #[serde(rename = "maxabs")]
    MaxAbs,
    #[serde(rename = "maxabs_at")]
    MaxAbsAt,
    Mean,
    #[serde(rename = "meanabs")]
    MeanAbs,
    #[serde(rename = "meanpos")]
    MeanPos,
    #[serde(rename = "meanneg")]
    MeanNeg,
    Median,
    Rms,
    /// Population variance
    Var,
    /// Population standard deviation
    Sd,
    #[serde(rename = "sumpos")]
    SumPos,
    #[serde(rename = "sumneg")]
    SumNeg,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 17] = [
        Self::SampleValue,
        Self::Min,
        Self::MinAt,
        Self::Max,
        Self::MaxAt,
        Self::MaxAbs,
        Self::MaxAbsAt,
        Self::Mean,
        Self::MeanAbs,
        Self::MeanPos,
        Self::MeanNeg,
        Self::Median,
        Self::Rms,
        Self::Var,
        Self::Sd,
        Self::SumPos,
        Self::SumNeg,
    ];

    /// Name as accepted in requests
    pub fn name(&self) -> &'static str {
        match self {
            Self::SampleValue => "samplevalue",
            Self::Min => "min",
            Self::MinAt => "min_at",
            Self::Max => "max",
            Self::MaxAt => "max_at",
            Self::MaxAbs => "maxabs",
            Self::MaxAbsAt => "maxabs_at",
            Self::Mean => "mean",
            Self::MeanAbs => "meanabs",
            Self::MeanPos => "meanpos",
            Self::MeanNeg => "meanneg",
            Self::Median => "median",
            Self::Rms => "rms",
            Self::Var => "var",
            Self::Sd => "sd",
            Self::SumPos => "sumpos",
            Self::SumNeg => "sumneg",
        }
    }

    /// Compute this attribute over a resampled window
    pub fn compute(&self, window: &Window<'_>) -> f32 {
        let values = window.values;
        let n = values.len() as f64;

        let value = match self {
            Self::SampleValue => values[window.reference_index],
            Self::Min => values[first_extreme(values, |a, b| a < b)],
            Self::MinAt => window.position(first_extreme(values, |a, b| a < b)),
            Self::Max => values[first_extreme(values, |a, b| a > b)],
            Self::MaxAt => window.position(first_extreme(values, |a, b| a > b)),
            Self::MaxAbs => values[first_extreme(values, |a, b| a.abs() > b.abs())].abs(),
            Self::MaxAbsAt => window.position(first_extreme(values, |a, b| a.abs() > b.abs())),
            Self::Mean => values.iter().sum::<f64>() / n,
            Self::MeanAbs => values.iter().map(|v| v.abs()).sum::<f64>() / n,
            Self::MeanPos => mean_where(values, |v| v > 0.0),
            Self::MeanNeg => mean_where(values, |v| v < 0.0),
            Self::Median => median(values),
            Self::Rms => (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt(),
            Self::Var => variance(values),
            Self::Sd => variance(values).sqrt(),
            Self::SumPos => values.iter().filter(|&&v| v > 0.0).sum(),
            Self::SumNeg => values.iter().filter(|&&v| v < 0.0).sum(),
        };

        value as f32
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttributeKind {
    type Err = VdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Self::ALL
            .iter()
            .find(|kind| kind.name() == lowered)
            .copied()
            .ok_or_else(|| {
                let options: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                VdsError::invalid(format!(
                    "invalid attribute '{}', valid options are: {}",
                    s,
                    options.join(", ")
                ))
            })
    }
}

/// Resolve requested attribute names, preserving order
pub fn parse_attributes(names: &[String]) -> VdsResult<Vec<AttributeKind>> {
    if names.is_empty() {
        return Err(VdsError::invalid("At least one attribute must be requested"));
    }
    names.iter().map(|name| name.parse()).collect()
}

/// Interpolation method, used horizontally and when resampling traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Nearest,
    Linear,
    Cubic,
    Angular,
    Triangular,
}

impl Interpolation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::Cubic => "cubic",
            Self::Angular => "angular",
            Self::Triangular => "triangular",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Interpolation {
    type Err = VdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "nearest" => Ok(Self::Nearest),
            "linear" => Ok(Self::Linear),
            "cubic" => Ok(Self::Cubic),
            "angular" => Ok(Self::Angular),
            "triangular" => Ok(Self::Triangular),
            _ => Err(VdsError::invalid(format!(
                "invalid interpolation method '{}', valid options are: \
                 nearest, linear, cubic, angular or triangular",
                s
            ))),
        }
    }
}

/// Resampled samples of one vertical window
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    /// Sample values, top to bottom
    pub values: &'a [f64],
    /// Index of the sample at the reference depth
    pub reference_index: usize,
    /// Vertical position of `values[0]`
    pub top_position: f64,
    /// Distance between consecutive samples
    pub stepsize: f64,
}

impl Window<'_> {
    fn position(&self, index: usize) -> f64 {
        self.top_position + index as f64 * self.stepsize
    }
}

/// Index of the first element that `better` prefers over all earlier ones
fn first_extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if better(v, values[best]) {
            best = i;
        }
    }
    best
}

fn mean_where(values: &[f64], keep: impl Fn(f64) -> bool) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|&&v| keep(v))
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

/// Mean of the two central order statistics for even lengths
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
