//! Request payloads
//!
//! These mirror the JSON bodies accepted by the attribute endpoints. Names are
//! kept as they appear on the wire (`fillValue`, `primarySurface`, ...).

use crate::attribute::{parse_attributes, Interpolation};
use crate::cache::Fingerprint;
use crate::engine::AttributeJob;
use crate::error::{VdsError, VdsResult};
use crate::surface::{Plane, RegularSurface};
use crate::volume::BinaryOperator;
use serde::{Deserialize, Deserializer, Serialize};

/// Fill value used when a surface does not carry one
pub const DEFAULT_FILL_VALUE: f32 = -999.25;

/// Largest accepted `above`/`below`, exclusive
pub const MAX_WINDOW_EXTENT: f32 = 250.0;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Which volume(s) to read, and the credentials to read them with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedResource {
    /// One url, or two combined under `binary_operator`
    #[serde(deserialize_with = "one_or_many")]
    pub vds: Vec<String>,

    /// One token per url, unless the urls are signed
    #[serde(default, deserialize_with = "one_or_many")]
    pub sas: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_operator: Option<String>,
}

impl RequestedResource {
    pub fn new(vds: impl Into<String>, sas: impl Into<String>) -> Self {
        Self {
            vds: vec![vds.into()],
            sas: vec![sas.into()],
            binary_operator: None,
        }
    }

    /// Bring the connection into canonical form.
    ///
    /// Signed urls (`url?token`) have their query moved into `sas`, so that a
    /// signed and an unsigned request for the same volume look identical.
    pub fn normalize(&mut self) -> VdsResult<()> {
        if self.vds.is_empty() {
            return Err(VdsError::invalid("No vds url provided"));
        }
        if self.vds.len() > 2 {
            return Err(VdsError::invalid(format!(
                "At most two vds urls can be combined, got {}",
                self.vds.len()
            )));
        }
        if let Some(i) = self.vds.iter().position(String::is_empty) {
            return Err(VdsError::invalid(format!(
                "Vds url cannot be the empty string. Vds url {} is empty",
                i + 1
            )));
        }

        // A single empty token stands for "no tokens"
        if self.sas.len() == 1 && self.sas[0].is_empty() {
            self.sas.clear();
        }

        let signed = self.vds.iter().filter(|url| url.contains('?')).count();
        if signed == self.vds.len() {
            if !self.sas.is_empty() {
                return Err(VdsError::invalid(
                    "Signed urls are not expected to be combined with sas",
                ));
            }
            let mut urls = Vec::with_capacity(self.vds.len());
            let mut tokens = Vec::with_capacity(self.vds.len());
            for url in &self.vds {
                if let Some((base, token)) = url.split_once('?') {
                    urls.push(base.to_string());
                    tokens.push(token.to_string());
                }
            }
            self.vds = urls;
            self.sas = tokens;
        } else if signed > 0 {
            return Err(VdsError::invalid(
                "Either all urls must be signed or none of them",
            ));
        } else if self.sas.len() != self.vds.len() {
            return Err(VdsError::invalid(format!(
                "Number of vds urls ({}) and sas tokens ({}) do not match",
                self.vds.len(),
                self.sas.len()
            )));
        }

        if self.binary_operator.as_deref() == Some("") {
            self.binary_operator = None;
        }
        match (self.vds.len(), &self.binary_operator) {
            (2, None) => Err(VdsError::invalid(
                "A binary operator is required when two vds urls are given",
            )),
            (1, Some(op)) => Err(VdsError::invalid(format!(
                "Binary operator '{}' given for a single vds url",
                op
            ))),
            _ => self.operator().map(|_| ()),
        }
    }

    /// Parsed binary operator, if any
    pub fn operator(&self) -> VdsResult<Option<BinaryOperator>> {
        self.binary_operator
            .as_deref()
            .map(str::parse)
            .transpose()
    }
}

/// A surface as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceRequest {
    pub values: Vec<Vec<f32>>,
    pub rotation: f64,
    pub xori: f64,
    pub yori: f64,
    pub xinc: f64,
    pub yinc: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<f32>,
}

impl SurfaceRequest {
    pub fn to_surface(&self) -> VdsResult<RegularSurface> {
        let plane = Plane::new(self.xori, self.yori, self.xinc, self.yinc, self.rotation)?;
        RegularSurface::new(
            &self.values,
            plane,
            self.fill_value.unwrap_or(DEFAULT_FILL_VALUE),
        )
    }
}

/// Fields shared by both attribute requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRequest {
    #[serde(flatten)]
    pub resource: RequestedResource,
    #[serde(default)]
    pub interpolation: String,
    #[serde(default)]
    pub stepsize: f32,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeAlongSurfaceRequest {
    #[serde(flatten)]
    pub base: AttributeRequest,
    pub surface: SurfaceRequest,
    pub above: f32,
    pub below: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeBetweenSurfacesRequest {
    #[serde(flatten)]
    pub base: AttributeRequest,
    pub primary_surface: SurfaceRequest,
    pub secondary_surface: SurfaceRequest,
}

/// A request the service knows how to fingerprint, open and compute
pub trait DataRequest: Fingerprint + Send + Sync + 'static {
    fn resource(&self) -> &RequestedResource;

    fn resource_mut(&mut self) -> &mut RequestedResource;

    /// Validate the payload and resolve it into engine terms
    fn job(&self) -> VdsResult<AttributeJob>;
}

impl DataRequest for AttributeAlongSurfaceRequest {
    fn resource(&self) -> &RequestedResource {
        &self.base.resource
    }

    fn resource_mut(&mut self) -> &mut RequestedResource {
        &mut self.base.resource
    }

    fn job(&self) -> VdsResult<AttributeJob> {
        Ok(AttributeJob::Along {
            surface: self.surface.to_surface()?,
            above: self.above,
            below: self.below,
            stepsize: self.base.stepsize,
            attributes: parse_attributes(&self.base.attributes)?,
            interpolation: self.base.interpolation.parse::<Interpolation>()?,
        })
    }
}

impl DataRequest for AttributeBetweenSurfacesRequest {
    fn resource(&self) -> &RequestedResource {
        &self.base.resource
    }

    fn resource_mut(&mut self) -> &mut RequestedResource {
        &mut self.base.resource
    }

    fn job(&self) -> VdsResult<AttributeJob> {
        Ok(AttributeJob::Between {
            primary: self.primary_surface.to_surface()?,
            secondary: self.secondary_surface.to_surface()?,
            stepsize: self.base.stepsize,
            attributes: parse_attributes(&self.base.attributes)?,
            interpolation: self.base.interpolation.parse::<Interpolation>()?,
        })
    }
}

/// Either kind of attribute request, told apart by its surface fields
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Along(AttributeAlongSurfaceRequest),
    Between(AttributeBetweenSurfacesRequest),
}

impl Request {
    pub fn from_json(body: &str) -> VdsResult<Self> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| VdsError::invalid(format!("Request is not valid JSON: {}", e)))?;

        let invalid = |e: serde_json::Error| VdsError::invalid(format!("Invalid request: {}", e));
        if value.get("surface").is_some() {
            serde_json::from_value(value).map(Self::Along).map_err(invalid)
        } else if value.get("primarySurface").is_some() {
            serde_json::from_value(value).map(Self::Between).map_err(invalid)
        } else {
            Err(VdsError::invalid(
                "Request needs either 'surface' or 'primarySurface' and 'secondarySurface'",
            ))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Along(_) => "along",
            Self::Between(_) => "between",
        }
    }

    pub fn resource_mut(&mut self) -> &mut RequestedResource {
        match self {
            Self::Along(r) => r.resource_mut(),
            Self::Between(r) => r.resource_mut(),
        }
    }

    /// Requested attribute names, in output order
    pub fn attributes(&self) -> &[String] {
        match self {
            Self::Along(r) => &r.base.attributes,
            Self::Between(r) => &r.base.attributes,
        }
    }
}

impl Fingerprint for Request {
    fn canonical_bytes(&self) -> VdsResult<Vec<u8>> {
        match self {
            Self::Along(r) => r.canonical_bytes(),
            Self::Between(r) => r.canonical_bytes(),
        }
    }
}

/// Describes the data blocks of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// (rows, columns) of every attribute map
    pub shape: [usize; 2],
    /// numpy-style dtype of the maps
    pub format: String,
}

impl ResponseMetadata {
    pub fn new(shape: [usize; 2]) -> Self {
        Self {
            shape,
            format: "<f4".to_string(),
        }
    }
}
