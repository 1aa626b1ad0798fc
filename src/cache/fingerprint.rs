//! Request fingerprints
//!
//! A fingerprint is the SHA-256 of a canonical JSON encoding of everything in
//! a request that affects its result. Credentials (`sas`) are left out, so two
//! callers asking the same question with different tokens share a cache entry.
//! Optional fields are encoded with an explicit presence flag, which keeps
//! "absent" apart from "present with a zero value".

use crate::error::{VdsError, VdsResult};
use crate::request::{
    AttributeAlongSurfaceRequest, AttributeBetweenSurfacesRequest, AttributeRequest,
    SurfaceRequest,
};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Cache key derived from a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Hash a canonical encoding into a key
    pub fn digest(canonical: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Something that can be reduced to a cache key
pub trait Fingerprint {
    /// Credential-free, deterministic encoding of the request
    fn canonical_bytes(&self) -> VdsResult<Vec<u8>>;

    fn fingerprint(&self) -> VdsResult<CacheKey> {
        Ok(CacheKey::digest(&self.canonical_bytes()?))
    }
}

/// Floats without a canonical encoding (NaN, infinities) fail serialization
struct F32(f32);

impl Serialize for F32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.0.is_finite() {
            return Err(S::Error::custom(format!(
                "non-finite value {} cannot be fingerprinted",
                self.0
            )));
        }
        serializer.serialize_f32(self.0)
    }
}

struct F64(f64);

impl Serialize for F64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.0.is_finite() {
            return Err(S::Error::custom(format!(
                "non-finite value {} cannot be fingerprinted",
                self.0
            )));
        }
        serializer.serialize_f64(self.0)
    }
}

struct Grid<'a>(&'a [Vec<f32>]);

impl Serialize for Grid<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.0
                .iter()
                .map(|row| row.iter().map(|&v| F32(v)).collect::<Vec<_>>()),
        )
    }
}

#[derive(Serialize)]
struct Flagged<T> {
    present: bool,
    value: T,
}

impl<T> Flagged<T> {
    fn from_option(value: Option<T>, absent: T) -> Self {
        match value {
            Some(value) => Self {
                present: true,
                value,
            },
            None => Self {
                present: false,
                value: absent,
            },
        }
    }
}

#[derive(Serialize)]
struct CanonicalSurface<'a> {
    values: Grid<'a>,
    rotation: F64,
    xori: F64,
    yori: F64,
    xinc: F64,
    yinc: F64,
    fill_value: Flagged<F32>,
}

impl<'a> From<&'a SurfaceRequest> for CanonicalSurface<'a> {
    fn from(s: &'a SurfaceRequest) -> Self {
        Self {
            values: Grid(&s.values),
            rotation: F64(s.rotation),
            xori: F64(s.xori),
            yori: F64(s.yori),
            xinc: F64(s.xinc),
            yinc: F64(s.yinc),
            fill_value: Flagged::from_option(s.fill_value.map(F32), F32(0.0)),
        }
    }
}

#[derive(Serialize)]
struct CanonicalBase<'a> {
    vds: &'a [String],
    binary_operator: Flagged<&'a str>,
    interpolation: &'a str,
    stepsize: F32,
    attributes: &'a [String],
}

impl<'a> From<&'a AttributeRequest> for CanonicalBase<'a> {
    fn from(r: &'a AttributeRequest) -> Self {
        Self {
            vds: &r.resource.vds,
            binary_operator: Flagged::from_option(r.resource.binary_operator.as_deref(), ""),
            interpolation: &r.interpolation,
            stepsize: F32(r.stepsize),
            attributes: &r.attributes,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum CanonicalRequest<'a> {
    Along {
        base: CanonicalBase<'a>,
        surface: CanonicalSurface<'a>,
        above: F32,
        below: F32,
    },
    Between {
        base: CanonicalBase<'a>,
        primary: CanonicalSurface<'a>,
        secondary: CanonicalSurface<'a>,
    },
}

impl CanonicalRequest<'_> {
    fn encode(&self) -> VdsResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(VdsError::Fingerprint)
    }
}

impl Fingerprint for AttributeAlongSurfaceRequest {
    fn canonical_bytes(&self) -> VdsResult<Vec<u8>> {
        CanonicalRequest::Along {
            base: (&self.base).into(),
            surface: (&self.surface).into(),
            above: F32(self.above),
            below: F32(self.below),
        }
        .encode()
    }
}

impl Fingerprint for AttributeBetweenSurfacesRequest {
    fn canonical_bytes(&self) -> VdsResult<Vec<u8>> {
        CanonicalRequest::Between {
            base: (&self.base).into(),
            primary: (&self.primary_surface).into(),
            secondary: (&self.secondary_surface).into(),
        }
        .encode()
    }
}
