//! vdsattr - Attribute maps over volumetric seismic data
//!
//! Computes statistics over vertical windows of a 3-D volume, along one
//! surface or between two, on a bounded worker pool. Responses are cached in
//! memory under a credential-free fingerprint of the request.

pub mod attribute;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod request;
pub mod service;
pub mod surface;
pub mod volume;

pub use error::{VdsError, VdsResult};
