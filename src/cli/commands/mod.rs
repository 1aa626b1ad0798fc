//! CLI command implementations

pub mod compute;
pub mod config;
pub mod fingerprint;

pub use compute::execute as compute;
pub use config::execute as config;
pub use fingerprint::execute as fingerprint;

use crate::error::{VdsError, VdsResult};
use crate::request::Request;
use std::path::Path;
use tokio::fs;

/// Read and parse one request file
async fn load_request(path: &Path) -> VdsResult<Request> {
    let body = fs::read_to_string(path)
        .await
        .map_err(|e| VdsError::io(format!("reading request {}", path.display()), e))?;
    Request::from_json(&body)
}
