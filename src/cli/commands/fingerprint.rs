//! Fingerprint command - print cache keys

use super::load_request;
use crate::cache::Fingerprint;
use crate::cli::args::FingerprintArgs;
use crate::error::VdsResult;

/// Execute the fingerprint command
pub async fn execute(args: FingerprintArgs) -> VdsResult<()> {
    for path in &args.requests {
        let mut request = load_request(path).await?;
        request.resource_mut().normalize()?;
        println!("{}  {}", request.fingerprint()?, path.display());
    }
    Ok(())
}
