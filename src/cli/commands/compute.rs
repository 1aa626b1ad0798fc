//! Along and between commands - compute attribute maps

use super::load_request;
use crate::cli::args::{ComputeArgs, OutputFormat};
use crate::config::Config;
use crate::engine::decode_map;
use crate::error::{VdsError, VdsResult};
use crate::request::ResponseMetadata;
use crate::service::{AttributeService, Served};
use crate::volume::{Connector, LocalConnector};
use console::style;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Values shown per attribute in the summary
const SUMMARY_VALUES: usize = 8;

/// Execute the along or between command
pub async fn execute(kind: &str, args: ComputeArgs, config: &Config) -> VdsResult<()> {
    let connector: Arc<dyn Connector> = match args.token {
        Some(token) => Arc::new(LocalConnector::with_token(token)),
        None => Arc::new(LocalConnector::new()),
    };
    let service = AttributeService::from_config(config, connector)?;

    let mut reports = Vec::new();
    for path in &args.requests {
        let request = load_request(path).await?;
        if request.kind() != kind {
            return Err(VdsError::invalid(format!(
                "{} is a '{}' request, expected '{}'",
                path.display(),
                request.kind(),
                kind
            )));
        }

        let names = request.attributes().to_vec();
        let served = service.dispatch(request).await?;
        let metadata: ResponseMetadata = serde_json::from_slice(served.entry.metadata())?;

        match args.format {
            OutputFormat::Summary => print_summary(path, kind, &names, &metadata, &served),
            OutputFormat::Json => reports.push(json!({
                "request": path.display().to_string(),
                "cache_hit": served.cache_hit,
                "key": served.key.map(|k| k.to_string()),
                "metadata": metadata,
                "attributes": names
                    .iter()
                    .zip(served.entry.data())
                    .map(|(name, map)| json!({ "name": name, "values": decode_map(map) }))
                    .collect::<Vec<_>>(),
            })),
        }
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    service.shutdown();
    Ok(())
}

fn print_summary(
    path: &Path,
    kind: &str,
    names: &[String],
    metadata: &ResponseMetadata,
    served: &Served,
) {
    let cache = if served.cache_hit {
        style("hit").green()
    } else {
        style("miss").dim()
    };
    let key = served
        .key
        .map(|k| k.to_string()[..12].to_string())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{} {}  {}  {}x{}  cache {}  key {}",
        style("✓").green(),
        path.display(),
        kind,
        metadata.shape[0],
        metadata.shape[1],
        cache,
        style(key).dim()
    );

    let width = names.iter().map(String::len).max().unwrap_or(0);
    for (name, map) in names.iter().zip(served.entry.data()) {
        let values = decode_map(map);
        let mut shown: Vec<String> = values
            .iter()
            .take(SUMMARY_VALUES)
            .map(|v| v.to_string())
            .collect();
        if values.len() > SUMMARY_VALUES {
            shown.push(format!("... ({} more)", values.len() - SUMMARY_VALUES));
        }
        println!(
            "  {} {:width$}  {}",
            style("•").cyan(),
            name,
            shown.join(" "),
            width = width
        );
    }
}
