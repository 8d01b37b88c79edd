mod generate;
mod scan;
mod verify;

pub use generate::generate;
pub use scan::scan;
pub use verify::verify;

use std::path::Path;

use anyhow::{Context, Result};

use crate::pipeline::ProviderConfig;

/// Built-in public endpoints; a `--providers` JSON file overrides them.
pub fn load_providers(path: Option<&Path>) -> Result<ProviderConfig> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read provider config {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("parse provider config {}", path.display()))
        }
        None => Ok(ProviderConfig {
            landcover_url: "https://tiles.hexatlas.dev/worldcover/{tile}.lct.gz".into(),
            elevation_primary: "https://api.opentopodata.org/v1/srtm90m".into(),
            elevation_secondary: "https://api.open-elevation.com/api/v1/lookup".into(),
            vector_endpoint: "https://overpass-api.de/api/interpreter".into(),
            gazetteer_endpoint: "https://query.wikidata.org/sparql".into(),
            ..ProviderConfig::default()
        }),
    }
}

#[cfg(feature = "download")]
pub(crate) fn http_client() -> Result<crate::common::http::ReqwestFetch> {
    Ok(crate::common::http::ReqwestFetch::new()?)
}
