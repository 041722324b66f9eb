//! HTTP client for the Soli package registry.
//!
//! Only the read side is covered: listing a package's releases and looking
//! up where a release can be downloaded. Installing is left to the external
//! installer (see [`super::installer`]).

use serde::Deserialize;
use serde_json::Value;

use super::requirement::{select_release, Requirement};

/// Default registry URL.
pub const DEFAULT_REGISTRY: &str = "https://ilos.solisoft.net";

const USER_AGENT: &str = "soli-require";

/// Version metadata returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    /// Download URL for the package tarball
    pub download_url: String,
}

/// List the releases of `name`, most recent first.
///
/// GET {registry}/api/packages/{name}
pub fn fetch_releases(registry_url: &str, name: &str) -> Result<Vec<String>, String> {
    let api_url = format!("{}/api/packages/{}", registry_url.trim_end_matches('/'), name);
    let body = get_json(&api_url)
        .map_err(|e| format!("Failed to list releases of '{}': {}", name, e))?;
    parse_releases(&body)
        .ok_or_else(|| format!("Registry response missing 'versions' for '{}'", name))
}

/// Resolve a package version from the registry.
///
/// GET {registry}/api/packages/{name}/{version}
pub fn resolve_version(
    registry_url: &str,
    name: &str,
    version: &str,
) -> Result<VersionInfo, String> {
    let api_url = format!(
        "{}/api/packages/{}/{}",
        registry_url.trim_end_matches('/'),
        name,
        version
    );
    let body = get_json(&api_url)
        .map_err(|e| format!("Failed to resolve '{}@{}' from registry: {}", name, version, e))?;
    parse_version_info(&body).ok_or_else(|| {
        format!("Registry response missing 'download_url' for '{}@{}'", name, version)
    })
}

/// Pick the release satisfying `requirement` from the registry listing.
pub fn select(registry_url: &str, requirement: &Requirement) -> Result<Option<String>, String> {
    let releases = fetch_releases(registry_url, &requirement.name)?;
    Ok(select_release(&releases, requirement).map(str::to_string))
}

fn get_json(url: &str) -> Result<Value, String> {
    let response = ureq::get(url)
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|e| e.to_string())?;

    response
        .into_json()
        .map_err(|e| format!("Failed to parse registry response: {}", e))
}

/// Extract the release list from a package listing.
///
/// Entries may be plain strings or objects carrying a `version` field.
pub fn parse_releases(body: &Value) -> Option<Vec<String>> {
    let versions = body.get("versions")?.as_array()?;
    Some(
        versions
            .iter()
            .filter_map(|entry| match entry {
                Value::String(v) => Some(v.clone()),
                Value::Object(obj) => obj.get("version")?.as_str().map(str::to_string),
                _ => None,
            })
            .collect(),
    )
}

pub fn parse_version_info(body: &Value) -> Option<VersionInfo> {
    VersionInfo::deserialize(body).ok()
}
