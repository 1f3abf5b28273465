//! Specification discovery, parsing, structural checks and base URL selection.

use crate::config::{DEFAULT_LOCAL_BASE_URL, EngineConfig};
use crate::error::{OpenApiToolsError, Result};
use crate::generator::reserve_unique_name;
use crate::model::{SpecKind, Specification};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const SPEC_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Load every specification under `config.openapi_dir`.
///
/// Files that fail to read, parse or pass the structural check are logged and skipped. A missing
/// directory yields an empty list.
#[must_use]
pub fn load_all(config: &EngineConfig) -> Vec<Specification> {
    let dir = &config.openapi_dir;
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "spec directory does not exist");
        return Vec::new();
    }

    let files = match discover_files(dir) {
        Ok(files) => files,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to scan spec directory");
            return Vec::new();
        }
    };

    let mut names: HashSet<String> = HashSet::new();
    let mut specs = Vec::new();
    for file in files {
        let stem = file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("spec")
            .to_string();
        let name = reserve_unique_name(&mut names, &stem);
        match load_file(&file, &name, config) {
            Ok(spec) => {
                info!(
                    spec = %spec.name,
                    file = %file.display(),
                    base_url = %spec.base_url,
                    "loaded specification"
                );
                specs.push(spec);
            }
            Err(e) => {
                names.remove(&name);
                warn!(file = %file.display(), error = %e, "skipping specification");
            }
        }
    }
    specs
}

/// Recursively list spec files under `dir`, sorted by path.
///
/// # Errors
///
/// Returns an error if `dir` itself cannot be read. Unreadable subdirectories are skipped.
pub fn discover_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    let mut first = true;

    while let Some(current) = pending.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(source) if first => {
                return Err(crate::error::OpenApiToolsError::SpecRead {
                    path: current.display().to_string(),
                    source,
                });
            }
            Err(e) => {
                warn!(dir = %current.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        first = false;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if has_spec_extension(&path) {
                out.push(path);
            }
        }
    }

    out.sort();
    Ok(out)
}

fn has_spec_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            SPEC_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Read, parse and check one document.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or fails the structural check.
pub fn load_file(path: &Path, name: &str, config: &EngineConfig) -> Result<Specification> {
    let content = std::fs::read_to_string(path).map_err(|source| OpenApiToolsError::SpecRead {
        path: path.display().to_string(),
        source,
    })?;
    let document = parse_document(path, &content)?;
    let kind = check_structure(path, &document)?;

    let info = document.get("info");
    let (title, version) = info_title_version(info);
    let base_url = effective_base_url(name, kind, &document, config);

    debug!(spec = %name, ?kind, "spec passed structural check");

    Ok(Specification {
        name: name.to_string(),
        kind,
        title,
        version,
        base_url,
        file: path.to_path_buf(),
        document: Arc::new(document),
    })
}

/// Parse YAML or JSON into a JSON value.
///
/// # Errors
///
/// Returns an error if the content is neither valid YAML nor JSON.
pub fn parse_document(path: &Path, content: &str) -> Result<Value> {
    serde_yaml::from_str::<Value>(content).map_err(|source| OpenApiToolsError::SpecParse {
        path: path.display().to_string(),
        source,
    })
}

/// Minimal sanity check: a mapping declaring OpenAPI 3.x or Swagger 2.0.
///
/// # Errors
///
/// Returns an error describing the first structural problem found.
pub fn check_structure(path: &Path, document: &Value) -> Result<SpecKind> {
    let invalid = |reason: &str| OpenApiToolsError::InvalidSpec {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let root = document
        .as_object()
        .ok_or_else(|| invalid("document root is not a mapping"))?;

    let kind = if let Some(v) = root.get("openapi") {
        if !version_starts_with(v, "3") {
            return Err(invalid("unsupported 'openapi' version (expected 3.x)"));
        }
        SpecKind::OpenApi3
    } else if let Some(v) = root.get("swagger") {
        if !version_starts_with(v, "2") {
            return Err(invalid("unsupported 'swagger' version (expected 2.0)"));
        }
        SpecKind::Swagger2
    } else {
        return Err(invalid("missing 'openapi' or 'swagger' version field"));
    };

    if let Some(paths) = root.get("paths")
        && !paths.is_object()
        && !paths.is_null()
    {
        return Err(invalid("'paths' is not a mapping"));
    }
    if let Some(info) = root.get("info")
        && !info.is_object()
    {
        return Err(invalid("'info' is not a mapping"));
    }

    Ok(kind)
}

fn version_starts_with(v: &Value, major: &str) -> bool {
    match v {
        Value::String(s) => s.trim() == major || s.trim().starts_with(&format!("{major}.")),
        Value::Number(n) => n.to_string().starts_with(major),
        _ => false,
    }
}

fn info_title_version(info: Option<&Value>) -> (Option<String>, Option<String>) {
    let Some(info) = info else {
        return (None, None);
    };
    if let Ok(parsed) = serde_json::from_value::<openapiv3::Info>(info.clone()) {
        return (Some(parsed.title), Some(parsed.version));
    }
    let field = |k: &str| info.get(k).and_then(Value::as_str).map(str::to_string);
    (field("title"), field("version"))
}

/// Pick the base URL for `name`.
///
/// Precedence: per-spec override, global override, mock-all, document servers, local default.
#[must_use]
pub fn effective_base_url(
    name: &str,
    kind: SpecKind,
    document: &Value,
    config: &EngineConfig,
) -> String {
    if let Some(url) = config.base_url_override(name) {
        return normalize_base(url);
    }
    if let Some(url) = config
        .force_base_url
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        return normalize_base(url);
    }
    if config.mock_all {
        return normalize_base(&config.mock_api_base_url);
    }
    let declared = match kind {
        SpecKind::OpenApi3 => openapi3_server_url(document),
        SpecKind::Swagger2 => swagger2_server_url(document),
    };
    match declared {
        Some(url) => absolutize(&url),
        None => DEFAULT_LOCAL_BASE_URL.to_string(),
    }
}

fn openapi3_server_url(document: &Value) -> Option<String> {
    let first = document.get("servers")?.as_array()?.first()?;
    let server: openapiv3::Server = match serde_json::from_value(first.clone()) {
        Ok(s) => s,
        Err(_) => {
            let url = first.get("url")?.as_str()?;
            return (!url.trim().is_empty()).then(|| url.to_string());
        }
    };

    let mut url = server.url;
    if let Some(vars) = &server.variables {
        for (var, def) in vars {
            url = url.replace(&format!("{{{var}}}"), &def.default);
        }
    }
    (!url.trim().is_empty()).then_some(url)
}

fn swagger2_server_url(document: &Value) -> Option<String> {
    let host = document.get("host").and_then(Value::as_str);
    let base_path = document
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let Some(host) = host.filter(|h| !h.trim().is_empty()) else {
        return (!base_path.is_empty()).then(|| base_path.to_string());
    };

    let https = document
        .get("schemes")
        .and_then(Value::as_array)
        .is_some_and(|s| s.iter().any(|v| v.as_str() == Some("https")));
    let scheme = if https { "https" } else { "http" };

    let base_path = if base_path.is_empty() || base_path.starts_with('/') {
        base_path.to_string()
    } else {
        format!("/{base_path}")
    };
    Some(format!("{scheme}://{host}{base_path}"))
}

/// Make a declared server URL absolute; relative URLs are joined onto the local default.
fn absolutize(url: &str) -> String {
    if let Ok(u) = Url::parse(url)
        && u.has_host()
    {
        return normalize_base(url);
    }
    if let Some(rest) = url.strip_prefix("//") {
        return normalize_base(&format!("http://{rest}"));
    }
    match Url::parse(DEFAULT_LOCAL_BASE_URL).and_then(|base| base.join(url)) {
        Ok(joined) => normalize_base(joined.as_str()),
        Err(e) => {
            warn!(url = %url, error = %e, "unusable server URL; using local default");
            DEFAULT_LOCAL_BASE_URL.to_string()
        }
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
