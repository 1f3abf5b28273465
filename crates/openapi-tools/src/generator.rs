//! Synthesizes one [`ToolDescriptor`] per operation of every loaded specification.

use crate::model::{ParamLocation, ParameterDescriptor, SpecKind, Specification, ToolDescriptor};
use crate::resolver::LocalResolver;
use reqwest::Method;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Methods turned into tools, in discovery order.
const TOOL_METHODS: [&str; 5] = ["get", "post", "put", "patch", "delete"];

/// Nesting limit when merging `allOf` members of a body schema.
const MAX_ALL_OF_DEPTH: usize = 8;

/// Longest tool name handed to callers. Agent runtimes commonly reject longer function names.
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// Longest spec-name prefix kept in a shortened tool name.
const SHORT_SPEC_LEN: usize = 20;

/// Hex digits of the full-name digest appended to a shortened tool name.
const NAME_DIGEST_LEN: usize = 8;

/// Generate tools for all `specs`; names are unique across the whole set.
#[must_use]
pub fn generate(specs: &[Specification]) -> Vec<ToolDescriptor> {
    let mut names: HashSet<String> = HashSet::new();
    let mut tools = Vec::new();
    for spec in specs {
        let before = tools.len();
        tools.extend(generate_for_spec(spec, &mut names));
        debug!(spec = %spec.name, tools = tools.len() - before, "generated tools");
    }
    tools
}

/// Generate the tools for one specification, reserving names in `names`.
pub fn generate_for_spec(spec: &Specification, names: &mut HashSet<String>) -> Vec<ToolDescriptor> {
    let doc = spec.document.as_ref();
    let resolver = LocalResolver::new(doc);
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut tools = Vec::new();
    for (path, item) in paths {
        let Some(item) = resolver.resolve_lenient(item).filter(|v| v.is_object()) else {
            warn!(spec = %spec.name, path = %path, "skipping unresolvable path item");
            continue;
        };
        let path_params = item
            .get("parameters")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for method in TOOL_METHODS {
            let Some(op) = item.get(method).filter(|v| v.is_object()) else {
                continue;
            };
            tools.push(build_tool(spec, &resolver, path, method, op, path_params, names));
        }
    }
    tools
}

fn build_tool<'a>(
    spec: &Specification,
    resolver: &LocalResolver<'a>,
    path: &str,
    method: &str,
    op: &'a Value,
    path_params: &'a [Value],
    names: &mut HashSet<String>,
) -> ToolDescriptor {
    let operation_id = op
        .get("operationId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let operation_part = match &operation_id {
        Some(id) => id.clone(),
        None => format!("{}_{}", method, sanitize_path(path)),
    };
    let base = compose_tool_name(
        &sanitize_identifier(&spec.name),
        &sanitize_identifier(&operation_part),
    );
    let name = reserve_unique_name(names, &base);

    let tags = op
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let op_params = op
        .get("parameters")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let parameters = collect_parameters(spec, resolver, &name, path_params, op_params, op);

    ToolDescriptor {
        name,
        method: http_method(method),
        path: path.to_string(),
        description: tool_description(op, method, path),
        spec_name: spec.name.clone(),
        operation_id,
        tags,
        parameters,
    }
}

fn http_method(method: &str) -> Method {
    match method {
        "post" => Method::POST,
        "put" => Method::PUT,
        "patch" => Method::PATCH,
        "delete" => Method::DELETE,
        _ => Method::GET,
    }
}

/// Non-empty summary and description joined by `" - "`, else `"{METHOD} {path}"`.
#[must_use]
pub fn tool_description(op: &Value, method: &str, path: &str) -> String {
    let parts: Vec<&str> = ["summary", "description"]
        .iter()
        .filter_map(|k| op.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        format!("{} {}", method.to_uppercase(), path)
    } else {
        parts.join(" - ")
    }
}

/// Path fragment used in generated tool names: `/users/{id}/mail-box` -> `users_id_mail_box`.
#[must_use]
pub fn sanitize_path(path: &str) -> String {
    let cleaned: String = path
        .trim_matches('/')
        .chars()
        .filter(|c| *c != '{' && *c != '}')
        .map(|c| if c == '/' || c == '-' { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "root".to_string()
    } else {
        cleaned
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
#[must_use]
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `{spec}_{operation}`, or a shortened form when that exceeds [`MAX_TOOL_NAME_LEN`].
///
/// The shortened form keeps at most [`SHORT_SPEC_LEN`] characters of the spec part, as much of
/// the operation part as fits, and the first [`NAME_DIGEST_LEN`] hex digits of the SHA-256 of
/// the full name. Both inputs must already be sanitized (ASCII only).
#[must_use]
pub fn compose_tool_name(spec: &str, operation: &str) -> String {
    let full = format!("{spec}_{operation}");
    if full.len() <= MAX_TOOL_NAME_LEN {
        return full;
    }

    let digest = hex::encode(Sha256::digest(full.as_bytes()));
    let spec_part = spec.get(..spec.len().min(SHORT_SPEC_LEN)).unwrap_or(spec);
    let room = MAX_TOOL_NAME_LEN.saturating_sub(spec_part.len() + NAME_DIGEST_LEN + 2);
    let operation_part = operation
        .get(..operation.len().min(room))
        .unwrap_or_default()
        .trim_end_matches('_');
    let short = format!("{spec_part}_{operation_part}_{}", &digest[..NAME_DIGEST_LEN]);
    debug!(full = %full, short = %short, "shortened tool name");
    short
}

/// Insert `base` into `taken`, suffixing `_1`, `_2`, ... until it is unique.
///
/// Suffixed names are kept within [`MAX_TOOL_NAME_LEN`] by trimming `base`.
pub fn reserve_unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 1;
    loop {
        let suffix = format!("_{counter}");
        let keep = base.len().min(MAX_TOOL_NAME_LEN.saturating_sub(suffix.len()));
        let candidate = format!("{}{suffix}", base.get(..keep).unwrap_or(base));
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Path-item parameters overlaid with operation parameters; the operation wins on the same
/// `(in, name)`. Unresolvable entries are dropped.
fn merge_parameters<'a>(
    resolver: &LocalResolver<'a>,
    path_params: &'a [Value],
    op_params: &'a [Value],
) -> Vec<&'a Value> {
    let mut merged: Vec<&'a Value> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for p in path_params.iter().chain(op_params) {
        let Some(rp) = resolver.resolve_lenient(p) else {
            continue;
        };
        let key = (
            rp.get("in").and_then(Value::as_str).unwrap_or_default().to_string(),
            rp.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        );
        if let Some(i) = index.get(&key).copied() {
            merged[i] = rp;
        } else {
            index.insert(key, merged.len());
            merged.push(rp);
        }
    }
    merged
}

fn collect_parameters<'a>(
    spec: &Specification,
    resolver: &LocalResolver<'a>,
    tool_name: &str,
    path_params: &'a [Value],
    op_params: &'a [Value],
    op: &'a Value,
) -> Vec<ParameterDescriptor> {
    let mut parameters: Vec<ParameterDescriptor> = Vec::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut swagger_body: Option<&'a Value> = None;

    for p in merge_parameters(resolver, path_params, op_params) {
        let Some(name) = p.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = match p.get("in").and_then(Value::as_str) {
            Some("path") => ParamLocation::Path,
            Some("query") => ParamLocation::Query,
            Some("header") => ParamLocation::Header,
            Some("body") if spec.kind == SpecKind::Swagger2 => {
                swagger_body = Some(p);
                continue;
            }
            other => {
                debug!(
                    tool = %tool_name,
                    param = %name,
                    location = ?other,
                    "skipping unsupported parameter location"
                );
                continue;
            }
        };

        if !taken.insert(name.to_string()) {
            warn!(tool = %tool_name, param = %name, "duplicate parameter name; keeping the first");
            continue;
        }

        let schema = parameter_schema(resolver, p);
        let required = location == ParamLocation::Path
            || p.get("required").and_then(Value::as_bool).unwrap_or(false);
        let mut descriptor = ParameterDescriptor::from_schema(name, location, required, &schema);
        if let Some(desc) = p.get("description").and_then(Value::as_str) {
            descriptor.description = Some(desc.to_string());
        }
        parameters.push(descriptor);
    }

    let body = match spec.kind {
        SpecKind::OpenApi3 => openapi3_body(resolver, op),
        SpecKind::Swagger2 => swagger_body.and_then(|p| {
            let schema = resolver.resolve_lenient(p.get("schema")?)?;
            let required = p.get("required").and_then(Value::as_bool).unwrap_or(false);
            Some(JsonBody {
                schema,
                required,
                swagger: true,
            })
        }),
    };

    if let Some(body) = body {
        for descriptor in body_parameters(resolver, &body) {
            if !taken.insert(descriptor.name.clone()) {
                warn!(
                    tool = %tool_name,
                    param = %descriptor.name,
                    "body property collides with an existing parameter; skipping"
                );
                continue;
            }
            parameters.push(descriptor);
        }
    }

    parameters
}

/// Resolved schema of a non-body parameter.
///
/// OpenAPI 3 uses `schema` (or `content`); Swagger 2 puts the schema keywords on the parameter.
fn parameter_schema<'a>(resolver: &LocalResolver<'a>, p: &'a Value) -> Value {
    if let Some(schema) = p.get("schema") {
        return resolver.resolve_lenient(schema).cloned().unwrap_or_else(|| json!({}));
    }
    if let Some(content) = p.get("content").and_then(Value::as_object) {
        return content
            .values()
            .find_map(|media| media.get("schema"))
            .and_then(|s| resolver.resolve_lenient(s))
            .cloned()
            .unwrap_or_else(|| json!({}));
    }
    p.clone()
}

struct JsonBody<'a> {
    schema: &'a Value,
    required: bool,
    swagger: bool,
}

fn is_json_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn openapi3_body<'a>(resolver: &LocalResolver<'a>, op: &'a Value) -> Option<JsonBody<'a>> {
    let body = resolver.resolve_lenient(op.get("requestBody")?)?;
    let content = body.get("content")?.as_object()?;
    let media = content
        .get("application/json")
        .or_else(|| {
            content
                .iter()
                .find(|(k, _)| is_json_media_type(k))
                .map(|(_, v)| v)
        })?;
    let schema = resolver.resolve_lenient(media.get("schema")?)?;
    Some(JsonBody {
        schema,
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        swagger: false,
    })
}

fn body_parameters<'a>(
    resolver: &LocalResolver<'a>,
    body: &JsonBody<'a>,
) -> Vec<ParameterDescriptor> {
    let mut properties: Map<String, Value> = Map::new();
    let mut required: HashSet<String> = HashSet::new();
    collect_object_properties(resolver, body.schema, &mut properties, &mut required, 0);

    if properties.is_empty() {
        let is_object = body.schema.get("type").and_then(Value::as_str) == Some("object");
        if is_object {
            return Vec::new();
        }
        let mut raw = ParameterDescriptor::from_schema(
            "body",
            ParamLocation::Body,
            body.required,
            body.schema,
        );
        raw.raw_body = true;
        return vec![raw];
    }

    properties
        .into_iter()
        .map(|(name, schema)| {
            let listed = required.contains(&name);
            let is_required = if body.swagger {
                listed
            } else {
                listed && body.required
            };
            ParameterDescriptor::from_schema(name, ParamLocation::Body, is_required, &schema)
        })
        .collect()
}

fn collect_object_properties<'a>(
    resolver: &LocalResolver<'a>,
    schema: &'a Value,
    properties: &mut Map<String, Value>,
    required: &mut HashSet<String>,
    depth: usize,
) {
    if depth > MAX_ALL_OF_DEPTH {
        return;
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            let resolved = resolver
                .resolve_lenient(prop)
                .cloned()
                .unwrap_or_else(|| json!({}));
            properties.entry(name.clone()).or_insert(resolved);
        }
    }
    if let Some(req) = schema.get("required").and_then(Value::as_array) {
        required.extend(req.iter().filter_map(Value::as_str).map(str::to_string));
    }
    if let Some(members) = schema.get("allOf").and_then(Value::as_array) {
        for member in members {
            if let Some(member) = resolver.resolve_lenient(member) {
                collect_object_properties(resolver, member, properties, required, depth + 1);
            }
        }
    }
}
