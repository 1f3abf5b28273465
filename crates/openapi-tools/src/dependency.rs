//! Best-effort "which tool provides this identifier" hints.
//!
//! The analysis is purely name-based (English plurals, `get`/`list`/`find` operation ids) and is
//! only used to enrich "missing required argument" errors. It never gates execution.

use crate::model::{ParamLocation, ToolDescriptor};
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEdge {
    pub tool: String,
    pub parameter: String,
    pub source_tool: String,
    pub rationale: String,
}

/// Dependent tool name -> edges, one per satisfiable identifier parameter.
pub type DependencyMap = BTreeMap<String, Vec<DependencyEdge>>;

const ID_SUFFIXES: [&str; 3] = ["_id", "_uuid", "_key"];
const BARE_IDS: [&str; 2] = ["id", "uuid"];
const LOOKUP_VERBS: [&str; 3] = ["get", "list", "find"];

#[must_use]
pub fn analyze(tools: &[Arc<ToolDescriptor>]) -> DependencyMap {
    let mut out = DependencyMap::new();

    for tool in tools {
        let mut edges = Vec::new();
        for param in &tool.parameters {
            if !matches!(param.location, ParamLocation::Path | ParamLocation::Query) {
                continue;
            }
            let Some(entity) = entity_for(&param.name, &tool.path) else {
                continue;
            };
            if let Some(source) = find_provider(tools, tool, &entity) {
                edges.push(DependencyEdge {
                    tool: tool.name.clone(),
                    parameter: param.name.clone(),
                    source_tool: source.name.clone(),
                    rationale: format!(
                        "'{}' identifies a {entity}; {} returns {entity} records",
                        param.name, source.name
                    ),
                });
            }
        }
        if !edges.is_empty() {
            out.insert(tool.name.clone(), edges);
        }
    }
    out
}

/// The entity an identifier parameter refers to, lowercased.
///
/// `account_id` -> `account`; a bare `id` takes the singularized path segment before its
/// placeholder (`/users/{id}` -> `user`).
#[must_use]
pub fn entity_for(param: &str, path: &str) -> Option<String> {
    let lower = param.to_ascii_lowercase();

    for suffix in ID_SUFFIXES {
        if let Some(stem) = lower.strip_suffix(suffix)
            && !stem.is_empty()
        {
            return Some(stem.to_string());
        }
    }

    if !BARE_IDS.contains(&lower.as_str()) {
        return None;
    }

    let placeholder = format!("{{{param}}}");
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let pos = segments.iter().position(|s| *s == placeholder)?;
    segments[..pos]
        .iter()
        .rev()
        .find(|s| !s.starts_with('{'))
        .map(|s| singularize(&s.to_ascii_lowercase()))
        .filter(|s| !s.is_empty())
}

#[must_use]
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies")
        && !stem.is_empty()
    {
        return format!("{stem}y");
    }
    for es in ["sses", "xes", "ches", "shes"] {
        if word.ends_with(es) {
            return word[..word.len() - 2].to_string();
        }
    }
    if let Some(stem) = word.strip_suffix('s')
        && !stem.ends_with('s')
        && !stem.is_empty()
    {
        return stem.to_string();
    }
    word.to_string()
}

fn find_provider<'t>(
    tools: &'t [Arc<ToolDescriptor>],
    dependent: &ToolDescriptor,
    entity: &str,
) -> Option<&'t ToolDescriptor> {
    let path_candidates = path_candidates(entity);
    let op_candidates = operation_id_candidates(entity);

    let mut best: Option<(&ToolDescriptor, (bool, usize))> = None;
    for candidate in tools {
        if candidate.name == dependent.name || candidate.method != Method::GET {
            continue;
        }
        let path = candidate.path.to_ascii_lowercase();
        let path_hit = path_candidates
            .iter()
            .any(|c| path == *c || path.ends_with(c.as_str()));
        let op_hit = candidate.operation_id.as_deref().is_some_and(|id| {
            let id = normalize(id);
            op_candidates.iter().any(|c| id == *c)
        });
        if !path_hit && !op_hit {
            continue;
        }

        // Same spec first, then the fewest required arguments.
        let rank = (
            candidate.spec_name != dependent.spec_name,
            candidate.required_parameters().count(),
        );
        if best.as_ref().is_none_or(|(_, r)| rank < *r) {
            best = Some((candidate.as_ref(), rank));
        }
    }
    best.map(|(tool, _)| tool)
}

fn path_candidates(entity: &str) -> Vec<String> {
    let mut out = vec![
        format!("/{entity}s"),
        format!("/{entity}"),
        format!("/{entity}es"),
    ];
    if let Some(stem) = entity.strip_suffix('y') {
        out.push(format!("/{stem}ies"));
    }
    out
}

fn operation_id_candidates(entity: &str) -> Vec<String> {
    let e = normalize(entity);
    LOOKUP_VERBS
        .iter()
        .flat_map(|verb| [format!("{verb}{e}s"), format!("{verb}{e}")])
        .collect()
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParameterDescriptor;
    use serde_json::json;

    fn tool(
        spec: &str,
        name: &str,
        method: Method,
        path: &str,
        op_id: Option<&str>,
        params: &[(&str, ParamLocation, bool)],
    ) -> Arc<ToolDescriptor> {
        Arc::new(ToolDescriptor {
            name: name.to_string(),
            method,
            path: path.to_string(),
            description: String::new(),
            spec_name: spec.to_string(),
            operation_id: op_id.map(str::to_string),
            tags: vec![],
            parameters: params
                .iter()
                .map(|(n, loc, req)| {
                    ParameterDescriptor::from_schema(*n, *loc, *req, &json!({"type": "string"}))
                })
                .collect(),
        })
    }

    #[test]
    fn entity_extraction() {
        assert_eq!(entity_for("account_id", "/x").as_deref(), Some("account"));
        assert_eq!(entity_for("Session_UUID", "/x").as_deref(), Some("session"));
        assert_eq!(entity_for("api_key", "/x").as_deref(), Some("api"));
        assert_eq!(entity_for("id", "/categories/{id}").as_deref(), Some("category"));
        assert_eq!(entity_for("id", "/v1/boxes/{id}/items").as_deref(), Some("box"));
        assert_eq!(entity_for("id", "/{id}"), None);
        assert_eq!(entity_for("name", "/users/{name}"), None);
        assert_eq!(entity_for("_id", "/x"), None);
    }

    #[test]
    fn singular_forms() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("companies"), "company");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("class"), "class");
        assert_eq!(singularize("mail"), "mail");
    }

    #[test]
    fn links_identifier_to_list_operation_preferring_same_spec() {
        let tools = vec![
            tool(
                "bank",
                "bank_getMails",
                Method::GET,
                "/accounts/{account_id}/mails",
                Some("getMails"),
                &[("account_id", ParamLocation::Path, true)],
            ),
            tool(
                "other",
                "other_listAccounts",
                Method::GET,
                "/accounts",
                Some("listAccounts"),
                &[],
            ),
            tool(
                "bank",
                "bank_getAccounts",
                Method::GET,
                "/api/v2/accounts",
                Some("getAccounts"),
                &[],
            ),
            tool("bank", "bank_createAccount", Method::POST, "/accounts", None, &[]),
        ];
        let deps = analyze(&tools);
        let edges = deps.get("bank_getMails").expect("edge for account_id");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].parameter, "account_id");
        assert_eq!(edges[0].source_tool, "bank_getAccounts");
        assert!(!deps.contains_key("other_listAccounts"));
    }

    #[test]
    fn falls_back_to_other_specs_and_operation_ids() {
        let tools = vec![
            tool(
                "pay",
                "pay_getPayment",
                Method::GET,
                "/payments/{id}",
                None,
                &[
                    ("id", ParamLocation::Path, true),
                    ("customer_id", ParamLocation::Query, false),
                ],
            ),
            tool(
                "crm",
                "crm_find_customers",
                Method::GET,
                "/search",
                Some("find_customers"),
                &[],
            ),
            tool(
                "pay",
                "pay_listPayments",
                Method::GET,
                "/payments",
                Some("listPayments"),
                &[],
            ),
        ];
        let deps = analyze(&tools);
        let edges = deps.get("pay_getPayment").expect("edges");
        let by_param: BTreeMap<&str, &str> = edges
            .iter()
            .map(|e| (e.parameter.as_str(), e.source_tool.as_str()))
            .collect();
        assert_eq!(by_param.get("id"), Some(&"pay_listPayments"));
        assert_eq!(by_param.get("customer_id"), Some(&"crm_find_customers"));
    }

    #[test]
    fn never_links_a_tool_to_itself_or_to_non_get() {
        let tools = vec![
            tool(
                "a",
                "a_getUsers",
                Method::GET,
                "/users",
                Some("getUsers"),
                &[("user_id", ParamLocation::Query, false)],
            ),
            tool("a", "a_postUsers", Method::POST, "/users", None, &[]),
        ];
        assert!(analyze(&tools).is_empty());
    }
}
