//! Local `$ref` resolution (`#/...` JSON pointers within one document).
//!
//! External file or URL references are not followed; they resolve to an error and the caller
//! falls back to treating the value as an untyped string schema.

use crate::error::{OpenApiToolsError, Result};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
pub struct LocalResolver<'a> {
    root: &'a Value,
}

impl<'a> LocalResolver<'a> {
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Follow `$ref` chains starting at `value` until a non-reference is reached.
    ///
    /// # Errors
    ///
    /// Returns an error for non-local refs, missing pointer targets and reference cycles.
    pub fn resolve(&self, value: &'a Value) -> Result<&'a Value> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cur = value;

        while let Some(reference) = ref_of(cur) {
            if !seen.insert(reference) {
                return Err(OpenApiToolsError::Reference {
                    reference: reference.to_string(),
                    reason: "reference cycle".to_string(),
                });
            }
            cur = self.lookup(reference)?;
        }
        Ok(cur)
    }

    /// Like [`Self::resolve`], but unresolvable refs yield `None` instead of an error.
    #[must_use]
    pub fn resolve_lenient(&self, value: &'a Value) -> Option<&'a Value> {
        match self.resolve(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unresolvable reference");
                None
            }
        }
    }

    fn lookup(&self, reference: &str) -> Result<&'a Value> {
        let Some(fragment) = reference.strip_prefix('#') else {
            return Err(OpenApiToolsError::Reference {
                reference: reference.to_string(),
                reason: "only local references are supported".to_string(),
            });
        };
        if fragment.is_empty() {
            return Ok(self.root);
        }
        if !fragment.starts_with('/') {
            return Err(OpenApiToolsError::Reference {
                reference: reference.to_string(),
                reason: "expected a JSON pointer starting with '/'".to_string(),
            });
        }
        let pointer = percent_decode(fragment);
        self.root
            .pointer(&pointer)
            .ok_or_else(|| OpenApiToolsError::Reference {
                reference: reference.to_string(),
                reason: "pointer target not found".to_string(),
            })
    }
}

fn ref_of(value: &Value) -> Option<&str> {
    value.as_object()?.get("$ref")?.as_str()
}

/// Decode `%XX` escapes that may appear in URI-fragment pointers (e.g. `%7B` for `{`).
fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Some(b) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
        {
            out.push(b);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::LocalResolver;
    use serde_json::json;

    #[test]
    fn follows_chained_refs() {
        let doc = json!({
            "components": {
                "schemas": {
                    "Alias": {"$ref": "#/components/schemas/Payment"},
                    "Payment": {"type": "object", "properties": {"amount": {"type": "number"}}}
                }
            }
        });
        let r = LocalResolver::new(&doc);
        let alias = doc.pointer("/components/schemas/Alias").expect("alias");
        let resolved = r.resolve(alias).expect("resolves");
        assert_eq!(resolved["type"], json!("object"));
    }

    #[test]
    fn detects_cycles() {
        let doc = json!({
            "definitions": {
                "A": {"$ref": "#/definitions/B"},
                "B": {"$ref": "#/definitions/A"}
            }
        });
        let r = LocalResolver::new(&doc);
        let a = doc.pointer("/definitions/A").expect("A");
        let err = r.resolve(a).expect_err("cycle");
        assert!(err.to_string().contains("cycle"), "{err}");
        assert!(r.resolve_lenient(a).is_none());
    }

    #[test]
    fn rejects_external_and_missing_refs() {
        let doc = json!({
            "x": {"$ref": "common.yaml#/Thing"},
            "y": {"$ref": "#/nope"}
        });
        let r = LocalResolver::new(&doc);
        assert!(r.resolve(&doc["x"]).is_err());
        assert!(r.resolve(&doc["y"]).is_err());
        assert_eq!(r.resolve(&doc).expect("plain value"), &doc);
    }
}
