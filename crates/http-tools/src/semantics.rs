//! HTTP method semantics (RFC 9110) as they apply to generated tools.

use reqwest::Method;
use serde::Serialize;

/// Behavioural hints for a tool, derived from its HTTP method.
///
/// `idempotent` is `None` when the method does not commit to either answer (PATCH, extension
/// methods).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSemantics {
    pub read_only: bool,
    pub destructive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent: Option<bool>,
}

#[must_use]
pub fn semantics_for_method(method: &Method) -> MethodSemantics {
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        return MethodSemantics {
            read_only: true,
            destructive: false,
            idempotent: Some(true),
        };
    }
    if method == Method::POST {
        return MethodSemantics {
            read_only: false,
            destructive: false,
            idempotent: Some(false),
        };
    }
    if method == Method::PUT || method == Method::DELETE {
        return MethodSemantics {
            read_only: false,
            destructive: true,
            idempotent: Some(true),
        };
    }
    // PATCH and extension methods: may modify state, idempotence unknown.
    MethodSemantics {
        read_only: false,
        destructive: true,
        idempotent: None,
    }
}

/// Whether a JSON request body is sent for `method`.
///
/// Only POST, PUT and PATCH carry a body; body arguments on other methods are dropped.
#[must_use]
pub fn method_carries_body(method: &Method) -> bool {
    method == Method::POST || method == Method::PUT || method == Method::PATCH
}
