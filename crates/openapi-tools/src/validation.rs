//! Argument cleaning, location classification and constraint validation.

use crate::model::{ParamLocation, ParamType, ParameterDescriptor, ToolDescriptor};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// An argument bound to the request location its descriptor declares.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatedArgument {
    Path { name: String, value: Value },
    Query { name: String, value: Value },
    Header { name: String, value: Value },
    Body { name: String, value: Value },
    /// The whole JSON payload for tools whose body schema is not an object.
    RawBody(Value),
}

impl LocatedArgument {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Path { name, .. }
            | Self::Query { name, .. }
            | Self::Header { name, .. }
            | Self::Body { name, .. } => name,
            Self::RawBody(_) => "body",
        }
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        match self {
            Self::Path { value, .. }
            | Self::Query { value, .. }
            | Self::Header { value, .. }
            | Self::Body { value, .. }
            | Self::RawBody(value) => value,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClassifiedArguments {
    /// In descriptor order.
    pub located: Vec<LocatedArgument>,
    /// Argument names the tool does not declare.
    pub unknown: Vec<String>,
}

/// Drop `null` values and blank strings, recursively. Idempotent.
///
/// Non-object input yields an empty map.
#[must_use]
pub fn clean_arguments(arguments: &Value) -> Map<String, Value> {
    match arguments {
        Value::Object(map) => clean_map(map),
        _ => Map::new(),
    }
}

fn clean_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter_map(|(k, v)| clean_value(v).map(|v| (k.clone(), v)))
        .collect()
}

fn clean_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::Object(map) => Some(Value::Object(clean_map(map))),
        Value::Array(items) => Some(Value::Array(items.iter().filter_map(clean_value).collect())),
        other => Some(other.clone()),
    }
}

/// Bind cleaned arguments to their declared locations.
#[must_use]
pub fn classify(tool: &ToolDescriptor, arguments: &Map<String, Value>) -> ClassifiedArguments {
    let mut located = Vec::new();
    for param in &tool.parameters {
        let Some(value) = arguments.get(&param.name) else {
            continue;
        };
        let name = param.name.clone();
        let value = coerce(param, value);
        located.push(match param.location {
            ParamLocation::Path => LocatedArgument::Path { name, value },
            ParamLocation::Query => LocatedArgument::Query { name, value },
            ParamLocation::Header => LocatedArgument::Header { name, value },
            ParamLocation::Body if param.raw_body => LocatedArgument::RawBody(value),
            ParamLocation::Body => LocatedArgument::Body { name, value },
        });
    }

    let unknown = arguments
        .keys()
        .filter(|k| tool.parameter(k).is_none())
        .cloned()
        .collect();

    ClassifiedArguments { located, unknown }
}

/// Check every declared parameter against `arguments`, collecting all violations.
#[must_use]
pub fn validate(tool: &ToolDescriptor, arguments: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    for param in &tool.parameters {
        match arguments.get(&param.name) {
            None if param.required => errors.push(missing_message(param)),
            None => {}
            Some(value) => check_value(param, value, &mut errors),
        }
    }
    errors
}

/// Names of required parameters absent from `arguments`.
#[must_use]
pub fn missing_required<'t>(
    tool: &'t ToolDescriptor,
    arguments: &Map<String, Value>,
) -> Vec<&'t str> {
    tool.required_parameters()
        .filter(|p| !arguments.contains_key(&p.name))
        .map(|p| p.name.as_str())
        .collect()
}

fn missing_message(param: &ParameterDescriptor) -> String {
    format!(
        "Missing required parameter: '{}' ({} {})",
        param.name,
        param.location.as_str(),
        param.param_type.as_str()
    )
}

fn check_value(param: &ParameterDescriptor, value: &Value, errors: &mut Vec<String>) {
    let name = &param.name;
    if !type_matches(param.param_type, value) {
        errors.push(format!(
            "Parameter '{name}' must be of type {} (got {value})",
            param.param_type.as_str()
        ));
        return;
    }

    let c = &param.constraints;

    if let Some(allowed) = &c.enum_values
        && !allowed.iter().any(|a| enum_matches(a, value))
    {
        let listed: Vec<String> = allowed.iter().map(scalar_to_string).collect();
        errors.push(format!(
            "Parameter '{name}' must be one of [{}] (got {})",
            listed.join(", "),
            scalar_to_string(value)
        ));
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count() as u64;
        if let Some(min) = c.min_length
            && len < min
        {
            errors.push(format!(
                "Parameter '{name}' must be at least {min} characters long (got {len})"
            ));
        }
        if let Some(max) = c.max_length
            && len > max
        {
            errors.push(format!(
                "Parameter '{name}' must be at most {max} characters long (got {len})"
            ));
        }
        if let Some(pattern) = &c.pattern {
            match regex::Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => errors.push(format!(
                    "Parameter '{name}' does not match pattern '{pattern}'"
                )),
                Ok(_) => {}
                Err(e) => debug!(param = %name, error = %e, "ignoring invalid pattern"),
            }
        }
    }

    if matches!(param.param_type, ParamType::Integer | ParamType::Number)
        && let Some(n) = as_number(value)
    {
        if let Some(min) = c.minimum
            && n < min
        {
            errors.push(format!(
                "Parameter '{name}' must be >= {min} (got {})",
                scalar_to_string(value)
            ));
        }
        if let Some(max) = c.maximum
            && n > max
        {
            errors.push(format!(
                "Parameter '{name}' must be <= {max} (got {})",
                scalar_to_string(value)
            ));
        }
    }
}

/// Scalars are accepted where they can be faithfully converted (`"5"` for an integer,
/// `"true"` for a boolean, numbers for strings).
fn type_matches(ty: ParamType, value: &Value) -> bool {
    match ty {
        ParamType::String => matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)),
        ParamType::Integer => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        ParamType::Number => as_number(value).is_some(),
        ParamType::Boolean => match value {
            Value::Bool(_) => true,
            Value::String(s) => matches!(s.trim(), "true" | "false"),
            _ => false,
        },
        ParamType::Array => value.is_array(),
        ParamType::Object => value.is_object(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn enum_matches(allowed: &Value, value: &Value) -> bool {
    allowed == value || (!value.is_object() && scalar_to_string(allowed) == scalar_to_string(value))
}

/// Convert a scalar JSON value to its plain string form (strings unquoted).
#[must_use]
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Convert string scalars to the declared numeric/boolean type so JSON bodies carry real types.
fn coerce(param: &ParameterDescriptor, value: &Value) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    let s = s.trim();
    match param.param_type {
        ParamType::Integer => s
            .parse::<i64>()
            .map_or_else(|_| value.clone(), |i| Value::Number(i.into())),
        ParamType::Number => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(|| value.clone(), Value::Number),
        ParamType::Boolean => match s {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use serde_json::json;

    fn payment_tool() -> ToolDescriptor {
        ToolDescriptor {
            name: "pay_createPayment".to_string(),
            method: Method::POST,
            path: "/accounts/{account_id}/payments".to_string(),
            description: String::new(),
            spec_name: "pay".to_string(),
            operation_id: Some("createPayment".to_string()),
            tags: vec![],
            parameters: vec![
                ParameterDescriptor::from_schema(
                    "account_id",
                    ParamLocation::Path,
                    true,
                    &json!({"type": "string", "pattern": "^acc_[0-9]+$"}),
                ),
                ParameterDescriptor::from_schema(
                    "dry_run",
                    ParamLocation::Query,
                    false,
                    &json!({"type": "boolean"}),
                ),
                ParameterDescriptor::from_schema(
                    "amount",
                    ParamLocation::Body,
                    true,
                    &json!({"type": "number", "minimum": 0.01, "maximum": 10000}),
                ),
                ParameterDescriptor::from_schema(
                    "currency",
                    ParamLocation::Body,
                    true,
                    &json!({"type": "string", "enum": ["EUR", "USD", "GBP"]}),
                ),
                ParameterDescriptor::from_schema(
                    "memo",
                    ParamLocation::Body,
                    false,
                    &json!({"type": "string", "minLength": 2, "maxLength": 5}),
                ),
                ParameterDescriptor::from_schema(
                    "count",
                    ParamLocation::Body,
                    false,
                    &json!({"type": "integer"}),
                ),
            ],
        }
    }

    fn args(v: Value) -> Map<String, Value> {
        clean_arguments(&v)
    }

    #[test]
    fn cleaning_drops_nulls_and_blanks_recursively_and_is_idempotent() {
        let raw = json!({
            "a": null,
            "b": "  ",
            "c": "x",
            "d": {"e": null, "f": 1, "g": ["", null, "h"]},
            "i": false,
            "j": 0
        });
        let once = clean_arguments(&raw);
        assert_eq!(
            Value::Object(once.clone()),
            json!({"c": "x", "d": {"f": 1, "g": ["h"]}, "i": false, "j": 0})
        );
        let twice = clean_arguments(&Value::Object(once.clone()));
        assert_eq!(once, twice);
        assert!(clean_arguments(&json!("not an object")).is_empty());
    }

    #[test]
    fn valid_arguments_have_no_errors() {
        let tool = payment_tool();
        let a = args(json!({
            "account_id": "acc_1",
            "amount": 12.5,
            "currency": "EUR",
            "memo": "rent"
        }));
        assert!(validate(&tool, &a).is_empty(), "{:?}", validate(&tool, &a));
    }

    #[test]
    fn collects_every_violation() {
        let tool = payment_tool();
        let a = args(json!({"account_id": "acc_1", "amount": -5, "currency": "JPY"}));
        let errors = validate(&tool, &a);
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors[0].contains("amount") && errors[0].contains(">= 0.01"), "{errors:?}");
        assert!(errors[1].contains("currency") && errors[1].contains("JPY"), "{errors:?}");
    }

    #[test]
    fn missing_required_and_other_constraints() {
        let tool = payment_tool();
        let a = args(json!({
            "account_id": "bogus",
            "memo": "toolong",
            "count": 1.5,
            "dry_run": "maybe"
        }));
        let errors = validate(&tool, &a);
        let joined = errors.join("\n");
        assert!(joined.contains("Missing required parameter: 'amount'"), "{joined}");
        assert!(joined.contains("Missing required parameter: 'currency'"), "{joined}");
        assert!(joined.contains("does not match pattern"), "{joined}");
        assert!(joined.contains("at most 5 characters"), "{joined}");
        assert!(joined.contains("'count' must be of type integer"), "{joined}");
        assert!(joined.contains("'dry_run' must be of type boolean"), "{joined}");
        assert_eq!(missing_required(&tool, &a), vec!["amount", "currency"]);
    }

    #[test]
    fn numeric_strings_are_accepted_and_coerced() {
        let tool = payment_tool();
        let a = args(json!({
            "account_id": "acc_7",
            "amount": "20",
            "currency": "USD",
            "count": "3",
            "dry_run": "true"
        }));
        assert!(validate(&tool, &a).is_empty());

        let classified = classify(&tool, &a);
        let amount = classified
            .located
            .iter()
            .find(|l| l.name() == "amount")
            .expect("amount");
        assert_eq!(amount.value(), &json!(20.0));
        let count = classified
            .located
            .iter()
            .find(|l| l.name() == "count")
            .expect("count");
        assert_eq!(count, &LocatedArgument::Body { name: "count".to_string(), value: json!(3) });
        assert!(matches!(
            classified.located.iter().find(|l| l.name() == "dry_run"),
            Some(LocatedArgument::Query { value: Value::Bool(true), .. })
        ));
    }

    #[test]
    fn classify_reports_unknown_arguments() {
        let tool = payment_tool();
        let a = args(json!({"account_id": "acc_1", "colour": "red"}));
        let classified = classify(&tool, &a);
        assert_eq!(classified.unknown, vec!["colour"]);
        assert!(matches!(
            &classified.located[0],
            LocatedArgument::Path { name, .. } if name == "account_id"
        ));
    }
}
