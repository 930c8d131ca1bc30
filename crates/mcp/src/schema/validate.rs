//! Input validation and type coercion against an operation's declared parameters.

use indexmap::IndexMap;
use relay_types::{OperationSchema, ParameterSpec, ParameterType};
use serde_json::{Map, Number, Value};

use super::SchemaError;

/// Turn a step's candidate input into an argument map for `operation`.
///
/// Objects are used as-is and `null` becomes an empty map. A bare scalar is accepted when the
/// operation has a single parameter, or a single required one, which then receives it.
pub fn into_arguments(operation: &OperationSchema, candidate: Value) -> Result<Map<String, Value>, SchemaError> {
    match candidate {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => {
            let target = sole_parameter(operation).ok_or_else(|| {
                SchemaError::invalid_input(
                    &operation.operation_name,
                    format!("expected an object of named parameters, got {}", type_name(&other)),
                )
            })?;
            let mut map = Map::new();
            map.insert(target.to_string(), other);
            Ok(map)
        }
    }
}

fn sole_parameter(operation: &OperationSchema) -> Option<&str> {
    if operation.parameters.len() == 1 {
        return operation.parameters.keys().next().map(String::as_str);
    }
    let mut required = operation.required_parameters();
    match (required.next(), required.next()) {
        (Some(name), None) => Some(name),
        _ => None,
    }
}

/// Validate `arguments` against `operation`, returning the coerced map.
///
/// Declared parameters come first, in schema order, followed by any extra keys the caller
/// supplied. `null` counts as absent. Optional parameters with a default are filled in.
pub fn validate_arguments(operation: &OperationSchema, arguments: Map<String, Value>) -> Result<Map<String, Value>, SchemaError> {
    validate_map(&operation.parameters, arguments, "").map_err(|reason| SchemaError::invalid_input(&operation.operation_name, reason))
}

fn validate_map(parameters: &IndexMap<String, ParameterSpec>, mut arguments: Map<String, Value>, path: &str) -> Result<Map<String, Value>, String> {
    let mut validated = Map::new();
    for (name, spec) in parameters {
        let field = join_path(path, name);
        match arguments.remove(name).filter(|value| !value.is_null()) {
            Some(value) => {
                validated.insert(name.clone(), coerce(value, spec, &field)?);
            }
            None => {
                if let Some(default) = &spec.default {
                    validated.insert(name.clone(), default.clone());
                } else if spec.required {
                    return Err(format!("missing required parameter '{field}'"));
                }
            }
        }
    }
    validated.extend(arguments);
    Ok(validated)
}

fn coerce(value: Value, spec: &ParameterSpec, field: &str) -> Result<Value, String> {
    let coerced = match spec.kind {
        ParameterType::String => coerce_string(value),
        ParameterType::Number => coerce_number(value),
        ParameterType::Integer => coerce_integer(value),
        ParameterType::Boolean => coerce_boolean(value),
        ParameterType::Array => return coerce_array(value, spec, field).and_then(|value| check_enum(value, spec, field)),
        ParameterType::Object => return coerce_object(value, spec, field),
        ParameterType::Any => Ok(value),
    }
    .map_err(|value| format!("'{field}' expects {}, got {}", spec.kind.as_str(), describe(&value)))?;
    check_enum(coerced, spec, field)
}

fn coerce_string(value: Value) -> Result<Value, Value> {
    match value {
        Value::String(_) => Ok(value),
        Value::Number(number) => Ok(Value::String(number.to_string())),
        Value::Bool(flag) => Ok(Value::String(flag.to_string())),
        Value::Array(_) | Value::Object(_) => Ok(Value::String(value.to_string())),
        Value::Null => Err(value),
    }
}

fn coerce_number(value: Value) -> Result<Value, Value> {
    match value {
        Value::Number(_) => Ok(value),
        Value::String(ref text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(number_from_f64)
            .map(Value::Number)
            .ok_or(value),
        other => Err(other),
    }
}

fn coerce_integer(value: Value) -> Result<Value, Value> {
    match value {
        Value::Number(ref number) if number.is_i64() || number.is_u64() => Ok(value),
        Value::Number(ref number) => match number.as_f64() {
            Some(float) if float.fract() == 0.0 => Ok(Value::from(float as i64)),
            _ => Err(value),
        },
        Value::String(ref text) => {
            let text = text.trim();
            if let Ok(integer) = text.parse::<i64>() {
                return Ok(Value::from(integer));
            }
            match text.parse::<f64>() {
                Ok(float) if float.is_finite() && float.fract() == 0.0 => Ok(Value::from(float as i64)),
                _ => Err(value),
            }
        }
        other => Err(other),
    }
}

fn coerce_boolean(value: Value) -> Result<Value, Value> {
    match value {
        Value::Bool(_) => Ok(value),
        Value::String(ref text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(Value::Bool(true)),
            "false" | "no" | "0" | "off" => Ok(Value::Bool(false)),
            _ => Err(value),
        },
        Value::Number(ref number) => match number.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(value),
        },
        other => Err(other),
    }
}

fn coerce_array(value: Value, spec: &ParameterSpec, field: &str) -> Result<Value, String> {
    let elements = match value {
        Value::Array(elements) => elements,
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(elements)) => elements,
            _ => vec![Value::String(text)],
        },
        Value::Null => return Err(format!("'{field}' expects array, got null")),
        scalar => vec![scalar],
    };
    let Some(items) = spec.items.as_deref() else {
        return Ok(Value::Array(elements));
    };
    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| coerce(element, items, &format!("{field}[{index}]")))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn coerce_object(value: Value, spec: &ParameterSpec, field: &str) -> Result<Value, String> {
    let map = match value {
        Value::Object(map) => map,
        Value::String(ref text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Object(map)) => map,
            _ => return Err(format!("'{field}' expects object, got {}", describe(&value))),
        },
        other => return Err(format!("'{field}' expects object, got {}", describe(&other))),
    };
    validate_map(&spec.properties, map, field).map(Value::Object)
}

fn check_enum(value: Value, spec: &ParameterSpec, field: &str) -> Result<Value, String> {
    if spec.enum_values.is_empty() || spec.enum_values.contains(&value) {
        return Ok(value);
    }
    if let Value::String(text) = &value
        && let Some(allowed) = spec
            .enum_values
            .iter()
            .find(|allowed| allowed.as_str().is_some_and(|allowed| allowed.eq_ignore_ascii_case(text)))
    {
        return Ok(allowed.clone());
    }
    let allowed: Vec<String> = spec.enum_values.iter().map(Value::to_string).collect();
    Err(format!("'{field}' must be one of [{}], got {}", allowed.join(", "), describe(&value)))
}

fn number_from_f64(float: f64) -> Option<Number> {
    if float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        return Some(Number::from(float as i64));
    }
    Number::from_f64(float)
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() { name.to_string() } else { format!("{path}.{name}") }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(text) => format!("\"{text}\""),
        Value::Array(_) | Value::Object(_) => type_name(value).to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forecast() -> OperationSchema {
        OperationSchema::from_input_schema(
            "weather",
            "get_forecast",
            None,
            &json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string"},
                    "days": {"type": "integer", "default": 3},
                    "units": {"type": "string", "enum": ["metric", "imperial"]},
                    "hourly": {"type": "boolean"},
                    "threshold": {"type": "number"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "window": {
                        "type": "object",
                        "properties": {"from": {"type": "string"}, "hours": {"type": "integer"}},
                        "required": ["from"]
                    }
                },
                "required": ["city"]
            }),
        )
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn coerces_primitives_from_strings() {
        let validated = validate_arguments(
            &forecast(),
            object(json!({"city": "Paris", "days": "5", "hourly": "yes", "threshold": "0.5"})),
        )
        .expect("valid input");

        assert_eq!(validated["days"], json!(5));
        assert_eq!(validated["hourly"], json!(true));
        assert_eq!(validated["threshold"], json!(0.5));
    }

    #[test]
    fn fills_defaults_and_treats_null_as_absent() {
        let validated = validate_arguments(&forecast(), object(json!({"city": "Paris", "days": null}))).expect("valid input");
        assert_eq!(validated["days"], json!(3));
        assert!(!validated.contains_key("units"));
    }

    #[test]
    fn missing_required_parameter_is_rejected() {
        let error = validate_arguments(&forecast(), object(json!({"days": 2}))).expect_err("city is required");
        assert_eq!(
            error,
            SchemaError::InvalidInput {
                operation: "get_forecast".into(),
                reason: "missing required parameter 'city'".into(),
            }
        );
    }

    #[test]
    fn enum_values_match_ignoring_case() {
        let validated = validate_arguments(&forecast(), object(json!({"city": "Paris", "units": "METRIC"}))).expect("valid input");
        assert_eq!(validated["units"], json!("metric"));

        let error = validate_arguments(&forecast(), object(json!({"city": "Paris", "units": "kelvin"}))).expect_err("not allowed");
        assert!(error.to_string().contains("must be one of"));
    }

    #[test]
    fn arrays_wrap_scalars_and_coerce_items() {
        let validated = validate_arguments(&forecast(), object(json!({"city": "Paris", "tags": 7}))).expect("valid input");
        assert_eq!(validated["tags"], json!(["7"]));
    }

    #[test]
    fn nested_objects_are_validated() {
        let validated = validate_arguments(
            &forecast(),
            object(json!({"city": "Paris", "window": "{\"from\": \"09:00\", \"hours\": \"6\"}"})),
        )
        .expect("valid input");
        assert_eq!(validated["window"], json!({"from": "09:00", "hours": 6}));

        let error = validate_arguments(&forecast(), object(json!({"city": "Paris", "window": {"hours": 2}}))).expect_err("from missing");
        assert!(error.to_string().contains("'window.from'"));
    }

    #[test]
    fn extra_keys_pass_through() {
        let validated = validate_arguments(&forecast(), object(json!({"city": "Paris", "lang": "fr"}))).expect("valid input");
        assert_eq!(validated["lang"], json!("fr"));
    }

    #[test]
    fn uncoercible_values_are_rejected() {
        let error = validate_arguments(&forecast(), object(json!({"city": "Paris", "days": "soon"}))).expect_err("not an integer");
        assert!(error.to_string().contains("'days' expects integer"));
    }

    #[test]
    fn scalar_input_fills_sole_required_parameter() {
        assert_eq!(into_arguments(&forecast(), json!("Paris")).expect("wrapped"), object(json!({"city": "Paris"})));
        assert!(into_arguments(&forecast(), Value::Null).expect("empty").is_empty());

        let schema = OperationSchema::from_input_schema("x", "y", None, &json!({"properties": {"a": {}, "b": {}}}));
        assert!(into_arguments(&schema, json!(1)).is_err());
    }
}
