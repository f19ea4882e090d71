use std::collections::BTreeMap;

use serde_json::Value;

const NOT_STRINGS: &str =
    "The 'environmentVariables' configuration must be an object containing string values.";

/// Validate the `environmentVariables` overrides handed to workers
pub fn validate_environment_variables(
    value: Option<&Value>,
) -> Result<BTreeMap<String, String>, String> {
    let entries = match value {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(entries)) => entries,
        Some(_) => return Err(NOT_STRINGS.to_string()),
    };

    let mut variables = BTreeMap::new();
    for (name, value) in entries {
        if name.is_empty() || name.contains('=') || name.contains('\0') {
            return Err(format!(
                "Invalid environment variable name '{}' in the 'environmentVariables' configuration.",
                name
            ));
        }
        let Value::String(value) = value else {
            return Err(NOT_STRINGS.to_string());
        };
        variables.insert(name.clone(), value.clone());
    }

    Ok(variables)
}
