//! 工具输入 JSON Schema：schemars 自动生成 + 执行前校验
//!
//! 校验覆盖工具输入实际用到的子集：type（含联合类型）、anyOf、properties、required、enum、items。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

/// 由输入结构体生成 schema：子 schema 内联（不产生 $ref），去掉 $schema 元信息
pub fn input_schema_for<T: JsonSchema>() -> Value {
    let schema = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>();
    let mut value = serde_json::to_value(&schema).unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
    }
    value
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        _ => true,
    }
}

/// 按 schema 校验 input；失败时返回首个问题的路径与原因
pub fn validate_input(schema: &Value, input: &Value) -> Result<(), String> {
    validate_at(schema, input, "input")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    match schema.get("type") {
        Some(Value::String(t)) if !type_matches(t, value) => {
            return Err(format!("{path}: expected {t}"));
        }
        Some(Value::Array(types)) => {
            let ok = types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value));
            if !ok {
                return Err(format!("{path}: expected one of {}", Value::Array(types.clone())));
            }
        }
        _ => {}
    }

    if let Some(Value::Array(variants)) = schema.get("anyOf") {
        if !variants.iter().any(|v| validate_at(v, value, path).is_ok()) {
            return Err(format!("{path}: matches none of the allowed shapes"));
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(format!("{path}: must be one of {}", Value::Array(allowed.clone())));
        }
    }

    if let Value::Object(map) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if map.get(key).map_or(true, Value::is_null) {
                    return Err(format!("{path}.{key}: is required"));
                }
            }
        }
        if let Some(Value::Object(properties)) = schema.get("properties") {
            for (key, prop_schema) in properties {
                if let Some(v) = map.get(key) {
                    validate_at(prop_schema, v, &format!("{path}.{key}"))?;
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            validate_at(item_schema, item, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        role: String,
        salary_min: Option<u64>,
        tags: Option<Vec<String>>,
    }

    #[test]
    fn test_generated_schema_validates() {
        let schema = input_schema_for::<Sample>();
        assert!(schema.get("$schema").is_none());
        assert!(validate_input(&schema, &json!({"role": "PM"})).is_ok());
        assert!(validate_input(&schema, &json!({"role": "PM", "salaryMin": null})).is_ok());
        assert!(validate_input(&schema, &json!({"role": "PM", "tags": ["a", "b"]})).is_ok());

        let err = validate_input(&schema, &json!({})).unwrap_err();
        assert!(err.contains("role"));
        let err = validate_input(&schema, &json!({"role": 3})).unwrap_err();
        assert!(err.contains("input.role"));
        let err = validate_input(&schema, &json!({"role": "PM", "tags": [1]})).unwrap_err();
        assert!(err.contains("tags[0]"));
        assert!(validate_input(&schema, &json!("role")).is_err());
    }

    #[test]
    fn test_enum_constraint() {
        let schema = json!({"type": "object", "properties": {"cadence": {"type": "string", "enum": ["daily", "weekly"]}}});
        assert!(validate_input(&schema, &json!({"cadence": "daily"})).is_ok());
        assert!(validate_input(&schema, &json!({"cadence": "hourly"})).is_err());
    }
}
