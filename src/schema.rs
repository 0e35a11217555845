//! JSON schema for structured LLM output.
//!
//! Generated from Rust types with `schemars`, then reshaped for strict
//! structured-output mode:
//!
//! 1. every object schema gets `additionalProperties: false`
//! 2. every property is listed in `required`
//! 3. `$ref`s are inlined and `definitions` dropped
//! 4. numeric `format` hints (`double`, `uint32`, ...) are removed

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

use crate::models::ExtractedRecord;

/// Name sent alongside the schema in `response_format`.
pub const RECORD_SCHEMA_NAME: &str = "extracted_record";

/// Strict-mode schema for `T`.
pub fn strict_schema<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schema_for!(T)).unwrap_or_default();

    fix_object_schemas(&mut value);
    inline_refs(&mut value);
    strip_formats(&mut value);

    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }

    value
}

/// The schema of an [`ExtractedRecord`].
pub fn record_schema() -> Value {
    strict_schema::<ExtractedRecord>()
}

fn fix_object_schemas(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                if let Some(Value::Object(props)) = map.get("properties") {
                    let keys: Vec<Value> = props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(keys));
                }
            }

            for (_, v) in map.iter_mut() {
                fix_object_schemas(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                fix_object_schemas(item);
            }
        }
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_with(value, &defs);
    }
}

fn inline_refs_with(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(path)) = map.get("$ref").cloned() {
                if let Some(name) = path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.get(name) {
                        *value = def.clone();
                        inline_refs_with(value, definitions);
                        return;
                    }
                }
            }

            // Single-item allOf wrappers appear around documented $ref fields.
            if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    let mut inner = all_of[0].clone();
                    inline_refs_with(&mut inner, definitions);
                    map.remove("allOf");
                    if let Value::Object(inner_map) = inner {
                        for (k, v) in inner_map {
                            map.entry(k).or_insert(v);
                        }
                    }
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_with(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_with(item, definitions);
            }
        }
        _ => {}
    }
}

fn strip_formats(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let numeric = matches!(
                map.get("type").and_then(Value::as_str),
                Some("number") | Some("integer")
            );
            if numeric {
                map.remove("format");
            }
            for (_, v) in map.iter_mut() {
                strip_formats(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strip_formats(item);
            }
        }
        _ => {}
    }
}
