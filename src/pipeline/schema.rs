//! Response shapes demanded from the model and validation of what comes back.

use jsonschema::JSONSchema;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ExtractorError, FieldIssue, Result, ValidationError};
use crate::types::{ExtractionMode, ExtractionResult, MultipleExtraction, SingleExtraction};

/// Schema of `T` in strict structured-output form: every object closed with
/// `additionalProperties: false`, every property required, refs inlined.
pub fn strict_schema<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schema_for!(T)).unwrap_or_default();
    close_objects(&mut value);
    inline_refs(&mut value);
    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }
    drop_formats(&mut value);
    value
}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
                if let Some(Value::Object(props)) = map.get("properties") {
                    let all: Vec<Value> = props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(all));
                }
            }
            for (_, v) in map.iter_mut() {
                close_objects(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };
    if let Some(defs) = definitions {
        inline_with(value, &defs);
    }
}

fn inline_with(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(def) = target {
                *value = def;
                inline_with(value, definitions);
                return;
            }
            for (_, v) in map.iter_mut() {
                inline_with(v, definitions);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| inline_with(v, definitions)),
        _ => {}
    }
}

// Providers reject the non-standard formats schemars emits (uint32, partial-date-time).
fn drop_formats(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if matches!(map.get("format"), Some(Value::String(_))) {
                map.remove("format");
            }
            for (_, v) in map.iter_mut() {
                drop_formats(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(drop_formats),
        _ => {}
    }
}

/// Compiled response shape for one extraction mode.
pub struct ResponseSchema {
    mode: ExtractionMode,
    name: String,
    schema: Value,
    validator: JSONSchema,
}

impl ResponseSchema {
    pub fn for_mode(mode: ExtractionMode) -> Result<Self> {
        let (name, schema) = match mode {
            ExtractionMode::Single => ("SingleExtraction", strict_schema::<SingleExtraction>()),
            ExtractionMode::Multiple => ("MultipleExtraction", strict_schema::<MultipleExtraction>()),
        };
        let validator = JSONSchema::compile(&schema)
            .map_err(|e| ExtractorError::config(format!("response schema does not compile: {}", e)))?;
        Ok(Self {
            mode,
            name: name.to_string(),
            schema,
            validator,
        })
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Checks `value` against the schema, then decodes it and applies the
    /// record-level checks. Every failure carries per-field detail.
    pub fn parse(&self, value: Value) -> std::result::Result<ExtractionResult, ValidationError> {
        if let Err(errors) = self.validator.validate(&value) {
            let issues: Vec<FieldIssue> = errors
                .map(|e| FieldIssue {
                    path: display_path(&e.instance_path.to_string()),
                    message: e.to_string(),
                    input: e.instance.to_string(),
                })
                .collect();
            return Err(ValidationError { issues });
        }
        let result = match self.mode {
            ExtractionMode::Single => decode::<SingleExtraction>(value).map(ExtractionResult::Single)?,
            ExtractionMode::Multiple => decode::<MultipleExtraction>(value).map(ExtractionResult::Multiple)?,
        };
        result.validate()?;
        Ok(result)
    }
}

fn display_path(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> std::result::Result<T, ValidationError> {
    let input = value.to_string();
    serde_json::from_value(value).map_err(|e| ValidationError::single("/", e.to_string(), input))
}
