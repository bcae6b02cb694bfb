//! Structural check for `mkvmerge --identify` JSON output.
//!
//! Only the root level of the schema document is enforced: the `required`
//! property list and the declared `type` of each root property.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::{CaseError, CaseResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationSchema {
    required: Vec<String>,
    property_types: BTreeMap<String, String>,
}

impl IdentificationSchema {
    /// Read and parse a schema document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
        let value: Value = serde_json::from_str(&content).context("parse schema JSON")?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(schema: &Value) -> Self {
        let required = schema["required"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let property_types = schema["properties"]
            .as_object()
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(name, def)| {
                        def["type"].as_str().map(|t| (name.clone(), t.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            required,
            property_types,
        }
    }

    /// Validate identification output text against the schema.
    pub fn validate(&self, output: &str) -> CaseResult<()> {
        let doc: Value = serde_json::from_str(output)
            .map_err(|e| CaseError::Schema(format!("output is not JSON: {e}")))?;
        let root = doc
            .as_object()
            .ok_or_else(|| CaseError::Schema("root is not an object".to_string()))?;

        for key in &self.required {
            if !root.contains_key(key) {
                return Err(CaseError::Schema(format!("missing required property '{key}'")));
            }
        }

        for (key, value) in root {
            if let Some(expected) = self.property_types.get(key) {
                if !json_type_matches(expected, value) {
                    return Err(CaseError::Schema(format!(
                        "property '{key}' should be of type {expected}"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}
