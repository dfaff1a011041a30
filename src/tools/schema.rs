//! Structural checks for tool and response schemas.
//!
//! The rules are those of strict function calling, the tightest contract
//! among the supported vendors: every object lists all of its properties in
//! `required` and closes itself with `additionalProperties: false`.

use serde_json::{Map, Value};

use crate::error::SchemaError;

pub const MAX_NESTING_DEPTH: usize = 10;
pub const MAX_PROPERTIES: usize = 5000;

const SUPPORTED_TYPES: [&str; 7] = [
    "string", "number", "integer", "boolean", "object", "array", "null",
];

/// Keywords that strict mode ignores or rejects next to `$ref`.
const REF_CONFLICTS: [&str; 5] = ["type", "properties", "items", "anyOf", "required"];

/// Validates a tool argument schema or a JSON response schema.
pub fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    let root_type = schema_obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::RootTypeMustBeObject)?;

    if root_type != "object" {
        return Err(SchemaError::RootTypeMustBeObject);
    }

    if schema_obj.contains_key("anyOf") {
        return Err(SchemaError::RootAnyOf);
    }

    let mut walker = Walker { properties: 0 };
    walker.node(schema, "#", 0)?;

    for defs_key in ["$defs", "definitions"] {
        if let Some(defs) = schema_obj.get(defs_key).and_then(Value::as_object) {
            for (name, def) in defs {
                walker.node(def, &format!("#/{defs_key}/{name}"), 1)?;
            }
        }
    }

    Ok(())
}

struct Walker {
    properties: usize,
}

impl Walker {
    fn node(&mut self, node: &Value, path: &str, depth: usize) -> Result<(), SchemaError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(SchemaError::TooDeep {
                max: MAX_NESTING_DEPTH,
            });
        }

        let node_obj = node.as_object().ok_or_else(|| SchemaError::NodeNotObject {
            path: path.to_string(),
        })?;

        if node_obj.contains_key("$ref") {
            if let Some(keyword) = REF_CONFLICTS
                .into_iter()
                .find(|keyword| node_obj.contains_key(*keyword))
            {
                return Err(SchemaError::RefWithSiblings {
                    path: path.to_string(),
                    keyword: keyword.to_string(),
                });
            }
            return Ok(());
        }

        let types = declared_types(node_obj, path)?;
        let branches = match node_obj.get("anyOf") {
            None => None,
            Some(value) => Some(value.as_array().ok_or_else(|| SchemaError::NodeNotObject {
                path: format!("{path}/anyOf"),
            })?),
        };

        if types.is_empty()
            && branches.is_none()
            && !node_obj.contains_key("enum")
            && !node_obj.contains_key("const")
        {
            return Err(SchemaError::MissingType {
                path: path.to_string(),
            });
        }

        if types.contains(&"object") {
            self.object(node_obj, path, depth)?;
        }

        if types.contains(&"array") {
            if let Some(items) = node_obj.get("items") {
                self.node(items, &format!("{path}/items"), depth + 1)?;
            }
        }

        for (index, branch) in branches.into_iter().flatten().enumerate() {
            self.node(branch, &format!("{path}/anyOf/{index}"), depth + 1)?;
        }

        Ok(())
    }

    fn object(
        &mut self,
        node_obj: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) -> Result<(), SchemaError> {
        let empty = Map::new();
        let properties = match node_obj.get("properties") {
            None => &empty,
            Some(value) => value
                .as_object()
                .ok_or_else(|| SchemaError::InvalidProperties {
                    path: path.to_string(),
                })?,
        };

        let required = match node_obj.get("required") {
            None => Vec::new(),
            Some(value) => value
                .as_array()
                .ok_or_else(|| SchemaError::InvalidRequired {
                    path: path.to_string(),
                })?
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| SchemaError::InvalidRequired {
                        path: path.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        for property in &required {
            if !properties.contains_key(*property) {
                return Err(SchemaError::UnknownRequired {
                    path: path.to_string(),
                    property: property.to_string(),
                });
            }
        }

        for name in properties.keys() {
            if !required.contains(&name.as_str()) {
                return Err(SchemaError::PropertyNotRequired {
                    path: path.to_string(),
                    property: name.clone(),
                });
            }
        }

        if node_obj.get("additionalProperties").and_then(Value::as_bool) != Some(false) {
            return Err(SchemaError::AdditionalPropertiesAllowed {
                path: path.to_string(),
            });
        }

        self.properties += properties.len();
        if self.properties > MAX_PROPERTIES {
            return Err(SchemaError::TooManyProperties {
                max: MAX_PROPERTIES,
            });
        }

        for (name, property) in properties {
            self.node(property, &format!("{path}/properties/{name}"), depth + 1)?;
        }

        Ok(())
    }
}

fn declared_types<'a>(
    node_obj: &'a Map<String, Value>,
    path: &str,
) -> Result<Vec<&'a str>, SchemaError> {
    let types = match node_obj.get("type") {
        None => return Ok(Vec::new()),
        Some(Value::String(name)) => vec![name.as_str()],
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
        Some(other) => {
            return Err(SchemaError::UnsupportedType {
                path: path.to_string(),
                type_name: other.to_string(),
            });
        }
    };

    for type_name in &types {
        if !SUPPORTED_TYPES.contains(type_name) {
            return Err(SchemaError::UnsupportedType {
                path: path.to_string(),
                type_name: type_name.to_string(),
            });
        }
    }

    Ok(types)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn closed(properties: Value, required: Value) -> Value {
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }

    #[test]
    fn accepts_strict_nested_schema() {
        let schema = closed(
            json!({
                "query": {"type": "string"},
                "limit": {"type": ["integer", "null"]},
                "filters": {
                    "type": "array",
                    "items": closed(json!({"field": {"type": "string"}}), json!(["field"]))
                }
            }),
            json!(["query", "limit", "filters"]),
        );

        assert_eq!(validate_schema(&schema), Ok(()));
    }

    #[test]
    fn rejects_non_object_root() {
        assert_eq!(
            validate_schema(&json!({"type": "string"})),
            Err(SchemaError::RootTypeMustBeObject)
        );
        assert_eq!(
            validate_schema(&json!("object")),
            Err(SchemaError::SchemaNotObject)
        );
    }

    #[test]
    fn rejects_open_objects() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a"]
        });
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::AdditionalPropertiesAllowed {
                path: "#".to_string()
            })
        );
    }

    #[test]
    fn rejects_optional_properties() {
        let schema = closed(
            json!({"a": {"type": "string"}, "b": {"type": "string"}}),
            json!(["a"]),
        );
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::PropertyNotRequired {
                path: "#".to_string(),
                property: "b".to_string()
            })
        );
    }

    #[test]
    fn rejects_required_without_property() {
        let schema = closed(json!({}), json!(["ghost"]));
        assert!(matches!(
            validate_schema(&schema),
            Err(SchemaError::UnknownRequired { property, .. }) if property == "ghost"
        ));
    }

    #[test]
    fn reports_nested_path() {
        let schema = closed(
            json!({"inner": {"type": "object", "properties": {}, "required": []}}),
            json!(["inner"]),
        );
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::AdditionalPropertiesAllowed {
                path: "#/properties/inner".to_string()
            })
        );
    }

    #[test]
    fn rejects_unknown_types() {
        let schema = closed(json!({"a": {"type": "date"}}), json!(["a"]));
        assert!(matches!(
            validate_schema(&schema),
            Err(SchemaError::UnsupportedType { type_name, .. }) if type_name == "date"
        ));
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut schema = closed(json!({}), json!([]));
        for _ in 0..=MAX_NESTING_DEPTH {
            schema = closed(json!({"child": schema}), json!(["child"]));
        }
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::TooDeep {
                max: MAX_NESTING_DEPTH
            })
        );
    }

    #[test]
    fn validates_definitions() {
        let schema = json!({
            "type": "object",
            "properties": {"node": {"$ref": "#/$defs/node"}},
            "required": ["node"],
            "additionalProperties": false,
            "$defs": {
                "node": {"type": "object", "properties": {"x": {"type": "number"}}, "required": []}
            }
        });
        assert!(matches!(
            validate_schema(&schema),
            Err(SchemaError::PropertyNotRequired { path, .. }) if path == "#/$defs/node"
        ));
    }

    #[test]
    fn rejects_root_any_of() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
            "anyOf": [{"type": "string"}]
        });
        assert_eq!(validate_schema(&schema), Err(SchemaError::RootAnyOf));
    }

    #[test]
    fn any_of_does_not_skip_object_checks() {
        let schema = closed(
            json!({
                "value": {
                    "type": "object",
                    "properties": {"x": {"type": "string"}},
                    "anyOf": [{"type": "null"}]
                }
            }),
            json!(["value"]),
        );
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::PropertyNotRequired {
                path: "#/properties/value".to_string(),
                property: "x".to_string()
            })
        );
    }

    #[test]
    fn any_of_branches_are_checked() {
        let schema = closed(
            json!({
                "value": {"anyOf": [{"type": "string"}, {"type": "object", "properties": {}}]}
            }),
            json!(["value"]),
        );
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::AdditionalPropertiesAllowed {
                path: "#/properties/value/anyOf/1".to_string()
            })
        );

        let nullable = closed(
            json!({"value": {"anyOf": [{"type": "string"}, {"type": "null"}]}}),
            json!(["value"]),
        );
        assert_eq!(validate_schema(&nullable), Ok(()));
    }

    #[test]
    fn rejects_ref_with_sibling_keywords() {
        let schema = closed(
            json!({
                "node": {
                    "type": "object",
                    "properties": {"x": {"type": "string"}},
                    "$ref": "#/$defs/node"
                }
            }),
            json!(["node"]),
        );
        assert_eq!(
            validate_schema(&schema),
            Err(SchemaError::RefWithSiblings {
                path: "#/properties/node".to_string(),
                keyword: "type".to_string()
            })
        );
    }

    #[test]
    fn bare_ref_is_accepted() {
        let schema = json!({
            "type": "object",
            "properties": {"node": {"$ref": "#/$defs/node"}},
            "required": ["node"],
            "additionalProperties": false,
            "$defs": {"node": closed(json!({"x": {"type": "number"}}), json!(["x"]))}
        });
        assert_eq!(validate_schema(&schema), Ok(()));
    }
}
