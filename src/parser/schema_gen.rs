//! JSON-Schema generation for compiled typedefs.
//!
//! The generated document is the validation artifact stored by the
//! registry; its exact bytes are the identity of the type version, so
//! generation must be deterministic. `serde_json` object maps are sorted by
//! key, and all structure comes from the AST, which makes the output a pure
//! function of the compiled type.

use serde_json::{json, Map, Value};

use crate::ast::{Type, Typedef};

const SCHEMA_DIALECT: &str = "http://json-schema.org/draft-04/schema#";

/// Render the stored JSON-Schema document for one typedef.
pub fn schema_document(typedef: &Typedef) -> String {
    let mut doc = match type_schema(&typedef.alias_type) {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("type".to_string(), other);
            map
        }
    };
    doc.insert("$schema".to_string(), Value::String(SCHEMA_DIALECT.into()));
    doc.insert("id".to_string(), Value::String(typedef.name.clone()));
    doc.insert(
        "description".to_string(),
        Value::String(typedef.comment.clone()),
    );
    Value::Object(doc).to_string()
}

/// Schema fragment for one type node. References are rendered through
/// their embedded definition, so the output is self-contained.
fn type_schema(t: &Type) -> Value {
    match t {
        Type::Typedef(td) => type_schema(&td.alias_type),
        Type::List(elem) => json!({
            "type": "array",
            "items": type_schema(elem),
        }),
        Type::Mapping { value, .. } => json!({
            "type": "object",
            "additionalProperties": type_schema(value),
        }),
        Type::Tuple(elems) => {
            let items: Vec<Value> = elems.iter().map(type_schema).collect();
            json!({
                "type": "array",
                "items": items,
                "minItems": elems.len(),
                "maxItems": elems.len(),
            })
        }
        Type::Scalar(scalar) => {
            let mut map = Map::new();
            let kind = match scalar.kind {
                crate::ast::ScalarKind::Int => "integer",
                crate::ast::ScalarKind::Float => "number",
                crate::ast::ScalarKind::String => "string",
            };
            map.insert("type".to_string(), Value::String(kind.into()));
            if let Some(id_ref) = &scalar.id_reference {
                map.insert("id-reference".to_string(), Value::String(id_ref.clone()));
            }
            Value::Object(map)
        }
        Type::UnspecifiedObject => json!({ "type": "object" }),
        Type::Struct(st) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for item in &st.items {
                properties.insert(item.name.clone(), type_schema(&item.item_type));
                if !item.optional {
                    required.push(Value::String(item.name.clone()));
                }
            }
            let mut map = Map::new();
            map.insert("type".to_string(), Value::String("object".into()));
            map.insert("properties".to_string(), Value::Object(properties));
            map.insert("required".to_string(), Value::Array(required));
            map.insert("additionalProperties".to_string(), Value::Bool(true));
            Value::Object(map)
        }
    }
}
