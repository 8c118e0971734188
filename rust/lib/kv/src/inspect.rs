//! Document inspection: flattening nested values and summarizing the field
//! types found across a set of documents.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Flatten nested objects and arrays into dotted paths: `a.b`, `a[0].c`.
///
/// Arrays whose elements are all scalars stay as one leaf. Nulls are
/// dropped. `root` prefixes every path; pass `""` for none.
pub fn flatten(root: &str, value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(root, value, &mut out);
    out
}

fn flatten_into(root: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Null => {}
        Value::Array(items) if items.iter().any(is_container) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(&format!("{}[{}]", root, i), item, out);
            }
        }
        Value::Object(fields) => flatten_object(root, fields, out),
        leaf => {
            out.insert(root.to_string(), leaf.clone());
        }
    }
}

fn flatten_object(root: &str, fields: &Map<String, Value>, out: &mut BTreeMap<String, Value>) {
    for (name, value) in fields {
        let path = if root.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", root, name)
        };
        flatten_into(&path, value, out);
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Type tag reported by `describe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ValueType {
    #[serde(rename = "none_type")]
    Null,
    #[serde(rename = "boolean_type")]
    Boolean,
    #[serde(rename = "integer_type")]
    Integer,
    #[serde(rename = "float_type")]
    Float,
    #[serde(rename = "string_type")]
    String,
    #[serde(rename = "list_type")]
    List,
    #[serde(rename = "dict_type")]
    Dict,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Boolean,
            Value::Number(n) if n.is_f64() => ValueType::Float,
            Value::Number(_) => ValueType::Integer,
            Value::String(_) => ValueType::String,
            Value::Array(_) => ValueType::List,
            Value::Object(_) => ValueType::Dict,
        }
    }
}

/// Type histogram of one flattened field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldStructure {
    pub name: String,
    /// Number of documents in which the field had each type.
    pub types: BTreeMap<ValueType, u64>,
    /// For list leaves, the element types seen across all documents.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub elements: BTreeMap<ValueType, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Structure {
    pub total_documents: u64,
    /// Fields in first-seen order.
    pub structure: Vec<FieldStructure>,
}

/// Summarize the flattened field types of `documents`.
pub fn describe<'a, I>(documents: I) -> Structure
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut total_documents = 0;
    let mut fields: Vec<FieldStructure> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();

    for document in documents {
        total_documents += 1;
        for (name, value) in flatten("", document) {
            let idx = *index.entry(name.clone()).or_insert_with(|| {
                fields.push(FieldStructure {
                    name,
                    types: BTreeMap::new(),
                    elements: BTreeMap::new(),
                });
                fields.len() - 1
            });
            let field = &mut fields[idx];
            *field.types.entry(ValueType::of(&value)).or_default() += 1;
            if let Value::Array(items) = &value {
                for item in items {
                    *field.elements.entry(ValueType::of(item)).or_default() += 1;
                }
            }
        }
    }

    Structure {
        total_documents,
        structure: fields,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flatten_nested() {
        let doc = json!({
            "a": {"b": 1, "c": null},
            "tags": ["x", "y"],
            "items": [{"n": 1}, {"n": 2}],
            "empty": {},
        });
        let flat = flatten("", &doc);
        assert_eq!(flat.len(), 4);
        assert_eq!(flat["a.b"], json!(1));
        assert_eq!(flat["tags"], json!(["x", "y"]));
        assert_eq!(flat["items[0].n"], json!(1));
        assert_eq!(flat["items[1].n"], json!(2));
    }

    #[test]
    fn flatten_with_root_and_scalar() {
        let flat = flatten("doc", &json!({"x": true}));
        assert_eq!(flat["doc.x"], json!(true));
        let flat = flatten("v", &json!(3));
        assert_eq!(flat["v"], json!(3));
        assert!(flatten("v", &Value::Null).is_empty());
    }

    #[test]
    fn describe_counts_types() {
        let docs = vec![
            json!({"id": 1, "name": "a", "tags": ["x", 1]}),
            json!({"id": 2.5, "name": "b", "tags": ["y"]}),
            json!({"id": 3}),
        ];
        let s = describe(&docs);
        assert_eq!(s.total_documents, 3);

        let id = s.structure.iter().find(|f| f.name == "id").unwrap();
        assert_eq!(id.types[&ValueType::Integer], 2);
        assert_eq!(id.types[&ValueType::Float], 1);

        let tags = s.structure.iter().find(|f| f.name == "tags").unwrap();
        assert_eq!(tags.types[&ValueType::List], 2);
        assert_eq!(tags.elements[&ValueType::String], 2);
        assert_eq!(tags.elements[&ValueType::Integer], 1);

        let name = s.structure.iter().find(|f| f.name == "name").unwrap();
        assert_eq!(name.types[&ValueType::String], 2);
        assert!(name.elements.is_empty());
    }

    #[test]
    fn describe_serializes_with_type_names() {
        let docs = vec![json!({"ok": true})];
        let value = serde_json::to_value(describe(&docs)).unwrap();
        assert_eq!(value["total_documents"], 1);
        assert_eq!(value["structure"][0]["name"], "ok");
        assert_eq!(value["structure"][0]["types"]["boolean_type"], 1);
    }
}
