//! Structural input schemas for action declarations.
//!
//! The model sees these as JSON Schema objects. Modules declare them with a
//! small builder instead of hand-written JSON so required fields and enums
//! stay in one place.

use serde_json::{json, Map, Value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array(Box<FieldKind>),
    Enum(Vec<String>),
}

impl FieldKind {
    pub fn array_of(item: FieldKind) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    fn to_json(&self) -> Map<String, Value> {
        let mut object = Map::new();
        match self {
            Self::String => {
                object.insert("type".into(), json!("string"));
            }
            Self::Number => {
                object.insert("type".into(), json!("number"));
            }
            Self::Integer => {
                object.insert("type".into(), json!("integer"));
            }
            Self::Boolean => {
                object.insert("type".into(), json!("boolean"));
            }
            Self::Object => {
                object.insert("type".into(), json!("object"));
            }
            Self::Array(item) => {
                object.insert("type".into(), json!("array"));
                object.insert("items".into(), Value::Object(item.to_json()));
            }
            Self::Enum(values) => {
                object.insert("type".into(), json!("string"));
                object.insert("enum".into(), json!(values));
            }
        }
        object
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub description: Option<String>,
    pub required: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputSchema {
    fields: Vec<Field>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, description, true)
    }

    pub fn optional(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(name, kind, description, false)
    }

    fn field(mut self, name: &str, kind: FieldKind, description: &str, required: bool) -> Self {
        let description = (!description.is_empty()).then(|| description.to_string());
        self.fields.push(Field { name: name.to_string(), kind, description, required });
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|field| field.required).map(|field| field.name.as_str())
    }

    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = field.kind.to_json();
            if let Some(description) = &field.description {
                property.insert("description".into(), json!(description));
            }
            properties.insert(field.name.clone(), Value::Object(property));
        }

        let required: Vec<&str> = self.required_fields().collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FieldKind, InputSchema};

    #[test]
    fn schema_renders_required_optional_and_enum_fields() {
        let schema = InputSchema::new()
            .required("name", FieldKind::String, "Story title")
            .optional("story_type", FieldKind::one_of(["feature", "bug", "chore"]), "")
            .optional("labels", FieldKind::array_of(FieldKind::String), "Label names");

        assert_eq!(
            schema.to_json(),
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Story title"},
                    "story_type": {"type": "string", "enum": ["feature", "bug", "chore"]},
                    "labels": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Label names"
                    }
                },
                "required": ["name"]
            })
        );
    }

    #[test]
    fn empty_schema_is_an_object_without_required_fields() {
        let rendered = InputSchema::new().to_json();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!([]));
    }
}
