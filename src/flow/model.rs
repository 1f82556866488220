//! Typed decision parameters attached to a cell.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::document::{ModelLink, UnparsedModel};
use super::FlowError;

/// A decoded model field.
///
/// Only four shapes are recognised. Fields of any other JSON shape
/// (numbers, null, arrays or objects holding non-strings) are skipped and
/// listed in [`Model::skipped`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ModelValue {
    Str(String),
    Bool(bool),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl ModelValue {
    /// Decode a JSON value by its kind, `None` for unrecognised shapes.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(ModelValue::Str(s.clone())),
            Value::Bool(b) => Some(ModelValue::Bool(*b)),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(ModelValue::List),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(ModelValue::Map),
            Value::Null | Value::Number(_) => None,
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            ModelValue::Str(_) => "string",
            ModelValue::Bool(_) => "boolean",
            ModelValue::List(_) => "list",
            ModelValue::Map(_) => "map",
        }
    }
}

/// Decision data of one cell.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub fields: BTreeMap<String, ModelValue>,
    pub links: Vec<ModelLink>,
    /// Field names dropped because their shape is not recognised.
    pub skipped: Vec<String>,
}

impl Model {
    pub fn decode(raw: &UnparsedModel) -> Self {
        let mut fields = BTreeMap::new();
        let mut skipped = Vec::new();

        if let Some(data) = &raw.data {
            for (key, value) in data {
                match ModelValue::from_json(value) {
                    Some(v) => {
                        fields.insert(key.clone(), v);
                    }
                    None => {
                        debug!(model = %raw.id, field = %key, "skipping model field of unsupported shape");
                        skipped.push(key.clone());
                    }
                }
            }
        }

        Self {
            id: raw.id.clone(),
            name: raw.name.clone(),
            fields,
            links: raw.links.clone(),
            skipped,
        }
    }

    pub fn get(&self, field: &str) -> Option<&ModelValue> {
        self.fields.get(field)
    }

    fn mismatch(&self, field: &str, expected: &str, found: &ModelValue) -> FlowError {
        FlowError::InvalidModelField {
            cell: self.id.clone(),
            field: field.to_string(),
            reason: format!("expected {}, found {}", expected, found.shape()),
        }
    }

    pub fn str(&self, field: &str) -> Result<Option<&str>, FlowError> {
        match self.get(field) {
            None => Ok(None),
            Some(ModelValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.mismatch(field, "string", other)),
        }
    }

    /// Boolean field, also accepting `"true"`/`"false"` strings.
    pub fn bool(&self, field: &str) -> Result<Option<bool>, FlowError> {
        match self.get(field) {
            None => Ok(None),
            Some(ModelValue::Bool(b)) => Ok(Some(*b)),
            Some(ModelValue::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Some(true)),
                "false" | "no" | "0" | "" => Ok(Some(false)),
                _ => Err(self.mismatch(field, "boolean", &ModelValue::Str(s.clone()))),
            },
            Some(other) => Err(self.mismatch(field, "boolean", other)),
        }
    }

    /// List field; a comma-separated string is accepted as a list.
    pub fn list(&self, field: &str) -> Result<Option<Vec<String>>, FlowError> {
        match self.get(field) {
            None => Ok(None),
            Some(ModelValue::List(items)) => Ok(Some(items.clone())),
            Some(ModelValue::Str(s)) => Ok(Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Some(other) => Err(self.mismatch(field, "list", other)),
        }
    }

    pub fn map(&self, field: &str) -> Result<Option<&BTreeMap<String, String>>, FlowError> {
        match self.get(field) {
            None => Ok(None),
            Some(ModelValue::Map(m)) => Ok(Some(m)),
            Some(other) => Err(self.mismatch(field, "map", other)),
        }
    }

    /// Numeric parameter. Numbers are carried as strings since bare JSON
    /// numbers are not a recognised field shape.
    pub fn number(&self, field: &str) -> Result<Option<f64>, FlowError> {
        match self.str(field)? {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => s.trim().parse::<f64>().map(Some).map_err(|_| FlowError::InvalidModelField {
                cell: self.id.clone(),
                field: field.to_string(),
                reason: format!("'{}' is not a number", s),
            }),
        }
    }

    /// Guard of the link leading to `target`.
    pub fn link_to(&self, target: &str) -> Option<&ModelLink> {
        self.links.iter().find(|l| l.cell == target)
    }
}
