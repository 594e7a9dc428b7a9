use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::ids::EntityId;

/// Reference to another entity, written `{ ref = 12 }` in TOML.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "ref")]
    pub id: EntityId,
}

/// Value of a single entity attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Ref(EntityRef),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            AttributeValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Double(d) => Some(*d),
            AttributeValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Parse a loosely typed CLI value: `true`/`false`, integers, floats,
    /// `#id` references, everything else as text.
    pub fn parse_loose(s: &str) -> Self {
        match s {
            "true" => return AttributeValue::Bool(true),
            "false" => return AttributeValue::Bool(false),
            _ => {}
        }
        if let Some(id) = s.strip_prefix('#')
            && let Ok(id) = id.parse::<i64>()
        {
            return AttributeValue::Ref(EntityRef { id: EntityId(id) });
        }
        if let Ok(i) = s.parse::<i64>() {
            return AttributeValue::Int(i);
        }
        if let Ok(d) = s.parse::<f64>() {
            return AttributeValue::Double(d);
        }
        AttributeValue::Text(s.to_string())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Double(d) => write!(f, "{d}"),
            AttributeValue::Text(s) => write!(f, "{s:?}"),
            AttributeValue::Ref(r) => write!(f, "{}", r.id),
        }
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// Parameter set a node computes for one output slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Explicit name. When absent, the template's name or the kind default is used.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub attributes: Attributes,
    /// Untracked entity whose attributes seed new entities.
    #[serde(default)]
    pub template: Option<EntityId>,
}

impl Parameters {
    pub fn with_geometry(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn typed(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    pub fn attribute(mut self, name: &str, value: AttributeValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn from_template(mut self, template: EntityId) -> Self {
        self.template = Some(template);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loose() {
        assert_eq!(AttributeValue::parse_loose("true"), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::parse_loose("12"), AttributeValue::Int(12));
        assert_eq!(AttributeValue::parse_loose("1.5"), AttributeValue::Double(1.5));
        assert_eq!(
            AttributeValue::parse_loose("#3"),
            AttributeValue::Ref(EntityRef { id: EntityId(3) })
        );
        assert_eq!(
            AttributeValue::parse_loose("L2"),
            AttributeValue::Text("L2".to_string())
        );
    }

    #[test]
    fn test_untagged_json_shapes() {
        let v: AttributeValue = serde_json::from_str(r#"{"ref": 9}"#).unwrap();
        assert_eq!(v, AttributeValue::Ref(EntityRef { id: EntityId(9) }));
        let v: AttributeValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, AttributeValue::Int(3));
        let v: AttributeValue = serde_json::from_str("3.25").unwrap();
        assert_eq!(v, AttributeValue::Double(3.25));
    }
}
