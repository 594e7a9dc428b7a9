use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::geometry::Geometry;

/// Underlying class of a document entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Floor,
    Grid,
    Level,
}

/// How an attribute may be written through `set_attribute`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeAccess {
    ReadWrite,
    ReadOnly,
    NotApplicable,
}

/// Attributes every kind carries. `type` and `family` are only changed
/// through `Document::change_type`.
const COMMON_ATTRIBUTES: &[(&str, AttributeAccess)] = &[
    ("type", AttributeAccess::ReadOnly),
    ("family", AttributeAccess::ReadOnly),
];

const FLOOR_ATTRIBUTES: &[(&str, AttributeAccess)] = &[
    ("level", AttributeAccess::ReadWrite),
    ("structural", AttributeAccess::ReadWrite),
    ("height_offset", AttributeAccess::ReadWrite),
    ("area", AttributeAccess::ReadOnly),
];

const GRID_ATTRIBUTES: &[(&str, AttributeAccess)] = &[];

const LEVEL_ATTRIBUTES: &[(&str, AttributeAccess)] = &[
    ("elevation", AttributeAccess::ReadOnly),
    ("building_story", AttributeAccess::ReadWrite),
];

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Floor, EntityKind::Grid, EntityKind::Level];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Floor => "floor",
            EntityKind::Grid => "grid",
            EntityKind::Level => "level",
        }
    }

    /// Category new entities of this kind are placed in.
    pub fn default_category(self) -> &'static str {
        match self {
            EntityKind::Floor => "Floors",
            EntityKind::Grid => "Grids",
            EntityKind::Level => "Levels",
        }
    }

    /// Base name used when neither an explicit name nor a template is given.
    pub fn default_name(self) -> &'static str {
        match self {
            EntityKind::Floor => "Floor",
            EntityKind::Grid => "Grid",
            EntityKind::Level => "Level",
        }
    }

    /// Types a fresh document knows about, as `(name, family)`.
    pub fn default_types(self) -> &'static [(&'static str, &'static str)] {
        match self {
            EntityKind::Floor => &[
                ("Basic", "Floor"),
                ("Generic 300mm", "Floor"),
                ("Foundation Slab", "Foundation"),
            ],
            EntityKind::Grid => &[("Bubble", "Grid"), ("Plain", "Grid")],
            EntityKind::Level => &[("Level Head", "Level"), ("Plain Head", "Level")],
        }
    }

    fn builtin_attributes(self) -> &'static [(&'static str, AttributeAccess)] {
        match self {
            EntityKind::Floor => FLOOR_ATTRIBUTES,
            EntityKind::Grid => GRID_ATTRIBUTES,
            EntityKind::Level => LEVEL_ATTRIBUTES,
        }
    }

    /// Built-in attributes of this kind that are not user-writable.
    pub fn read_only_attributes(self) -> impl Iterator<Item = &'static str> {
        COMMON_ATTRIBUTES
            .iter()
            .chain(self.builtin_attributes())
            .filter(|(_, access)| *access == AttributeAccess::ReadOnly)
            .map(|(name, _)| *name)
    }

    /// Resolve write access for `attribute` on this kind.
    ///
    /// Unknown names are free-form user attributes. A built-in attribute of
    /// another kind is not applicable here.
    pub fn attribute_access(self, attribute: &str) -> AttributeAccess {
        if let Some((_, access)) = COMMON_ATTRIBUTES
            .iter()
            .chain(self.builtin_attributes())
            .find(|(name, _)| *name == attribute)
        {
            return *access;
        }

        let foreign = EntityKind::ALL
            .iter()
            .filter(|k| **k != self)
            .any(|k| k.builtin_attributes().iter().any(|(name, _)| *name == attribute));
        if foreign {
            AttributeAccess::NotApplicable
        } else {
            AttributeAccess::ReadWrite
        }
    }
}

impl EntityKind {
    /// Label of the only geometry shape that defines this kind.
    pub fn geometry_label(self) -> &'static str {
        match self {
            EntityKind::Floor => "profile",
            EntityKind::Grid => "curve",
            EntityKind::Level => "elevation",
        }
    }

    /// Reject geometry that cannot define this kind.
    pub fn check_geometry(self, geometry: &Geometry) -> Result<(), DocumentError> {
        if geometry.label() == self.geometry_label() {
            Ok(())
        } else {
            Err(DocumentError::ConstraintViolation(format!(
                "{self} cannot be defined by a {}",
                geometry.label()
            )))
        }
    }

    /// Document-side write check for one attribute.
    pub fn check_writable(self, attribute: &str) -> Result<(), DocumentError> {
        match self.attribute_access(attribute) {
            AttributeAccess::ReadWrite => Ok(()),
            AttributeAccess::ReadOnly => Err(DocumentError::ReadOnlyAttribute {
                attribute: attribute.to_string(),
            }),
            AttributeAccess::NotApplicable => Err(DocumentError::NotApplicable {
                attribute: attribute.to_string(),
                kind: self,
            }),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "floor" => Ok(EntityKind::Floor),
            "grid" => Ok(EntityKind::Grid),
            "level" => Ok(EntityKind::Level),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}
