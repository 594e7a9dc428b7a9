use std::collections::BTreeSet;

use crate::kind::EntityKind;

/// Identity and type bindings, never transplanted for any kind.
const IDENTITY_ATTRIBUTES: &[&str] = &["type", "family"];

const FLOOR_MASK: &[&str] = &["level", "structural", "height_offset", "area"];
const GRID_MASK: &[&str] = &[];
const LEVEL_MASK: &[&str] = &["elevation"];

/// Attributes excluded from copy-on-replace because they encode identity,
/// type or derived content rather than user content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeMask {
    excluded: BTreeSet<String>,
}

impl AttributeMask {
    pub fn new<'a>(attributes: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            excluded: attributes.into_iter().map(str::to_string).collect(),
        }
    }

    /// Static mask for an entity kind.
    pub fn for_kind(kind: EntityKind) -> Self {
        let specific = match kind {
            EntityKind::Floor => FLOOR_MASK,
            EntityKind::Grid => GRID_MASK,
            EntityKind::Level => LEVEL_MASK,
        };
        Self::new(IDENTITY_ATTRIBUTES.iter().chain(specific).copied())
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.excluded.contains(attribute)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_attributes_always_masked() {
        for kind in EntityKind::ALL {
            let mask = AttributeMask::for_kind(kind);
            assert!(mask.contains("type"), "{kind}");
            assert!(mask.contains("family"), "{kind}");
            assert!(!mask.contains("comments"), "{kind}");
        }
    }

    #[test]
    fn test_floor_mask() {
        let mask = AttributeMask::for_kind(EntityKind::Floor);
        assert!(mask.contains("level"));
        assert!(mask.contains("area"));
        assert_eq!(mask.len(), 6);
    }

    #[test]
    fn test_read_only_attributes_are_masked() {
        for kind in EntityKind::ALL {
            let mask = AttributeMask::for_kind(kind);
            for attr in kind.read_only_attributes() {
                assert!(mask.contains(attr), "{kind}.{attr}");
            }
        }
    }
}
