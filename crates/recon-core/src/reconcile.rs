//! Per-kind reconciliation strategies and the lookup table that holds them.

use std::collections::BTreeMap;

use crate::decision::{self, Decision};
use crate::document::{CreateRequest, Document, EntityRecord};
use crate::error::{DocumentError, ValidationError};
use crate::geometry::{Geometry, Tolerances};
use crate::ids::EntityId;
use crate::kind::{AttributeAccess, EntityKind};
use crate::kinds::{FloorReconciler, GridReconciler, LevelReconciler};
use crate::mask::AttributeMask;
use crate::value::Parameters;

/// Reuse/create behavior for one entity kind.
///
/// Only `kind` and `can_edit_geometry` are required; the rest follow the
/// generic shape and are overridden where a kind needs extra rules.
pub trait EntityReconciler: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn default_name(&self) -> &'static str {
        self.kind().default_name()
    }

    fn mask(&self) -> AttributeMask {
        AttributeMask::for_kind(self.kind())
    }

    /// Reject parameters the document would refuse anyway. Runs before any
    /// document call.
    fn validate(&self, params: &Parameters, tolerances: &Tolerances) -> Result<(), ValidationError> {
        validate_common(self.kind(), params, tolerances)
    }

    /// Whether `current` can be turned into `requested` without recreating.
    fn can_edit_geometry(&self, current: &Geometry, requested: &Geometry) -> bool;

    fn try_reuse(
        &self,
        document: &mut dyn Document,
        existing: Option<EntityId>,
        params: &Parameters,
        tolerances: &Tolerances,
    ) -> Result<Decision, DocumentError> {
        decision::try_reuse(self, document, existing, params, tolerances)
    }

    /// Create a fresh entity. A same-kind template supplies the type when
    /// the parameters name none.
    fn create(
        &self,
        document: &mut dyn Document,
        params: &Parameters,
        template: Option<&EntityRecord>,
    ) -> Result<EntityId, DocumentError> {
        let geometry = params.geometry.clone().ok_or_else(|| {
            DocumentError::ConstraintViolation(format!("{} needs a defining geometry", self.kind()))
        })?;
        let type_name = params.type_name.clone().or_else(|| {
            template
                .filter(|t| t.kind == self.kind())
                .map(|t| t.type_name.clone())
        });
        let request = CreateRequest {
            category: None,
            type_name,
            geometry,
            attributes: params.attributes.clone(),
        };
        document.create_entity(self.kind(), &request)
    }
}

/// Checks shared by every kind: geometry present, of the right shape and
/// valid; no read-only or foreign attributes; no blank name.
pub fn validate_common(
    kind: EntityKind,
    params: &Parameters,
    tolerances: &Tolerances,
) -> Result<(), ValidationError> {
    let geometry = params
        .geometry
        .as_ref()
        .ok_or_else(|| ValidationError::new("geometry", "is required"))?;

    let expected = kind.geometry_label();
    if geometry.label() != expected {
        return Err(ValidationError::new(
            "geometry",
            format!("{kind} expects a {expected}, got a {}", geometry.label()),
        ));
    }
    geometry.validate(tolerances)?;

    for attribute in params.attributes.keys() {
        match kind.attribute_access(attribute) {
            AttributeAccess::ReadWrite => {}
            AttributeAccess::ReadOnly => {
                return Err(ValidationError::new(attribute, "is read-only"));
            }
            AttributeAccess::NotApplicable => {
                return Err(ValidationError::new(
                    attribute,
                    format!("does not apply to {kind}"),
                ));
            }
        }
    }

    if let Some(name) = &params.name
        && name.trim().is_empty()
    {
        return Err(ValidationError::new("name", "cannot be blank"));
    }

    Ok(())
}

/// Reconcilers by kind.
#[derive(Default)]
pub struct ReconcilerRegistry {
    reconcilers: BTreeMap<EntityKind, Box<dyn EntityReconciler>>,
}

impl ReconcilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(FloorReconciler));
        registry.register(Box::new(GridReconciler));
        registry.register(Box::new(LevelReconciler));
        registry
    }

    /// Register a reconciler, replacing any previous one for its kind.
    pub fn register(&mut self, reconciler: Box<dyn EntityReconciler>) {
        self.reconcilers.insert(reconciler.kind(), reconciler);
    }

    pub fn get(&self, kind: EntityKind) -> Option<&dyn EntityReconciler> {
        self.reconcilers.get(&kind).map(|r| r.as_ref())
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.reconcilers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::value::AttributeValue;

    fn grid_params() -> Parameters {
        Parameters::with_geometry(Geometry::Curve(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(0.0, 20.0, 0.0),
        ]))
    }

    #[test]
    fn test_registry_has_builtin_kinds() {
        let registry = ReconcilerRegistry::with_builtin_kinds();
        let kinds: Vec<_> = registry.kinds().collect();
        assert_eq!(kinds, EntityKind::ALL.to_vec());
        assert_eq!(registry.get(EntityKind::Grid).unwrap().default_name(), "Grid");
    }

    #[test]
    fn test_empty_registry() {
        assert!(ReconcilerRegistry::new().get(EntityKind::Floor).is_none());
    }

    #[test]
    fn test_validate_requires_geometry() {
        let err = validate_common(EntityKind::Grid, &Parameters::default(), &Tolerances::default())
            .unwrap_err();
        assert_eq!(err.field, "geometry");
    }

    #[test]
    fn test_validate_rejects_wrong_geometry_shape() {
        let err = validate_common(EntityKind::Floor, &grid_params(), &Tolerances::default())
            .unwrap_err();
        assert!(err.message.contains("expects a profile"), "{err}");
    }

    #[test]
    fn test_validate_rejects_read_only_and_foreign_attributes() {
        let tol = Tolerances::default();
        let params = grid_params().attribute("type", AttributeValue::Text("Plain".into()));
        assert!(validate_common(EntityKind::Grid, &params, &tol).is_err());

        let params = grid_params().attribute("structural", AttributeValue::Bool(true));
        let err = validate_common(EntityKind::Grid, &params, &tol).unwrap_err();
        assert_eq!(err.field, "structural");

        let params = grid_params().attribute("comments", AttributeValue::Text("A".into()));
        assert!(validate_common(EntityKind::Grid, &params, &tol).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let params = grid_params().named(" ");
        assert!(validate_common(EntityKind::Grid, &params, &Tolerances::default()).is_err());
    }
}
