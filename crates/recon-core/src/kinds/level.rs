use crate::error::ValidationError;
use crate::geometry::{Geometry, Tolerances};
use crate::kind::EntityKind;
use crate::reconcile::{EntityReconciler, validate_common};
use crate::value::Parameters;

/// Levels are a single elevation, always movable in place.
pub struct LevelReconciler;

impl EntityReconciler for LevelReconciler {
    fn kind(&self) -> EntityKind {
        EntityKind::Level
    }

    fn validate(&self, params: &Parameters, tolerances: &Tolerances) -> Result<(), ValidationError> {
        validate_common(EntityKind::Level, params, tolerances)?;
        if let Some(value) = params.attributes.get("building_story")
            && value.as_bool().is_none()
        {
            return Err(ValidationError::new("building_story", "must be true or false"));
        }
        Ok(())
    }

    fn can_edit_geometry(&self, current: &Geometry, requested: &Geometry) -> bool {
        matches!(
            (current, requested),
            (Geometry::Elevation(_), Geometry::Elevation(_))
        )
    }
}
