use crate::error::ValidationError;
use crate::geometry::{Geometry, Tolerances};
use crate::kind::EntityKind;
use crate::reconcile::{EntityReconciler, validate_common};
use crate::value::Parameters;

/// Floors are defined by a closed horizontal boundary. The boundary can be
/// edited in place only while its vertex count stays the same.
pub struct FloorReconciler;

impl EntityReconciler for FloorReconciler {
    fn kind(&self) -> EntityKind {
        EntityKind::Floor
    }

    fn validate(&self, params: &Parameters, tolerances: &Tolerances) -> Result<(), ValidationError> {
        validate_common(EntityKind::Floor, params, tolerances)?;
        if let Some(value) = params.attributes.get("structural")
            && value.as_bool().is_none()
        {
            return Err(ValidationError::new("structural", "must be true or false"));
        }
        if let Some(value) = params.attributes.get("height_offset")
            && !value.as_f64().is_some_and(f64::is_finite)
        {
            return Err(ValidationError::new("height_offset", "must be a finite number"));
        }
        Ok(())
    }

    fn can_edit_geometry(&self, current: &Geometry, requested: &Geometry) -> bool {
        matches!(
            (current, requested),
            (Geometry::Profile(_), Geometry::Profile(_))
        ) && current.segment_count() == requested.segment_count()
    }
}
