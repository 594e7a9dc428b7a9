use crate::geometry::Geometry;
use crate::kind::EntityKind;
use crate::reconcile::EntityReconciler;

/// Grids follow an open polyline; edited in place while the segment count
/// holds.
pub struct GridReconciler;

impl EntityReconciler for GridReconciler {
    fn kind(&self) -> EntityKind {
        EntityKind::Grid
    }

    fn can_edit_geometry(&self, current: &Geometry, requested: &Geometry) -> bool {
        matches!((current, requested), (Geometry::Curve(_), Geometry::Curve(_)))
            && current.segment_count() == requested.segment_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn test_segment_count_governs_edit() {
        let line = Geometry::Curve(vec![Point::new(0.0, 0.0, 0.0), Point::new(0.0, 9.0, 0.0)]);
        let moved = Geometry::Curve(vec![Point::new(3.0, 0.0, 0.0), Point::new(3.0, 9.0, 0.0)]);
        let polyline = Geometry::Curve(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(0.0, 9.0, 0.0),
            Point::new(4.0, 12.0, 0.0),
        ]);
        assert!(GridReconciler.can_edit_geometry(&line, &moved));
        assert!(!GridReconciler.can_edit_geometry(&line, &polyline));
    }
}
