//! Reuse/recreate decision: can the bound entity be edited in place to
//! match newly computed parameters?
//!
//! Edits are applied as the procedure goes. A document rejection part-way
//! leaves earlier edits on the old entity, which is about to be replaced
//! anyway.

use std::fmt;

use crate::document::Document;
use crate::error::DocumentError;
use crate::geometry::Tolerances;
use crate::ids::EntityId;
use crate::kind::EntityKind;
use crate::reconcile::EntityReconciler;
use crate::value::Parameters;

/// One in-place change applied while reusing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Geometry,
    Type(String),
    Attribute(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecreateReason {
    /// Nothing bound, or the bound entity no longer exists.
    Missing,
    IncompatibleKind(EntityKind),
    /// Segment count change with no in-place edit.
    Topology { from: usize, to: usize },
    /// The document refused an in-place edit.
    Rejected(String),
    /// Tracking mode never reuses.
    Superseded,
}

impl fmt::Display for RecreateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecreateReason::Missing => f.write_str("no live entity bound"),
            RecreateReason::IncompatibleKind(kind) => write!(f, "bound entity is a {kind}"),
            RecreateReason::Topology { from, to } => {
                write!(f, "{from} segments cannot be edited into {to}")
            }
            RecreateReason::Rejected(msg) => write!(f, "in-place edit rejected: {msg}"),
            RecreateReason::Superseded => f.write_str("superseded"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// Entity kept; `mutations` is empty when it already matched.
    Reuse {
        entity: EntityId,
        mutations: Vec<Mutation>,
    },
    Recreate(RecreateReason),
}

impl Decision {
    pub fn is_reuse(&self) -> bool {
        matches!(self, Decision::Reuse { .. })
    }
}

/// Generic reuse procedure shared by all kinds.
///
/// Constraint violations turn into `Recreate`; any other document error is
/// returned as is.
pub fn try_reuse<R: EntityReconciler + ?Sized>(
    reconciler: &R,
    document: &mut dyn Document,
    existing: Option<EntityId>,
    params: &Parameters,
    tolerances: &Tolerances,
) -> Result<Decision, DocumentError> {
    let Some(record) = existing.and_then(|id| document.entity(id)) else {
        return Ok(Decision::Recreate(RecreateReason::Missing));
    };
    if record.kind != reconciler.kind() {
        return Ok(Decision::Recreate(RecreateReason::IncompatibleKind(
            record.kind,
        )));
    }

    let mut mutations = Vec::new();

    if let Some(geometry) = &params.geometry
        && !record.geometry.approx_eq(geometry, tolerances.vertex)
    {
        if !reconciler.can_edit_geometry(&record.geometry, geometry) {
            return Ok(Decision::Recreate(RecreateReason::Topology {
                from: record.geometry.segment_count(),
                to: geometry.segment_count(),
            }));
        }
        match document.edit_geometry(record.id, geometry) {
            Ok(()) => mutations.push(Mutation::Geometry),
            Err(e) if e.is_constraint_violation() => {
                return Ok(Decision::Recreate(RecreateReason::Rejected(e.to_string())));
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(type_name) = &params.type_name
        && *type_name != record.type_name
    {
        match document.change_type(record.id, type_name) {
            Ok(()) => mutations.push(Mutation::Type(type_name.clone())),
            Err(e) if e.is_constraint_violation() => {
                return Ok(Decision::Recreate(RecreateReason::Rejected(e.to_string())));
            }
            Err(e) => return Err(e),
        }
    }

    for (name, value) in &params.attributes {
        if record.attribute(name).as_ref() == Some(value) {
            continue;
        }
        match document.set_attribute(record.id, name, value.clone()) {
            Ok(()) => mutations.push(Mutation::Attribute(name.clone())),
            Err(e) if e.is_constraint_violation() => {
                return Ok(Decision::Recreate(RecreateReason::Rejected(e.to_string())));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Decision::Reuse {
        entity: record.id,
        mutations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Geometry, Point};
    use crate::kinds::{FloorReconciler, GridReconciler};
    use crate::memory::MemoryDocument;
    use crate::value::AttributeValue;

    fn square(size: f64) -> Geometry {
        Geometry::Profile(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(size, 0.0, 0.0),
            Point::new(size, size, 0.0),
            Point::new(0.0, size, 0.0),
        ])
    }

    fn triangle() -> Geometry {
        Geometry::Profile(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(10.0, 0.0, 0.0),
            Point::new(0.0, 10.0, 0.0),
        ])
    }

    fn setup(params: &Parameters) -> (MemoryDocument, EntityId) {
        let mut doc = MemoryDocument::new();
        let id = doc
            .edit("create", |d| FloorReconciler.create(d, params, None))
            .unwrap();
        (doc, id)
    }

    fn decide(doc: &mut MemoryDocument, existing: Option<EntityId>, params: &Parameters) -> Decision {
        doc.edit("reuse", |d| {
            FloorReconciler.try_reuse(d, existing, params, &Tolerances::default())
        })
        .unwrap()
    }

    #[test]
    fn test_missing_entity_recreates() {
        let mut doc = MemoryDocument::new();
        let params = Parameters::with_geometry(square(10.0));
        assert_eq!(
            decide(&mut doc, None, &params),
            Decision::Recreate(RecreateReason::Missing)
        );
        assert_eq!(
            decide(&mut doc, Some(EntityId(99)), &params),
            Decision::Recreate(RecreateReason::Missing)
        );
    }

    #[test]
    fn test_unchanged_parameters_reuse_without_mutation() {
        let params = Parameters::with_geometry(square(10.0))
            .typed("Basic")
            .attribute("level", AttributeValue::Text("L1".into()));
        let (mut doc, id) = setup(&params);
        let before = doc.mutation_count();
        assert_eq!(
            decide(&mut doc, Some(id), &params),
            Decision::Reuse {
                entity: id,
                mutations: vec![]
            }
        );
        assert_eq!(doc.mutation_count(), before);
    }

    #[test]
    fn test_same_vertex_count_edits_in_place() {
        let (mut doc, id) = setup(&Parameters::with_geometry(square(10.0)));
        let params = Parameters::with_geometry(square(20.0))
            .attribute("level", AttributeValue::Text("L2".into()));
        let decision = decide(&mut doc, Some(id), &params);
        assert_eq!(
            decision,
            Decision::Reuse {
                entity: id,
                mutations: vec![Mutation::Geometry, Mutation::Attribute("level".into())]
            }
        );
        assert!((doc.entity(id).unwrap().geometry.area() - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_topology_change_recreates() {
        let (mut doc, id) = setup(&Parameters::with_geometry(square(10.0)));
        let decision = decide(&mut doc, Some(id), &Parameters::with_geometry(triangle()));
        assert_eq!(
            decision,
            Decision::Recreate(RecreateReason::Topology { from: 4, to: 3 })
        );
    }

    #[test]
    fn test_rejected_type_change_recreates() {
        let (mut doc, id) = setup(&Parameters::with_geometry(square(10.0)));
        let params = Parameters::with_geometry(square(10.0)).typed("Foundation Slab");
        let decision = decide(&mut doc, Some(id), &params);
        assert!(matches!(
            decision,
            Decision::Recreate(RecreateReason::Rejected(_))
        ));

        let params = Parameters::with_geometry(square(10.0)).typed("Generic 300mm");
        assert!(decide(&mut doc, Some(id), &params).is_reuse());
        assert_eq!(doc.entity(id).unwrap().type_name, "Generic 300mm");
    }

    #[test]
    fn test_kind_mismatch_recreates() {
        let mut doc = MemoryDocument::new();
        let grid_params = Parameters::with_geometry(Geometry::Curve(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(5.0, 0.0, 0.0),
        ]));
        let grid = doc
            .edit("create", |d| GridReconciler.create(d, &grid_params, None))
            .unwrap();
        let decision = decide(&mut doc, Some(grid), &Parameters::with_geometry(square(10.0)));
        assert_eq!(
            decision,
            Decision::Recreate(RecreateReason::IncompatibleKind(EntityKind::Grid))
        );
    }
}
