//! Replacement transaction: create the new entity, carry attributes over
//! from the old entity and the template, rebind, drop the old entity and
//! name the new one.
//!
//! Runs inside the node's document transaction; the caller rolls back on
//! any error returned from here.

use std::collections::BTreeSet;

use crate::document::{Document, EntityRecord};
use crate::error::DocumentError;
use crate::ids::EntityId;
use crate::kind::AttributeAccess;
use crate::mask::AttributeMask;
use crate::naming;
use crate::reconcile::EntityReconciler;
use crate::value::Parameters;

/// Transient state of one replacement.
#[derive(Debug)]
pub struct PendingReplacement {
    pub old: Option<EntityRecord>,
    pub new: EntityId,
    pub mask: AttributeMask,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReplaceOutcome {
    pub entity: EntityId,
    pub name: String,
    /// Attributes copied from the old entity or the template.
    pub transplanted: Vec<String>,
    /// Old entity that survived deletion and is no longer tracked.
    pub orphan: Option<EntityId>,
}

/// Copy `source`'s explicitly set attributes onto `target`, skipping masked
/// ones, anything in `skip` and anything the target cannot take.
/// Incompatible attributes are dropped silently.
pub fn transplant(
    document: &mut dyn Document,
    source: &EntityRecord,
    target: EntityId,
    mask: &AttributeMask,
    skip: &BTreeSet<String>,
) -> Result<Vec<String>, DocumentError> {
    let target_record = document
        .entity(target)
        .ok_or(DocumentError::NotFound(target))?;

    let mut copied = Vec::new();
    for (name, value) in &source.attributes {
        if mask.contains(name) || skip.contains(name) {
            continue;
        }
        if target_record.kind.attribute_access(name) != AttributeAccess::ReadWrite {
            continue;
        }
        if target_record.attribute(name).as_ref() == Some(value) {
            continue;
        }
        match document.set_attribute(target, name, value.clone()) {
            Ok(()) => copied.push(name.clone()),
            Err(
                e @ (DocumentError::ReadOnlyAttribute { .. }
                | DocumentError::NotApplicable { .. }
                | DocumentError::ConstraintViolation(_)),
            ) => {
                tracing::debug!(attribute = %name, from = %source.id, to = %target, "skipped transplant: {e}");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(copied)
}

/// Resolve the final name of `entity` within its (kind, category) scope and
/// apply it if it changed.
pub fn assign_name(
    document: &mut dyn Document,
    entity: EntityId,
    base: &str,
    previous: Option<&str>,
) -> Result<String, DocumentError> {
    let record = document
        .entity(entity)
        .ok_or(DocumentError::NotFound(entity))?;
    let existing: Vec<String> = document
        .names_in_scope(record.kind, &record.category)
        .into_iter()
        .filter(|(id, _)| *id != entity)
        .map(|(_, name)| name)
        .collect();

    let name = naming::resolve(base, &existing, previous);
    if name != record.name {
        document.set_name(entity, &name)?;
        tracing::debug!(%entity, from = %record.name, to = %name, "renamed");
    }
    Ok(name)
}

/// Replace `old` (if any) with a freshly created entity.
///
/// Old-entity attributes win over the template's; the template only fills
/// attributes the old entity never set. Explicit parameters are never
/// overwritten by either. `rebind` is called once the new entity is fully
/// populated and before the old one is deleted.
pub fn replace(
    document: &mut dyn Document,
    reconciler: &dyn EntityReconciler,
    params: &Parameters,
    old: Option<EntityId>,
    template: Option<&EntityRecord>,
    rebind: impl FnOnce(EntityId),
) -> Result<ReplaceOutcome, DocumentError> {
    let new = reconciler.create(document, params, template)?;
    document.set_pinned(new, true)?;
    tracing::info!(kind = %reconciler.kind(), entity = %new, "created");

    let pending = PendingReplacement {
        old: old.and_then(|id| document.entity(id)),
        new,
        mask: reconciler.mask(),
    };

    let mut protected: BTreeSet<String> = params.attributes.keys().cloned().collect();
    let mut transplanted = Vec::new();

    if let Some(old) = &pending.old {
        transplanted.extend(transplant(
            document,
            old,
            pending.new,
            &pending.mask,
            &protected,
        )?);
        protected.extend(old.attributes.keys().cloned());
    }
    if let Some(template) = template {
        transplanted.extend(transplant(
            document,
            template,
            pending.new,
            &pending.mask,
            &protected,
        )?);
    }

    rebind(pending.new);

    let mut orphan = None;
    if let Some(old) = &pending.old
        && old.id != pending.new
    {
        match document.delete_entity(old.id) {
            Ok(()) => tracing::debug!(entity = %old.id, "deleted replaced entity"),
            Err(DocumentError::NotFound(_)) => {}
            Err(
                e @ (DocumentError::HasIrremovableDependents(_)
                | DocumentError::ConstraintViolation(_)),
            ) => {
                tracing::warn!(entity = %old.id, "replaced entity left in place: {e}");
                orphan = Some(old.id);
            }
            Err(e) => return Err(e),
        }
    }

    // naming runs after the delete so a freed name can be taken over
    let base = naming::base_name(
        params.name.as_deref(),
        template
            .filter(|t| t.kind == reconciler.kind())
            .map(|t| t.name.as_str()),
        reconciler.default_name(),
    );
    let previous = pending.old.as_ref().map(|o| o.name.as_str());
    let name = assign_name(document, pending.new, base, previous)?;

    Ok(ReplaceOutcome {
        entity: pending.new,
        name,
        transplanted,
        orphan,
    })
}
