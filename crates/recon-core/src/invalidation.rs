//! Turns document change notifications into node re-evaluation requests.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::document::{ChangeSet, Document, EntityRecord};
use crate::ids::{EntityId, NodeId};
use crate::kind::EntityKind;

/// Entities a node reads from the document. Empty `kinds` or `categories`
/// leave that dimension unconstrained; `within` narrows the match further
/// with an upstream filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterestFilter {
    pub kinds: BTreeSet<EntityKind>,
    pub categories: BTreeSet<String>,
    pub within: Option<Box<InterestFilter>>,
}

impl InterestFilter {
    pub fn kinds(kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn categories<'a>(categories: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            categories: categories.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn intersect(mut self, sub: InterestFilter) -> Self {
        self.within = Some(Box::new(match self.within.take() {
            Some(existing) => existing.intersect(sub),
            None => sub,
        }));
        self
    }

    pub fn matches(&self, record: &EntityRecord) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&record.kind))
            && (self.categories.is_empty() || self.categories.contains(&record.category))
            && self.within.as_ref().is_none_or(|sub| sub.matches(record))
    }

    fn matches_any(&self, ids: &BTreeSet<EntityId>, document: &dyn Document) -> bool {
        ids.iter()
            .filter_map(|id| document.entity(*id))
            .any(|record| self.matches(&record))
    }
}

/// Whether a node must be re-evaluated after `change`.
///
/// Added or modified entities count only through `interest`. Deletion of a
/// tracked output counts regardless of the filter: a deleted entity can no
/// longer be looked up to test it.
pub fn needs_to_be_expired(
    change: &ChangeSet,
    interest: Option<&InterestFilter>,
    tracked: &BTreeSet<EntityId>,
    document: &dyn Document,
) -> bool {
    if !change.deleted.is_disjoint(tracked) {
        return true;
    }
    match interest {
        Some(filter) => {
            filter.matches_any(&change.added, document)
                || filter.matches_any(&change.modified, document)
        }
        None => false,
    }
}

/// Deduplicated FIFO of nodes waiting for re-evaluation. Filled from
/// notifications, drained between passes only.
#[derive(Clone, Debug, Default)]
pub struct ExpiryQueue {
    order: VecDeque<NodeId>,
    queued: BTreeSet<NodeId>,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the node was already queued.
    pub fn push(&mut self, node: NodeId) -> bool {
        if !self.queued.insert(node.clone()) {
            return false;
        }
        self.order.push_back(node);
        true
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.queued.contains(node)
    }

    pub fn drain(&mut self) -> Vec<NodeId> {
        self.queued.clear();
        self.order.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
