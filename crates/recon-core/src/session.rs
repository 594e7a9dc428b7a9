//! Node driver: evaluates graph nodes against a document, one document
//! transaction per node, and turns change notifications into expiry
//! requests drained between passes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, FailurePolicy, TrackingMode};
use crate::decision::{Decision, RecreateReason};
use crate::document::{ChangeSet, Document, EntityRecord};
use crate::error::{DocumentError, NodeError};
use crate::identity::IdentityStore;
use crate::ids::{EntityId, NodeId, SlotKey};
use crate::invalidation::{self, ExpiryQueue, InterestFilter};
use crate::kind::EntityKind;
use crate::naming;
use crate::reconcile::{EntityReconciler, ReconcilerRegistry};
use crate::replace;
use crate::value::Parameters;

/// Everything scoped to one open document: the document itself and the
/// identity bindings that point into it.
pub struct DocumentContext<D> {
    pub document: D,
    pub identity: IdentityStore,
}

impl<D: Document> DocumentContext<D> {
    pub fn new(document: D) -> Self {
        Self {
            document,
            identity: IdentityStore::new(),
        }
    }

    pub fn with_identity(document: D, identity: IdentityStore) -> Self {
        Self { document, identity }
    }
}

/// Declaration of a graph node that produces entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub kind: EntityKind,
    /// Falls back to the engine's default tracking mode.
    #[serde(default)]
    pub tracking: Option<TrackingMode>,
    #[serde(default)]
    pub interest: Option<InterestFilter>,
    pub slots: Vec<String>,
}

/// A node together with the parameters it computed this pass, per slot.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub spec: NodeSpec,
    pub inputs: BTreeMap<String, Parameters>,
}

impl GraphNode {
    /// Single-slot node, the common case.
    pub fn single(id: &str, kind: EntityKind, slot: &str, params: Parameters) -> Self {
        Self {
            spec: NodeSpec {
                id: NodeId::new(id),
                kind,
                tracking: None,
                interest: None,
                slots: vec![slot.to_string()],
            },
            inputs: BTreeMap::from([(slot.to_string(), params)]),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Remark,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub slot: Option<String>,
    pub message: String,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, slot: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            level,
            slot: slot.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagnosticLevel::Remark => "remark",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Error => "error",
        };
        match &self.slot {
            Some(slot) => write!(f, "[{level}] {slot}: {}", self.message),
            None => write!(f, "[{level}] {}", self.message),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Solved,
    Failed,
    /// Not evaluated: the pass was cancelled or aborted first.
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: NodeId,
    pub status: NodeStatus,
    /// Entity bound to each declared slot; `None` for empty outputs.
    pub outputs: BTreeMap<String, Option<EntityId>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl NodeReport {
    fn new(node: NodeId) -> Self {
        Self {
            node,
            status: NodeStatus::Solved,
            outputs: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn skipped(node: NodeId) -> Self {
        Self {
            status: NodeStatus::Skipped,
            ..Self::new(node)
        }
    }

    pub fn output(&self, slot: &str) -> Option<EntityId> {
        self.outputs.get(slot).copied().flatten()
    }

    pub fn has_level(&self, level: DiagnosticLevel) -> bool {
        self.diagnostics.iter().any(|d| d.level == level)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub nodes: Vec<NodeReport>,
    pub cancelled: bool,
    /// A failure under `FailurePolicy::AbortPass` stopped the pass.
    pub aborted: bool,
}

impl PassReport {
    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|r| r.node.as_str() == id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|r| r.status == NodeStatus::Failed)
    }
}

/// Shared cancellation request, honored between node evaluations only.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State of one node evaluation inside its document transaction.
struct NodeRun<'a, D> {
    context: &'a mut DocumentContext<D>,
    reconciler: &'a dyn EntityReconciler,
    config: &'a EngineConfig,
    node: &'a NodeSpec,
    mode: TrackingMode,
    /// Bindings overwritten so far, restored if the node rolls back.
    undo: Vec<(SlotKey, Option<EntityId>)>,
    diagnostics: Vec<Diagnostic>,
}

impl<D: Document> NodeRun<'_, D> {
    fn template(&mut self, slot: &str, params: &Parameters) -> Option<EntityRecord> {
        let id = params.template?;
        let record = self.context.document.entity(id);
        if record.is_none() {
            tracing::warn!(node = %self.node.id, %slot, template = %id, "template not found");
            self.diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warning,
                Some(slot),
                format!("template {id} does not exist and was ignored"),
            ));
        }
        record
    }

    fn solve_slot(&mut self, slot: &str, params: &Parameters) -> Result<EntityId, DocumentError> {
        if self.mode == TrackingMode::Disabled {
            let template = self.template(slot, params);
            let outcome = replace::replace(
                &mut self.context.document,
                self.reconciler,
                params,
                None,
                template.as_ref(),
                |_| {},
            )?;
            return Ok(outcome.entity);
        }

        let key = SlotKey::new(self.node.id.clone(), slot, self.context.document.id());
        // a failed read of the bound entity is an error, not a deletion
        if let Some(bound) = self.context.identity.bound(&key) {
            self.context.document.try_entity(bound)?;
        }
        let existing = self.context.identity.read(&key, &self.context.document);

        if let Some(id) = existing
            && let Some(record) = self.context.document.entity(id)
            && !record.pinned
        {
            tracing::debug!(%key, entity = %id, "released entity left untouched");
            self.diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Remark,
                Some(slot),
                format!("{id} ignored because it is unpinned"),
            ));
            return Ok(id);
        }

        let decision = match (self.mode, existing) {
            (TrackingMode::Supersede, Some(_)) => Decision::Recreate(RecreateReason::Superseded),
            _ => self.reconciler.try_reuse(
                &mut self.context.document,
                existing,
                params,
                &self.config.tolerances,
            )?,
        };

        match decision {
            Decision::Reuse { entity, mutations } => {
                let current = self
                    .context
                    .document
                    .entity(entity)
                    .ok_or(DocumentError::NotFound(entity))?;
                let template = self.template(slot, params);
                let base = naming::base_name(
                    params.name.as_deref(),
                    template
                        .as_ref()
                        .filter(|t| t.kind == self.reconciler.kind())
                        .map(|t| t.name.as_str()),
                    self.reconciler.default_name(),
                );
                replace::assign_name(
                    &mut self.context.document,
                    entity,
                    base,
                    Some(current.name.as_str()),
                )?;
                tracing::debug!(%key, %entity, mutations = mutations.len(), "reused");
                Ok(entity)
            }
            Decision::Recreate(reason) => {
                tracing::debug!(%key, %reason, "recreating");
                let template = self.template(slot, params);
                let identity = &mut self.context.identity;
                let undo = &mut self.undo;
                let outcome = replace::replace(
                    &mut self.context.document,
                    self.reconciler,
                    params,
                    existing,
                    template.as_ref(),
                    |new| {
                        let previous = identity.write(key.clone(), new);
                        undo.push((key, previous));
                    },
                )?;
                if let Some(orphan) = outcome.orphan {
                    self.diagnostics.push(Diagnostic::new(
                        DiagnosticLevel::Warning,
                        Some(slot),
                        format!("replaced {orphan} could not be deleted and is no longer tracked"),
                    ));
                }
                Ok(outcome.entity)
            }
        }
    }

    fn rollback(&mut self) {
        if let Err(e) = self.context.document.rollback_transaction() {
            tracing::warn!(node = %self.node.id, "rollback failed: {e}");
        }
        for (key, previous) in self.undo.drain(..).rev() {
            self.context.identity.restore(key, previous);
        }
    }
}

/// Reconciliation engine bound to one document.
pub struct Session<D> {
    context: DocumentContext<D>,
    registry: ReconcilerRegistry,
    config: EngineConfig,
    nodes: BTreeMap<NodeId, NodeSpec>,
    expired: ExpiryQueue,
}

impl<D: Document> Session<D> {
    pub fn new(document: D, config: EngineConfig) -> Self {
        Self::with_context(DocumentContext::new(document), config)
    }

    pub fn with_context(context: DocumentContext<D>, config: EngineConfig) -> Self {
        Self {
            context,
            registry: ReconcilerRegistry::with_builtin_kinds(),
            config,
            nodes: BTreeMap::new(),
            expired: ExpiryQueue::new(),
        }
    }

    pub fn with_registry(mut self, registry: ReconcilerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn document(&self) -> &D {
        &self.context.document
    }

    /// Direct document access for edits made outside the graph.
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.context.document
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.context.identity
    }

    pub fn into_context(self) -> DocumentContext<D> {
        self.context
    }

    /// Make a node known to change notification without evaluating it.
    pub fn register(&mut self, spec: NodeSpec) {
        self.nodes.insert(spec.id.clone(), spec);
    }

    /// Evaluate one node: validate every slot, then reconcile them all in a
    /// single document transaction.
    pub fn try_solve(&mut self, node: &GraphNode) -> NodeReport {
        self.evaluate_node(node).0
    }

    /// Evaluate `nodes` in order. Cancellation is checked between nodes; a
    /// failed node never undoes nodes committed before it.
    pub fn evaluate_pass(&mut self, nodes: &[GraphNode], cancel: &CancelFlag) -> PassReport {
        let mut report = PassReport::default();
        for node in nodes {
            if report.aborted || cancel.is_cancelled() {
                report.cancelled |= cancel.is_cancelled();
                report.nodes.push(NodeReport::skipped(node.spec.id.clone()));
                continue;
            }
            let (node_report, abort_pass) = self.evaluate_node(node);
            report.aborted = abort_pass;
            report.nodes.push(node_report);
        }
        tracing::info!(
            nodes = report.nodes.len(),
            failed = report.failed().count(),
            cancelled = report.cancelled,
            aborted = report.aborted,
            "pass complete"
        );
        report
    }

    /// Whether `node` must re-run after `change`.
    pub fn needs_to_be_expired(&self, node: &NodeId, change: &ChangeSet) -> bool {
        let Some(spec) = self.nodes.get(node) else {
            return false;
        };
        let tracked = self
            .context
            .identity
            .tracked_ids(node, self.context.document.id());
        invalidation::needs_to_be_expired(
            change,
            spec.interest.as_ref(),
            &tracked,
            &self.context.document,
        )
    }

    /// Queue every registered node the change expires. Nothing is evaluated
    /// here. Returns how many nodes were newly queued.
    pub fn notify(&mut self, change: &ChangeSet) -> usize {
        if change.is_empty() {
            return 0;
        }
        let hits: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| self.needs_to_be_expired(id, change))
            .cloned()
            .collect();
        let queued = hits
            .into_iter()
            .filter(|id| self.expired.push(id.clone()))
            .count();
        if queued > 0 {
            tracing::debug!(queued, "nodes expired by document change");
        }
        queued
    }

    /// Route pending document change notifications through `notify`.
    pub fn poll_document(&mut self) -> usize {
        match self.context.document.take_changes() {
            Some(change) => self.notify(&change),
            None => 0,
        }
    }

    pub fn expired(&self) -> &ExpiryQueue {
        &self.expired
    }

    /// Take the queued nodes. Call between passes only.
    pub fn drain_expired(&mut self) -> Vec<NodeId> {
        self.expired.drain()
    }

    fn evaluate_node(&mut self, node: &GraphNode) -> (NodeReport, bool) {
        self.nodes.insert(node.spec.id.clone(), node.spec.clone());
        let mut report = NodeReport::new(node.spec.id.clone());

        let result = self.run_node(node, &mut report);
        let abort_pass = match result {
            Ok(()) => false,
            Err(e) => {
                let is_document = matches!(e, NodeError::Document(_));
                tracing::warn!(node = %node.spec.id, "node failed: {e}");
                report.status = NodeStatus::Failed;
                report.outputs.clear();
                report
                    .diagnostics
                    .push(Diagnostic::new(DiagnosticLevel::Error, None, e.to_string()));
                is_document && self.config.failure_policy == FailurePolicy::AbortPass
            }
        };

        // own writes go through the same path as external edits
        self.poll_document();
        (report, abort_pass)
    }

    fn run_node(&mut self, node: &GraphNode, report: &mut NodeReport) -> Result<(), NodeError> {
        let spec = &node.spec;
        let reconciler = self
            .registry
            .get(spec.kind)
            .ok_or(NodeError::UnknownKind(spec.kind))?;

        for (slot, params) in &node.inputs {
            if !spec.slots.contains(slot) {
                return Err(NodeError::UndeclaredSlot(slot.clone()));
            }
            reconciler.validate(params, &self.config.tolerances)?;
        }

        self.context
            .document
            .begin_transaction(&format!("recon {}", spec.id))?;

        let mut run = NodeRun {
            context: &mut self.context,
            reconciler,
            config: &self.config,
            node: spec,
            mode: spec.tracking.unwrap_or(self.config.default_tracking),
            undo: Vec::new(),
            diagnostics: Vec::new(),
        };

        for slot in &spec.slots {
            let Some(params) = node.inputs.get(slot) else {
                report.outputs.insert(slot.clone(), None);
                continue;
            };
            match run.solve_slot(slot, params) {
                Ok(entity) => {
                    report.outputs.insert(slot.clone(), Some(entity));
                }
                Err(e) if self.config.failure_policy == FailurePolicy::Continue => {
                    tracing::warn!(node = %spec.id, %slot, "slot failed, continuing: {e}");
                    run.diagnostics.push(Diagnostic::new(
                        DiagnosticLevel::Warning,
                        Some(slot),
                        e.to_string(),
                    ));
                    report.outputs.insert(slot.clone(), None);
                }
                Err(e) => {
                    run.rollback();
                    report.diagnostics.append(&mut run.diagnostics);
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = run.context.document.commit_transaction() {
            run.rollback();
            report.diagnostics.append(&mut run.diagnostics);
            return Err(e.into());
        }
        report.diagnostics.append(&mut run.diagnostics);
        Ok(())
    }
}
