//! Element reconciliation engine.
//!
//! Keeps identity-bearing document entities in step with the recomputed
//! outputs of graph nodes: every output slot is bound to at most one live
//! entity, which is edited in place when possible and replaced otherwise,
//! carrying user attributes across the replacement.
//!
//! Zero I/O. The host document is reached through the [`Document`] trait;
//! [`MemoryDocument`] is the in-process reference host.

pub mod config;
pub mod decision;
pub mod document;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod ids;
pub mod invalidation;
pub mod kind;
pub mod kinds;
pub mod mask;
pub mod memory;
pub mod naming;
pub mod reconcile;
pub mod replace;
pub mod session;
pub mod value;

pub use config::{EngineConfig, FailurePolicy, TrackingMode};
pub use decision::{Decision, Mutation, RecreateReason};
pub use document::{ChangeSet, CreateRequest, Document, EntityRecord};
pub use error::{DocumentError, NodeError, Result, ValidationError};
pub use geometry::{Geometry, Point, Tolerances};
pub use identity::{IdentityStore, TrackedSlot};
pub use ids::{DocumentId, EntityId, NodeId, SlotKey};
pub use invalidation::{ExpiryQueue, InterestFilter, needs_to_be_expired};
pub use kind::{AttributeAccess, EntityKind};
pub use mask::AttributeMask;
pub use memory::MemoryDocument;
pub use reconcile::{EntityReconciler, ReconcilerRegistry};
pub use replace::{PendingReplacement, ReplaceOutcome};
pub use session::{
    CancelFlag, Diagnostic, DiagnosticLevel, DocumentContext, GraphNode, NodeReport, NodeSpec,
    NodeStatus, PassReport, Session,
};
pub use value::{AttributeValue, Attributes, EntityRef, Parameters};
