//! TOML graph definitions.
//!
//! ```toml
//! [[nodes]]
//! id = "ground-floor"
//! kind = "floor"
//! interest = { kinds = ["level"] }
//!
//! [[nodes.outputs]]
//! slot = "Floor"
//! type = "Basic"
//! geometry = { profile = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.0, 10.0, 0.0]] }
//! attributes = { level = "L1" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use recon_core::{
    Attributes, EntityId, EntityKind, Geometry, GraphNode, InterestFilter, NodeId, NodeSpec,
    Parameters, TrackingMode,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GraphFile {
    #[serde(default)]
    nodes: Vec<NodeDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeDef {
    id: String,
    kind: EntityKind,
    #[serde(default)]
    tracking: Option<TrackingMode>,
    #[serde(default)]
    interest: Option<InterestFilter>,
    #[serde(default)]
    outputs: Vec<OutputDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputDef {
    /// Defaults to the kind's default name.
    #[serde(default)]
    slot: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    type_name: Option<String>,
    #[serde(default)]
    geometry: Option<Geometry>,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    template: Option<EntityId>,
}

impl NodeDef {
    fn into_graph_node(self) -> Result<GraphNode> {
        let mut slots = Vec::new();
        let mut inputs = BTreeMap::new();
        for output in self.outputs {
            let slot = output
                .slot
                .unwrap_or_else(|| self.kind.default_name().to_string());
            if inputs.contains_key(&slot) {
                bail!("node '{}' declares slot '{slot}' twice", self.id);
            }
            slots.push(slot.clone());
            inputs.insert(
                slot,
                Parameters {
                    name: output.name,
                    type_name: output.type_name,
                    geometry: output.geometry,
                    attributes: output.attributes,
                    template: output.template,
                },
            );
        }
        if slots.is_empty() {
            bail!("node '{}' has no outputs", self.id);
        }

        Ok(GraphNode {
            spec: NodeSpec {
                id: NodeId::new(self.id),
                kind: self.kind,
                tracking: self.tracking,
                interest: self.interest,
                slots,
            },
            inputs,
        })
    }
}

/// Parse a graph definition. Nodes keep file order, which is the
/// evaluation order.
pub fn parse(content: &str) -> Result<Vec<GraphNode>> {
    let file: GraphFile = toml::from_str(content).context("malformed graph definition")?;
    let mut seen = BTreeSet::new();
    let mut nodes = Vec::with_capacity(file.nodes.len());
    for def in file.nodes {
        if !seen.insert(def.id.clone()) {
            bail!("duplicate node id '{}'", def.id);
        }
        nodes.push(def.into_graph_node()?);
    }
    Ok(nodes)
}

pub fn load(path: &Path) -> Result<Vec<GraphNode>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("in {}", path.display()))
}
