//! Canonical JSON manifest of a finalized graph.
//!
//! The manifest is the backend-independent contract consumed by downstream
//! tooling. Field names follow the established wire format
//! (`executors`, `executor_id`, `c_src`, `sv_src`, ...), so the Rust-side
//! names are mapped with `serde(rename)`.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::graph::Graph;
use crate::id::{AgentId, NodeId, SerialNumber};
use crate::node::{ActionNode, Payload};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub sv_headers: Vec<String>,
    #[serde(default)]
    pub c_headers: Vec<String>,
    #[serde(default)]
    pub c_decls: Vec<String>,
    pub actions: Vec<ManifestAction>,
    #[serde(rename = "executors")]
    pub agents: Vec<AgentEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: AgentId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAction {
    pub sn: SerialNumber,
    #[serde(rename = "executor_id")]
    pub agent: Option<AgentId>,
    pub c_src: Option<String>,
    pub sv_src: Option<String>,
    pub name: String,
    pub predecessors: Vec<SerialNumber>,
}

impl Manifest {
    /// Captures a numbered graph. Actions appear in serial order and list
    /// their direct predecessors by serial number.
    pub fn from_graph(graph: &Graph) -> Result<Self, CoreError> {
        if graph.nodes_by_serial().count() != graph.node_count() {
            return Err(CoreError::MissingSerial {
                name: String::from("<unnumbered graph>"),
            });
        }

        let mut actions = Vec::with_capacity(graph.node_count());
        for (id, node) in graph.nodes_by_serial() {
            let sn = node.sn.ok_or_else(|| CoreError::MissingSerial {
                name: node.name.clone(),
            })?;
            let predecessors = graph
                .predecessors(id)
                .into_iter()
                .map(|pred| serial(graph, pred))
                .collect::<Result<Vec<_>, _>>()?;
            let payload = node.payload.as_ref();
            actions.push(ManifestAction {
                sn,
                agent: node.agent,
                c_src: payload.and_then(Payload::native).map(str::to_string),
                sv_src: payload.and_then(Payload::verification).map(str::to_string),
                name: node.name.clone(),
                predecessors,
            });
        }

        Ok(Manifest {
            sv_headers: Vec::new(),
            c_headers: graph.headers().map(str::to_string).collect(),
            c_decls: graph.decls().map(str::to_string).collect(),
            actions,
            agents: (0..graph.num_agents())
                .map(|id| AgentEntry { id: AgentId(id) })
                .collect(),
        })
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a manifest file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let data = std::fs::read_to_string(path).map_err(|source| CoreError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    /// Rebuilds a numbered graph with ancestor sets computed, ready for
    /// thread assignment and rendering.
    ///
    /// Every predecessor must carry a smaller serial number than its
    /// successor, which also rules out cycles.
    pub fn into_graph(self) -> Result<Graph, CoreError> {
        let mut graph = Graph::new(self.agents.len() as u32);
        for header in self.c_headers {
            graph.add_header(header);
        }
        for decl in self.c_decls {
            graph.add_decl(decl);
        }

        let mut ids: HashMap<SerialNumber, NodeId> = HashMap::new();
        let mut names: HashSet<&str> = HashSet::new();
        for action in &self.actions {
            if !names.insert(action.name.as_str()) {
                return Err(CoreError::InvalidManifest {
                    reason: format!("action name '{}' appears twice", action.name),
                });
            }
            let payload = match (&action.c_src, &action.sv_src) {
                (Some(c), None) => Payload::Native(c.clone()),
                (None, Some(sv)) => Payload::Verification(sv.clone()),
                _ => {
                    return Err(CoreError::InvalidManifest {
                        reason: format!(
                            "action '{}' must carry exactly one of c_src and sv_src",
                            action.name
                        ),
                    })
                }
            };
            let mut node = ActionNode::target(action.name.clone(), payload).with_agent(action.agent);
            node.sn = Some(action.sn);
            let id = graph.add_node(node);
            if ids.insert(action.sn, id).is_some() {
                return Err(CoreError::InvalidManifest {
                    reason: format!("serial number {} appears twice", action.sn),
                });
            }
        }

        for action in &self.actions {
            let id = ids[&action.sn];
            for &pred in &action.predecessors {
                let pred_id = *ids.get(&pred).ok_or(CoreError::UnknownPredecessor {
                    sn: action.sn,
                    pred,
                })?;
                if pred >= action.sn {
                    return Err(CoreError::InvalidManifest {
                        reason: format!(
                            "predecessor {} of action {} is not earlier in serial order",
                            pred, action.sn
                        ),
                    });
                }
                graph.add_dependency(pred_id, id)?;
            }
        }

        graph.reindex_serials()?;
        graph.update_ancestors()?;
        Ok(graph)
    }

    /// Writes the manifest as pretty JSON.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

fn serial(graph: &Graph, id: NodeId) -> Result<SerialNumber, CoreError> {
    let node = graph.node(id).ok_or(CoreError::NodeNotFound { id })?;
    node.sn.ok_or_else(|| CoreError::MissingSerial {
        name: node.name.clone(),
    })
}
