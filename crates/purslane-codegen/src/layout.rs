//! Naming and placement queries shared by the C backends.

use purslane_core::{ActionNode, AgentId, CoreError, Graph, NodeId, Placement, ThreadId};

use crate::error::CodegenError;

/// A predecessor running on another (agent, thread) that must have finished
/// before a node may start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wait {
    pub name: String,
    pub agent: AgentId,
    pub thread: ThreadId,
    /// The predecessor's position in its thread. Its thread has passed the
    /// predecessor once the published counter exceeds this value.
    pub position: u32,
}

/// `core_<agent>_thread_<thread>`, the stem of every per-thread symbol.
pub fn thread_name(agent: AgentId, thread: ThreadId) -> String {
    format!("core_{}_thread_{}", agent.0, thread.0)
}

/// Name of the generated function wrapping a node's native payload.
pub fn body_func(node: &ActionNode) -> String {
    format!("{}_body_func", node.ident())
}

pub fn native_src(node: &ActionNode) -> Result<&str, CodegenError> {
    node.payload
        .as_ref()
        .and_then(|p| p.native())
        .ok_or_else(|| CodegenError::PayloadMismatch {
            name: node.name.clone(),
            expected: "native",
        })
}

/// Agent and thread placement of a node.
pub fn placement(graph: &Graph, id: NodeId) -> Result<(AgentId, Placement), CodegenError> {
    let node = graph.node(id).ok_or(CoreError::NodeNotFound { id })?;
    let agent = node.agent.ok_or_else(|| CoreError::MissingAgent {
        name: node.name.clone(),
    })?;
    let placement = node.placement().ok_or_else(|| CodegenError::Unplaced {
        name: node.name.clone(),
    })?;
    Ok((agent, placement))
}

/// Direct predecessors of `id` placed on a different (agent, thread), in
/// serial order. Same-thread predecessors are ordered by program order and
/// need no wait.
pub fn cross_thread_waits(graph: &Graph, id: NodeId) -> Result<Vec<Wait>, CodegenError> {
    let (agent, own) = placement(graph, id)?;
    let mut waits = Vec::new();
    for pred in graph.predecessors(id) {
        let (pred_agent, at) = placement(graph, pred)?;
        if pred_agent == agent && at.thread == own.thread {
            continue;
        }
        let name = graph
            .node(pred)
            .map(|n| n.name.clone())
            .unwrap_or_default();
        waits.push(Wait {
            name,
            agent: pred_agent,
            thread: at.thread,
            position: at.position,
        });
    }
    Ok(waits)
}

/// Appends caller header and declaration lines, each group under a comment.
pub(crate) fn write_includes(out: &mut String, graph: &Graph) {
    use std::fmt::Write;

    let mut headers = graph.headers().peekable();
    if headers.peek().is_some() {
        let _ = writeln!(out, "// headers");
        for header in headers {
            let _ = writeln!(out, "{header}");
        }
    }
    let mut decls = graph.decls().peekable();
    if decls.peek().is_some() {
        let _ = writeln!(out, "// declarations");
        for decl in decls {
            let _ = writeln!(out, "{decl}");
        }
    }
}
