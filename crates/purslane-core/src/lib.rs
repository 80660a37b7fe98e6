pub mod error;
pub mod graph;
pub mod id;
pub mod manifest;
pub mod names;
pub mod node;
pub mod thread;
pub mod topo;

// Re-export commonly used types
pub use error::CoreError;
pub use graph::{AssignPolicy, Graph};
pub use id::{AgentId, NodeId, SerialNumber, ThreadId};
pub use manifest::{AgentEntry, Manifest, ManifestAction};
pub use names::NameResolver;
pub use node::{ActionNode, Payload, Placement};
pub use thread::{assign_threads, Core, Thread};
pub use topo::TopoIter;
