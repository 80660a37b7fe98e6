//! Actions: the units scenario code hands to the [`Builder`].
//!
//! An action is a tagged variant: a *leaf* produces one code payload, a
//! *compound* expands into nested scopes. Both may pin an agent, contribute
//! headers/declarations and declare explicit dependencies on previously
//! built actions.

use purslane_core::{AgentId, NodeId, Payload};

use crate::builder::Builder;
use crate::error::DslError;

/// Reference to an action (or scope) already placed in the graph. Used to
/// declare explicit dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionHandle {
    pub(crate) name: String,
    pub(crate) init: NodeId,
    pub(crate) fin: NodeId,
}

impl ActionHandle {
    /// The resolved, unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry boundary node; for a leaf this is its target node.
    pub fn init(&self) -> NodeId {
        self.init
    }

    /// Exit boundary node; for a leaf this is its target node.
    pub fn fin(&self) -> NodeId {
        self.fin
    }
}

/// What a leaf body sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct LeafContext<'c> {
    /// Resolved unique name of the action.
    pub name: &'c str,
    /// Agent after inheritance from an enclosing compound, if any.
    pub agent: Option<AgentId>,
}

/// Output of a leaf body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafBody {
    pub payload: Payload,
    pub headers: Vec<String>,
    pub decls: Vec<String>,
}

impl LeafBody {
    pub fn native(src: impl Into<String>) -> Self {
        LeafBody {
            payload: Payload::Native(src.into()),
            headers: Vec::new(),
            decls: Vec::new(),
        }
    }

    pub fn verification(src: impl Into<String>) -> Self {
        LeafBody {
            payload: Payload::Verification(src.into()),
            headers: Vec::new(),
            decls: Vec::new(),
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn with_decl(mut self, decl: impl Into<String>) -> Self {
        self.decls.push(decl.into());
        self
    }
}

pub type LeafFn<'a> = Box<dyn FnOnce(&LeafContext<'_>) -> LeafBody + 'a>;
pub type ExpandFn<'a> = Box<dyn FnOnce(&mut Builder) -> Result<(), DslError> + 'a>;

pub enum ActionBody<'a> {
    Leaf(LeafFn<'a>),
    Compound(ExpandFn<'a>),
}

pub struct Action<'a> {
    pub(crate) name: String,
    pub(crate) agent: Option<AgentId>,
    pub(crate) deps: Vec<ActionHandle>,
    pub(crate) headers: Vec<String>,
    pub(crate) decls: Vec<String>,
    pub(crate) body: ActionBody<'a>,
}

impl<'a> Action<'a> {
    /// A leaf whose body runs once the action's agent is known.
    pub fn leaf(
        name: impl Into<String>,
        body: impl FnOnce(&LeafContext<'_>) -> LeafBody + 'a,
    ) -> Self {
        Self::with_body(name, ActionBody::Leaf(Box::new(body)))
    }

    /// A leaf with a fixed native-source payload.
    pub fn native(name: impl Into<String>, src: impl Into<String>) -> Self {
        let src = src.into();
        Self::leaf(name, move |_| LeafBody::native(src))
    }

    /// A leaf with a fixed verification-language payload.
    pub fn verification(name: impl Into<String>, src: impl Into<String>) -> Self {
        let src = src.into();
        Self::leaf(name, move |_| LeafBody::verification(src))
    }

    /// A compound action; its direct children run in declaration order.
    pub fn compound(
        name: impl Into<String>,
        expand: impl FnOnce(&mut Builder) -> Result<(), DslError> + 'a,
    ) -> Self {
        Self::with_body(name, ActionBody::Compound(Box::new(expand)))
    }

    fn with_body(name: impl Into<String>, body: ActionBody<'a>) -> Self {
        Action {
            name: name.into(),
            agent: None,
            deps: Vec::new(),
            headers: Vec::new(),
            decls: Vec::new(),
            body,
        }
    }

    /// Pins the action (and, for a compound, its subtree) to an agent.
    pub fn on_agent(mut self, agent: u32) -> Self {
        self.agent = Some(AgentId(agent));
        self
    }

    pub fn with_agent(mut self, agent: Option<AgentId>) -> Self {
        self.agent = agent;
        self
    }

    /// Adds an explicit dependency: this action starts after `dep` finished.
    pub fn after(mut self, dep: &ActionHandle) -> Self {
        self.deps.push(dep.clone());
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn with_decl(mut self, decl: impl Into<String>) -> Self {
        self.decls.push(decl.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent(&self) -> Option<AgentId> {
        self.agent
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, ActionBody::Leaf(_))
    }
}

impl std::fmt::Debug for Action<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("agent", &self.agent)
            .field("deps", &self.deps)
            .field("leaf", &self.is_leaf())
            .finish()
    }
}
