//! The per-run graph builder.
//!
//! A [`Builder`] owns the graph under construction, the name resolver, the
//! stack of open scopes and the agent id inherited from an enclosing compound
//! action. Scopes are opened and closed by closure-taking methods
//! ([`sequence`](Builder::sequence), [`parallel`](Builder::parallel), ...):
//! the scope is always popped when the closure returns, even on error, and
//! its edges are only wired when the closure succeeded.

use purslane_core::{ActionNode, AgentId, Graph, NameResolver};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::action::{Action, ActionBody, ActionHandle, LeafContext, LeafFn};
use crate::error::DslError;
use crate::scope::{self, ChildSpan, Frame, ScopeKind};

pub struct Builder {
    graph: Graph,
    names: NameResolver,
    /// Frames of the enclosing scopes; `current` is the innermost one.
    stack: Vec<Frame>,
    current: Frame,
    /// Agent id fixed by the innermost compound action that carries one.
    inherited: Option<AgentId>,
    rng: ChaCha8Rng,
}

impl Builder {
    pub fn new(num_agents: u32, seed: u64) -> Self {
        Builder {
            graph: Graph::new(num_agents),
            names: NameResolver::new(),
            stack: Vec::new(),
            current: Frame::default(),
            inherited: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn num_agents(&self) -> u32 {
        self.graph.num_agents()
    }

    /// The run's random source. Scenario code draws from it so a seed
    /// reproduces the whole run.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// The graph built so far.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Agent id currently inherited from an enclosing compound action.
    pub fn inherited_agent(&self) -> Option<AgentId> {
        self.inherited
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Consumes the builder, returning the unfinalized graph and the RNG in
    /// its current state.
    pub fn finish(self) -> (Graph, ChaCha8Rng) {
        (self.graph, self.rng)
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Runs an action in the current scope.
    ///
    /// Leaves become one target node; compounds open a nested scope whose
    /// children are chained in order. Explicit dependencies are wired after
    /// the action's nodes exist.
    pub fn act(&mut self, action: Action<'_>) -> Result<ActionHandle, DslError> {
        let Action {
            name,
            agent,
            deps,
            headers,
            decls,
            body,
        } = action;

        for header in headers {
            self.graph.add_header(header);
        }
        for decl in decls {
            self.graph.add_decl(decl);
        }

        let name = self.names.resolve(&name);
        let agent = self.resolve_agent(&name, agent)?;

        let handle = match body {
            ActionBody::Leaf(body) => self.leaf(name, agent, body)?,
            ActionBody::Compound(expand) => {
                self.scoped(ScopeKind::Compound, name, agent, expand)?
            }
        };

        for dep in &deps {
            self.graph.add_dependency(dep.fin, handle.init)?;
        }
        Ok(handle)
    }

    /// Runs exactly one of `actions`, chosen uniformly.
    pub fn select(&mut self, mut actions: Vec<Action<'_>>) -> Result<ActionHandle, DslError> {
        if actions.is_empty() {
            return Err(DslError::EmptySelect);
        }
        let pick = self.rng.gen_range(0..actions.len());
        let action = actions.swap_remove(pick);
        debug!(name = %action.name(), "selected action");
        self.act(action)
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    /// Children run one after another in declaration order.
    pub fn sequence<F>(&mut self, body: F) -> Result<ActionHandle, DslError>
    where
        F: FnOnce(&mut Builder) -> Result<(), DslError>,
    {
        self.anonymous(ScopeKind::Sequence, body)
    }

    /// Children are independent branches. Closing fails if any branch
    /// transitively depends on another.
    pub fn parallel<F>(&mut self, body: F) -> Result<ActionHandle, DslError>
    where
        F: FnOnce(&mut Builder) -> Result<(), DslError>,
    {
        self.anonymous(ScopeKind::Parallel, body)
    }

    /// Like [`parallel`](Self::parallel), but branches may depend on each
    /// other through explicit dependencies.
    pub fn schedule<F>(&mut self, body: F) -> Result<ActionHandle, DslError>
    where
        F: FnOnce(&mut Builder) -> Result<(), DslError>,
    {
        self.anonymous(ScopeKind::Schedule, body)
    }

    fn anonymous<F>(&mut self, kind: ScopeKind, body: F) -> Result<ActionHandle, DslError>
    where
        F: FnOnce(&mut Builder) -> Result<(), DslError>,
    {
        let name = self.names.resolve(kind.base_name());
        let agent = self.inherited;
        self.scoped(kind, name, agent, body)
    }

    fn scoped<F>(
        &mut self,
        kind: ScopeKind,
        name: String,
        agent: Option<AgentId>,
        body: F,
    ) -> Result<ActionHandle, DslError>
    where
        F: FnOnce(&mut Builder) -> Result<(), DslError>,
    {
        let init = self
            .graph
            .add_node(ActionNode::boundary(format!("{name}_init")));

        let parent = std::mem::take(&mut self.current);
        self.stack.push(parent);
        let outer_agent = self.inherited;
        self.inherited = agent;
        debug!(?kind, %name, depth = self.stack.len(), "opened scope");

        let result = body(self);

        let parent = self.stack.pop().unwrap_or_default();
        let frame = std::mem::replace(&mut self.current, parent);
        self.inherited = outer_agent;
        result?;

        let fin = scope::close(&mut self.graph, kind, &name, init, &frame)?;
        let nodes = std::iter::once(init)
            .chain(frame.members.iter().copied())
            .chain(std::iter::once(fin));
        self.current.adopt(
            ChildSpan {
                name: name.clone(),
                init,
                fin,
            },
            nodes,
        );
        Ok(ActionHandle { name, init, fin })
    }

    fn leaf(
        &mut self,
        name: String,
        agent: Option<AgentId>,
        body: LeafFn<'_>,
    ) -> Result<ActionHandle, DslError> {
        let leaf = body(&LeafContext { name: &name, agent });
        for header in leaf.headers {
            self.graph.add_header(header);
        }
        for decl in leaf.decls {
            self.graph.add_decl(decl);
        }

        let id = self
            .graph
            .add_node(ActionNode::target(name.clone(), leaf.payload).with_agent(agent));
        debug!(%name, ?agent, "added leaf action");
        self.current.adopt(
            ChildSpan {
                name: name.clone(),
                init: id,
                fin: id,
            },
            [id],
        );
        Ok(ActionHandle {
            name,
            init: id,
            fin: id,
        })
    }

    /// Applies agent inheritance: an inherited id must match the action's
    /// own id when both are present, and fills it in when absent.
    fn resolve_agent(
        &self,
        name: &str,
        own: Option<AgentId>,
    ) -> Result<Option<AgentId>, DslError> {
        match (self.inherited, own) {
            (Some(inherited), Some(found)) if inherited != found => Err(DslError::AgentMismatch {
                action: name.to_string(),
                inherited,
                found,
            }),
            (Some(inherited), _) => Ok(Some(inherited)),
            (None, own) => Ok(own),
        }
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("nodes", &self.graph.node_count())
            .field("depth", &self.stack.len())
            .field("inherited", &self.inherited)
            .finish()
    }
}
