//! One generation run: build, finalize, serialize, render.

use std::io::Write;
use std::path::{Path, PathBuf};

use purslane_codegen::Backend;
use purslane_core::{AssignPolicy, Graph, Manifest};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::action::ActionHandle;
use crate::builder::Builder;
use crate::error::DslError;

/// A backend and the file its output goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTarget {
    pub backend: Backend,
    pub output: PathBuf,
}

/// Options for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Number of agents actions are spread over.
    pub num_agents: u32,
    /// RNG seed. `None` draws a fresh seed, which is logged.
    pub seed: Option<u64>,
    pub assign_policy: AssignPolicy,
    /// Where to write the JSON manifest, if anywhere.
    pub graph_output: Option<PathBuf>,
    pub backends: Vec<BackendTarget>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            num_agents: 2,
            seed: None,
            assign_policy: AssignPolicy::Spread,
            graph_output: None,
            backends: Vec::new(),
        }
    }
}

/// Everything a run produced, held in memory until [`write`](Self::write).
#[derive(Debug)]
pub struct Artifacts {
    pub seed: u64,
    pub graph: Graph,
    pub manifest: Manifest,
    /// Rendered sources, in the order the backends were configured.
    pub outputs: Vec<(PathBuf, String)>,
    graph_output: Option<PathBuf>,
}

impl Artifacts {
    /// Writes the manifest (if requested) and every rendered source.
    ///
    /// Every file is first written to a temporary sibling of its target and
    /// only renamed into place once all of them were written, so a failed
    /// write leaves no new artifact behind.
    pub fn write(&self) -> Result<(), DslError> {
        let mut staged = Vec::with_capacity(self.outputs.len() + 1);
        if let Some(path) = &self.graph_output {
            staged.push((stage(path, &self.manifest.to_json()?)?, path));
        }
        for (path, src) in &self.outputs {
            staged.push((stage(path, src)?, path));
        }

        for (file, path) in staged {
            file.persist(path).map_err(|e| e.error)?;
            info!(path = %path.display(), "wrote artifact");
        }
        Ok(())
    }
}

fn stage(path: &Path, contents: &str) -> Result<NamedTempFile, DslError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    debug!(path = %path.display(), bytes = contents.len(), "staged artifact");
    Ok(file)
}

/// Runs `scenario` on a fresh [`Builder`], finalizes the graph and renders
/// every configured backend.
///
/// Nothing is written to disk here; call [`Artifacts::write`] once the run
/// has succeeded.
pub fn generate<F>(options: &RunOptions, scenario: F) -> Result<Artifacts, DslError>
where
    F: FnOnce(&mut Builder) -> Result<ActionHandle, DslError>,
{
    let seed = match options.seed {
        Some(seed) => seed,
        None => {
            let seed = rand::thread_rng().gen::<u64>();
            info!(seed, "no seed given, drew one");
            seed
        }
    };
    info!(seed, num_agents = options.num_agents, "building action graph");

    let mut builder = Builder::new(options.num_agents, seed);
    let root = scenario(&mut builder)?;
    info!(root = %root.name(), nodes = builder.graph().node_count(), "scenario built");
    let (mut graph, mut rng) = builder.finish();

    graph.finalize(options.assign_policy, &mut rng)?;
    info!(
        actions = graph.node_count(),
        edges = graph.edge_count(),
        "graph finalized"
    );
    let manifest = Manifest::from_graph(&graph)?;

    let mut outputs = Vec::with_capacity(options.backends.len());
    for target in &options.backends {
        info!(backend = target.backend.name(), "rendering");
        let src = purslane_codegen::generate(&mut graph, &target.backend, &mut rng)?;
        outputs.push((target.output.clone(), src));
    }

    Ok(Artifacts {
        seed,
        graph,
        manifest,
        outputs,
        graph_output: options.graph_output.clone(),
    })
}
