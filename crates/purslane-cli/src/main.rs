//! Purslane command-line driver.
//!
//! Provides the `purslane` binary with two subcommands: `render` turns a
//! stored graph manifest into backend source, and `stress` runs the
//! built-in memory stress scenario end to end.

mod stress;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, Level};

use purslane_codegen::error::CodegenError;
use purslane_codegen::{
    Backend, CooperativeOptions, PreemptiveOptions, UvmOptions, DEFAULT_SYMBOL_PREFIX,
};
use purslane_core::{AssignPolicy, CoreError, Manifest};
use purslane_dsl::{BackendTarget, DslError, RunOptions};

use crate::stress::StressConfig;

/// Action-graph test program generator.
#[derive(Parser)]
#[command(name = "purslane", about = "Action-graph test program generator")]
struct Cli {
    /// Log at debug level.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a stored graph manifest with one backend.
    Render {
        /// Path to the JSON manifest.
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(short, long, value_enum)]
        backend: BackendKind,

        /// Output source file.
        #[arg(short, long)]
        output: PathBuf,

        /// Seed for thread assignment (default: 0).
        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[command(flatten)]
        c: COptions,

        /// UVM executor class name.
        #[arg(long, default_value = "Executor")]
        executor_type: String,

        /// Wrap UVM output in a SystemVerilog package.
        #[arg(long)]
        package: Option<String>,
    },

    /// Generate the memory stress scenario.
    Stress {
        #[arg(short = 'n', long, default_value_t = 2)]
        num_agents: u32,

        /// Pages under test; each gets its own fill/check model.
        #[arg(long, default_value_t = 2)]
        pages: u32,

        /// Fill/check rounds per page.
        #[arg(long, default_value_t = 4)]
        rounds: u32,

        /// Address of the first page (decimal or 0x-prefixed hex).
        #[arg(long, default_value = "0x80000000", value_parser = parse_address)]
        base: u64,

        /// RNG seed (default: drawn and logged).
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, value_enum, default_value_t = PolicyKind::Spread)]
        policy: PolicyKind,

        /// Write the graph manifest here.
        #[arg(long)]
        graph_output: Option<PathBuf>,

        /// Write cooperative C source here.
        #[arg(long)]
        cooperative: Option<PathBuf>,

        /// Write preemptive C source here.
        #[arg(long)]
        preemptive: Option<PathBuf>,

        #[command(flatten)]
        c: COptions,
    },
}

/// Flags shared by the C backends.
#[derive(Args)]
struct COptions {
    /// Cooperative: emit a pthread launcher for a hosted OS.
    #[arg(long)]
    hosted: bool,

    /// Pin threads to the CPU of their agent.
    #[arg(long)]
    core_binding: bool,

    /// Cooperative: print each action name as it starts.
    #[arg(long)]
    debug_trace: bool,

    #[arg(long, default_value = DEFAULT_SYMBOL_PREFIX)]
    symbol_prefix: String,
}

impl COptions {
    fn cooperative(&self) -> CooperativeOptions {
        CooperativeOptions {
            hosted: self.hosted,
            core_binding: self.core_binding,
            debug_trace: self.debug_trace,
            symbol_prefix: self.symbol_prefix.clone(),
        }
    }

    fn preemptive(&self) -> PreemptiveOptions {
        PreemptiveOptions {
            core_binding: self.core_binding,
            symbol_prefix: self.symbol_prefix.clone(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    Cooperative,
    Preemptive,
    Uvm,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyKind {
    Spread,
    Random,
}

impl From<PolicyKind> for AssignPolicy {
    fn from(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Spread => AssignPolicy::Spread,
            PolicyKind::Random => AssignPolicy::Random,
        }
    }
}

fn parse_address(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Render {
            manifest,
            backend,
            output,
            seed,
            c,
            executor_type,
            package,
        } => {
            let backend = match backend {
                BackendKind::Cooperative => Backend::Cooperative(c.cooperative()),
                BackendKind::Preemptive => Backend::Preemptive(c.preemptive()),
                BackendKind::Uvm => Backend::Uvm(UvmOptions {
                    executor_type,
                    package,
                }),
            };
            run_render(&manifest, &backend, &output, seed)
        }
        Commands::Stress {
            num_agents,
            pages,
            rounds,
            base,
            seed,
            policy,
            graph_output,
            cooperative,
            preemptive,
            c,
        } => {
            let mut backends = Vec::new();
            if let Some(output) = cooperative {
                backends.push(BackendTarget {
                    backend: Backend::Cooperative(c.cooperative()),
                    output,
                });
            }
            if let Some(output) = preemptive {
                backends.push(BackendTarget {
                    backend: Backend::Preemptive(c.preemptive()),
                    output,
                });
            }
            let options = RunOptions {
                num_agents,
                seed,
                assign_policy: policy.into(),
                graph_output,
                backends,
            };
            run_stress(&options, StressConfig { pages, rounds, base })
        }
    };
    process::exit(exit_code);
}

/// Execute the render subcommand.
///
/// Returns exit code: 0 = success, 1 = generation error, 3 = I/O error.
fn run_render(manifest_path: &Path, backend: &Backend, output: &Path, seed: u64) -> i32 {
    let graph = Manifest::load(manifest_path).and_then(Manifest::into_graph);
    let mut graph = match graph {
        Ok(g) => g,
        Err(e @ CoreError::ManifestRead { .. }) => {
            eprintln!("Error: {}", e);
            return 3;
        }
        Err(e) => {
            eprintln!("Error: invalid manifest '{}': {}", manifest_path.display(), e);
            return 1;
        }
    };
    info!(
        actions = graph.node_count(),
        agents = graph.num_agents(),
        backend = backend.name(),
        "rendering manifest"
    );

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let src = match purslane_codegen::generate(&mut graph, backend, &mut rng) {
        Ok(src) => src,
        Err(e) => {
            eprintln!("Error: {}", e);
            return codegen_exit_code(&e);
        }
    };

    if let Err(e) = std::fs::write(output, src) {
        eprintln!("Error: failed to write '{}': {}", output.display(), e);
        return 3;
    }
    0
}

/// Execute the stress subcommand.
///
/// Returns exit code: 0 = success, 1 = generation error,
/// 2 = invalid scenario, 3 = I/O error.
fn run_stress(options: &RunOptions, config: StressConfig) -> i32 {
    if options.num_agents < 2 {
        eprintln!("Error: the stress scenario needs at least 2 agents");
        return 2;
    }

    let factory = stress::default_factory();
    let result = purslane_dsl::generate(options, |b| stress::scenario(b, config, &factory))
        .and_then(|artifacts| artifacts.write().map(|()| artifacts));

    match result {
        Ok(artifacts) => {
            println!("seed: {}", artifacts.seed);
            for (path, _) in &artifacts.outputs {
                println!("wrote {}", path.display());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            dsl_exit_code(&e)
        }
    }
}

fn codegen_exit_code(err: &CodegenError) -> i32 {
    match err {
        CodegenError::Io(_) => 3,
        _ => 1,
    }
}

fn dsl_exit_code(err: &DslError) -> i32 {
    match err {
        DslError::AgentMismatch { .. }
        | DslError::ParallelDependency { .. }
        | DslError::UnreachableState { .. }
        | DslError::UnknownActionKind { .. }
        | DslError::EmptySelect => 2,
        DslError::Io(_) => 3,
        DslError::Codegen(e) => codegen_exit_code(e),
        DslError::Core(_) => 1,
    }
}
