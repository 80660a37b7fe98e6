//! Target-program generation for finalized action graphs.
//!
//! Three backends render the same partial order with different
//! synchronization primitives:
//!
//! - [`cooperative`] -- polled state machines per thread, acquire/release
//!   counters, bare-metal dispatcher and optional hosted launcher
//! - [`preemptive`] -- one OS thread per graph thread, mutex/condition
//!   variable waits
//! - [`uvm`] -- SystemVerilog classes driven by a fork/join_none scheduler
//!
//! The C backends share the per-agent thread partition from
//! [`purslane_core::assign_threads`]; see [`layout`].

pub mod cooperative;
pub mod error;
pub mod layout;
pub mod preemptive;
pub mod uvm;

use purslane_core::Graph;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CodegenError;

/// Symbol prefix of the emitted entry points (`<prefix>_main`,
/// `<prefix>_core_main_func`).
pub const DEFAULT_SYMBOL_PREFIX: &str = "mango";

fn default_symbol_prefix() -> String {
    DEFAULT_SYMBOL_PREFIX.to_string()
}

/// Options for the cooperative C backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooperativeOptions {
    /// Emit a pthread launcher and portable atomics instead of aarch64
    /// barriers.
    pub hosted: bool,
    /// Pin each hosted agent thread to the CPU with the same index.
    pub core_binding: bool,
    /// `printf` the action name when a body starts.
    pub debug_trace: bool,
    pub symbol_prefix: String,
}

impl Default for CooperativeOptions {
    fn default() -> Self {
        CooperativeOptions {
            hosted: false,
            core_binding: false,
            debug_trace: false,
            symbol_prefix: default_symbol_prefix(),
        }
    }
}

/// Options for the preemptive C backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptiveOptions {
    /// Pin every OS thread to the CPU of its agent.
    pub core_binding: bool,
    pub symbol_prefix: String,
}

impl Default for PreemptiveOptions {
    fn default() -> Self {
        PreemptiveOptions {
            core_binding: true,
            symbol_prefix: default_symbol_prefix(),
        }
    }
}

/// Options for the UVM/SystemVerilog backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UvmOptions {
    /// Class name of the verification component actions run on.
    pub executor_type: String,
    /// Wrap the output in `package <name>; ... endpackage`.
    pub package: Option<String>,
}

impl Default for UvmOptions {
    fn default() -> Self {
        UvmOptions {
            executor_type: String::from("Executor"),
            package: None,
        }
    }
}

/// A backend together with its options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    Cooperative(CooperativeOptions),
    Preemptive(PreemptiveOptions),
    Uvm(UvmOptions),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Cooperative(_) => "cooperative",
            Backend::Preemptive(_) => "preemptive",
            Backend::Uvm(_) => "uvm",
        }
    }
}

/// Renders a finalized graph with `backend`.
///
/// The C backends re-run thread assignment, drawing from `rng`, and stamp
/// placements onto the graph's nodes.
pub fn generate(
    graph: &mut Graph,
    backend: &Backend,
    rng: &mut dyn RngCore,
) -> Result<String, CodegenError> {
    match backend {
        Backend::Cooperative(options) => cooperative::render(graph, options, rng),
        Backend::Preemptive(options) => preemptive::render(graph, options, rng),
        Backend::Uvm(options) => uvm::render(graph, options),
    }
}
