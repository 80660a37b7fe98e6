//! Cooperative C backend.
//!
//! Every graph thread becomes a resumable state machine: a `switch` on the
//! thread's published counter with one case per node. A case whose
//! cross-thread predecessors have not finished returns immediately and is
//! polled again by the agent's driver loop. Counters are read with acquire
//! and advanced with release semantics.

use std::fmt::Write;

use purslane_core::{assign_threads, Core, CoreError, Graph};
use rand::RngCore;
use tracing::info;

use crate::error::CodegenError;
use crate::layout::{body_func, cross_thread_waits, native_src, thread_name, write_includes};
use crate::CooperativeOptions;

const HOSTED_ATOMICS: &str = "\
#define smp_load_acquire(p) __atomic_load_n((p), __ATOMIC_ACQUIRE)
#define smp_store_release(p, v) __atomic_store_n((p), (v), __ATOMIC_RELEASE)
";

const AARCH64_ATOMICS: &str = r#"static inline uint32_t smp_load_acquire(volatile uint32_t *p){
uint32_t v;
asm volatile("ldar %w0, [%1]" : "=r"(v) : "r"(p) : "memory");
return v;
}
static inline void smp_store_release(volatile uint32_t *p, uint32_t v){
asm volatile("stlr %w1, [%0]" : : "r"(p), "r"(v) : "memory");
}
"#;

/// Assigns threads and renders the cooperative program.
pub fn render(
    graph: &mut Graph,
    options: &CooperativeOptions,
    rng: &mut dyn RngCore,
) -> Result<String, CodegenError> {
    info!(hosted = options.hosted, "rendering cooperative C");
    let cores = assign_threads(graph, rng)?;
    let mut emitter = Emitter {
        graph: &*graph,
        options,
        cores: &cores,
        out: String::with_capacity(8192),
    };
    emitter.prelude();
    emitter.body_functions()?;
    emitter.state_variables();
    emitter.thread_functions()?;
    emitter.drivers();
    if options.hosted {
        emitter.launcher();
    }
    Ok(emitter.out)
}

struct Emitter<'a> {
    graph: &'a Graph,
    options: &'a CooperativeOptions,
    cores: &'a [Core],
    out: String,
}

impl Emitter<'_> {
    fn prelude(&mut self) {
        let _ = writeln!(self.out, "// generated by purslane\n");
        let _ = writeln!(self.out, "#include <stdint.h>");
        if self.options.hosted {
            for header in ["pthread.h", "sched.h", "unistd.h", "stdio.h", "stdlib.h"] {
                let _ = writeln!(self.out, "#include <{header}>");
            }
            self.out.push_str(HOSTED_ATOMICS);
        } else {
            if self.options.debug_trace {
                let _ = writeln!(self.out, "#include <stdio.h>");
            }
            self.out.push_str(AARCH64_ATOMICS);
        }
        write_includes(&mut self.out, self.graph);
        self.out.push('\n');
    }

    fn body_functions(&mut self) -> Result<(), CodegenError> {
        let _ = writeln!(self.out, "// body functions of actions\n");
        for (_, node) in self.graph.nodes_by_serial() {
            let src = native_src(node)?;
            let _ = writeln!(self.out, "// body function of action {}", node.name);
            let _ = writeln!(
                self.out,
                "static uint32_t {}(uint32_t state){{",
                body_func(node)
            );
            if self.options.debug_trace {
                let _ = writeln!(self.out, "printf(\"{}\\n\");", node.ident());
            }
            let _ = writeln!(self.out, "{src}");
            let _ = writeln!(self.out, "return 0;");
            let _ = writeln!(self.out, "}}");
        }
        self.out.push('\n');
        Ok(())
    }

    fn state_variables(&mut self) {
        for core in self.cores {
            let _ = writeln!(
                self.out,
                "static uint32_t num_active_threads_core_{} = {};",
                core.agent.0,
                core.threads.len()
            );
            for thread in &core.threads {
                let stem = thread_name(core.agent, thread.id);
                let _ = writeln!(self.out, "volatile uint32_t {stem}_thread_state = 0;");
                let _ = writeln!(self.out, "static uint32_t {stem}_action_state = 0;");
            }
        }
        self.out.push('\n');
    }

    fn thread_functions(&mut self) -> Result<(), CodegenError> {
        for core in self.cores {
            for thread in &core.threads {
                let stem = thread_name(core.agent, thread.id);
                let _ = writeln!(self.out, "static void {stem}_func(void){{");
                let _ = writeln!(self.out, "switch({stem}_thread_state){{");

                for (pos, &id) in thread.nodes.iter().enumerate() {
                    let _ = writeln!(self.out, "case {pos}:");
                    let waits = cross_thread_waits(self.graph, id)?;
                    for wait in &waits {
                        let _ = writeln!(
                            self.out,
                            "// wait for {} @ core {} thread {}",
                            wait.name, wait.agent.0, wait.thread.0
                        );
                    }
                    if !waits.is_empty() {
                        let conds: Vec<String> = waits
                            .iter()
                            .map(|w| {
                                format!(
                                    "smp_load_acquire(&{}_thread_state) <= {}",
                                    thread_name(w.agent, w.thread),
                                    w.position
                                )
                            })
                            .collect();
                        let _ = writeln!(self.out, "if({}){{", conds.join(" || "));
                        let _ = writeln!(self.out, "return;");
                        let _ = writeln!(self.out, "}}");
                    }
                    let node = self.graph.node(id).ok_or(CoreError::NodeNotFound { id })?;
                    let _ = writeln!(
                        self.out,
                        "{stem}_action_state = {}({stem}_action_state);",
                        body_func(node)
                    );
                    let _ = writeln!(self.out, "break;");
                }

                let _ = writeln!(self.out, "case {}:", thread.nodes.len());
                let _ = writeln!(self.out, "num_active_threads_core_{}--;", core.agent.0);
                let _ = writeln!(self.out, "break;");
                let _ = writeln!(self.out, "default:");
                let _ = writeln!(self.out, "return;");
                let _ = writeln!(self.out, "}}");

                let _ = writeln!(self.out, "if({stem}_action_state == 0){{");
                let _ = writeln!(
                    self.out,
                    "smp_store_release(&{stem}_thread_state, {stem}_thread_state + 1);"
                );
                let _ = writeln!(self.out, "}}");
                let _ = writeln!(self.out, "}}\n");
            }
        }
        Ok(())
    }

    fn drivers(&mut self) {
        for core in self.cores {
            let agent = core.agent.0;
            let _ = writeln!(self.out, "static void core_{agent}_func(void){{");
            let _ = writeln!(self.out, "while(num_active_threads_core_{agent} > 0){{");
            for thread in &core.threads {
                let _ = writeln!(self.out, "{}_func();", thread_name(core.agent, thread.id));
            }
            let _ = writeln!(self.out, "}}");
            let _ = writeln!(self.out, "}}\n");
        }

        let prefix = &self.options.symbol_prefix;
        let _ = writeln!(self.out, "void {prefix}_core_main_func(uint64_t core_id){{");
        let _ = writeln!(self.out, "switch(core_id){{");
        for core in self.cores {
            let _ = writeln!(self.out, "case {0}:\ncore_{0}_func();\nbreak;", core.agent.0);
        }
        let _ = writeln!(self.out, "default:\nbreak;");
        let _ = writeln!(self.out, "}}");
        let _ = writeln!(self.out, "}}\n");
    }

    /// One pthread per agent, each running that agent's driver loop.
    fn launcher(&mut self) {
        let prefix = &self.options.symbol_prefix;
        let _ = writeln!(self.out, "void {prefix}_main(void){{");
        let _ = writeln!(self.out, "int ret;");
        for core in self.cores {
            let i = core.agent.0;
            let _ = writeln!(self.out, "pthread_t thread_id_{i};");
            let _ = writeln!(self.out, "pthread_attr_t attr_{i};");
            if self.options.core_binding {
                let _ = writeln!(self.out, "cpu_set_t cpu_set_{i};");
            }
        }
        self.out.push('\n');

        for core in self.cores {
            let i = core.agent.0;
            let _ = writeln!(self.out, "pthread_attr_init(&attr_{i});");
            if self.options.core_binding {
                let _ = writeln!(self.out, "CPU_ZERO(&cpu_set_{i});");
                let _ = writeln!(self.out, "CPU_SET({i}, &cpu_set_{i});");
                let _ = writeln!(
                    self.out,
                    "pthread_attr_setaffinity_np(&attr_{i}, sizeof(cpu_set_t), &cpu_set_{i});"
                );
            }
            let _ = writeln!(
                self.out,
                "ret = pthread_create(&thread_id_{i}, &attr_{i}, (void*(*)(void*))core_{i}_func, NULL);"
            );
            let _ = writeln!(self.out, "if(ret != 0){{");
            let _ = writeln!(self.out, "printf(\"failed to pthread_create\\n\");");
            let _ = writeln!(self.out, "exit(1);");
            let _ = writeln!(self.out, "}}");
        }
        self.out.push('\n');

        for core in self.cores {
            let _ = writeln!(self.out, "pthread_join(thread_id_{}, NULL);", core.agent.0);
        }
        let _ = writeln!(self.out, "}}");
    }
}
