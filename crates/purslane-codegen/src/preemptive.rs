//! Preemptive C backend.
//!
//! Each graph thread runs on its own pthread. A thread publishes its
//! progress in a mutex-protected counter; a cross-thread predecessor is
//! awaited by sleeping on the owning thread's condition variable.

use std::fmt::Write;

use purslane_core::{assign_threads, CoreError, Graph};
use rand::RngCore;
use tracing::info;

use crate::error::CodegenError;
use crate::layout::{body_func, cross_thread_waits, native_src, thread_name, write_includes};
use crate::PreemptiveOptions;

/// Assigns threads and renders the preemptive program.
pub fn render(
    graph: &mut Graph,
    options: &PreemptiveOptions,
    rng: &mut dyn RngCore,
) -> Result<String, CodegenError> {
    info!(core_binding = options.core_binding, "rendering preemptive C");
    let cores = assign_threads(graph, rng)?;
    let graph: &Graph = graph;
    let mut out = String::with_capacity(8192);

    let _ = writeln!(out, "// generated by purslane\n");
    for header in ["stdint.h", "pthread.h", "sched.h", "unistd.h", "stdio.h", "stdlib.h"] {
        let _ = writeln!(out, "#include <{header}>");
    }
    write_includes(&mut out, graph);
    out.push('\n');

    let _ = writeln!(out, "// body functions of actions\n");
    for (_, node) in graph.nodes_by_serial() {
        let src = native_src(node)?;
        let _ = writeln!(out, "// body function of action {}", node.name);
        let _ = writeln!(out, "static void {}(void){{", body_func(node));
        let _ = writeln!(out, "{src}");
        let _ = writeln!(out, "}}");
    }
    out.push('\n');

    for core in &cores {
        for thread in &core.threads {
            let p = thread_name(core.agent, thread.id);
            let _ = writeln!(out, "static pthread_mutex_t {p}_mutex = PTHREAD_MUTEX_INITIALIZER;");
            let _ = writeln!(out, "static pthread_cond_t {p}_cond = PTHREAD_COND_INITIALIZER;");
            let _ = writeln!(out, "static uint64_t {p}_state = 0;");

            let _ = writeln!(out, "static void {p}_wait(uint64_t ts){{");
            let _ = writeln!(out, "pthread_mutex_lock(&{p}_mutex);");
            let _ = writeln!(out, "while({p}_state <= ts){{");
            let _ = writeln!(out, "pthread_cond_wait(&{p}_cond, &{p}_mutex);");
            let _ = writeln!(out, "}}");
            let _ = writeln!(out, "pthread_mutex_unlock(&{p}_mutex);");
            let _ = writeln!(out, "}}");

            let _ = writeln!(out, "static void {p}_advance(void){{");
            let _ = writeln!(out, "pthread_mutex_lock(&{p}_mutex);");
            let _ = writeln!(out, "{p}_state++;");
            let _ = writeln!(out, "pthread_cond_broadcast(&{p}_cond);");
            let _ = writeln!(out, "pthread_mutex_unlock(&{p}_mutex);");
            let _ = writeln!(out, "}}");
        }
    }
    out.push('\n');

    for core in &cores {
        for thread in &core.threads {
            let p = thread_name(core.agent, thread.id);
            let _ = writeln!(out, "static void *{p}_func(void *arg){{");
            let _ = writeln!(out, "(void)arg;");
            for &id in &thread.nodes {
                let node = graph.node(id).ok_or(CoreError::NodeNotFound { id })?;
                let _ = writeln!(out, "// action {}", node.name);
                for wait in cross_thread_waits(graph, id)? {
                    let _ = writeln!(
                        out,
                        "// wait for {} @ core {} thread {}",
                        wait.name, wait.agent.0, wait.thread.0
                    );
                    let _ = writeln!(
                        out,
                        "{}_wait({});",
                        thread_name(wait.agent, wait.thread),
                        wait.position
                    );
                }
                let _ = writeln!(out, "{}();", body_func(node));
                let _ = writeln!(out, "{p}_advance();");
            }
            let _ = writeln!(out, "return NULL;");
            let _ = writeln!(out, "}}\n");
        }
    }

    let prefix = &options.symbol_prefix;
    let _ = writeln!(out, "void {prefix}_main(void){{");
    let _ = writeln!(out, "int ret;");
    for core in &cores {
        for thread in &core.threads {
            let p = thread_name(core.agent, thread.id);
            let _ = writeln!(out, "pthread_t {p}_id;");
            let _ = writeln!(out, "pthread_attr_t {p}_attr;");
            if options.core_binding {
                let _ = writeln!(out, "cpu_set_t {p}_cpu_set;");
            }
        }
    }
    out.push('\n');

    for core in &cores {
        for thread in &core.threads {
            let p = thread_name(core.agent, thread.id);
            let _ = writeln!(out, "pthread_attr_init(&{p}_attr);");
            if options.core_binding {
                let _ = writeln!(out, "CPU_ZERO(&{p}_cpu_set);");
                let _ = writeln!(out, "CPU_SET({}, &{p}_cpu_set);", core.agent.0);
                let _ = writeln!(
                    out,
                    "pthread_attr_setaffinity_np(&{p}_attr, sizeof(cpu_set_t), &{p}_cpu_set);"
                );
            }
            let _ = writeln!(out, "ret = pthread_create(&{p}_id, &{p}_attr, {p}_func, NULL);");
            let _ = writeln!(out, "if(ret != 0){{");
            let _ = writeln!(out, "printf(\"failed to pthread_create\\n\");");
            let _ = writeln!(out, "exit(1);");
            let _ = writeln!(out, "}}");
        }
    }
    out.push('\n');

    for core in &cores {
        for thread in &core.threads {
            let _ = writeln!(
                out,
                "pthread_join({}_id, NULL);",
                thread_name(core.agent, thread.id)
            );
        }
    }
    let _ = writeln!(out, "}}");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use purslane_core::{ActionNode, AgentId, AssignPolicy, Payload};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn cross_thread_edges_block_on_condvar() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut graph = Graph::new(2);
        let x = graph.add_node(
            ActionNode::target("x_0", Payload::Native("x();".into())).with_agent(Some(AgentId(0))),
        );
        let y = graph.add_node(
            ActionNode::target("y_0", Payload::Native("y();".into())).with_agent(Some(AgentId(1))),
        );
        graph.add_dependency(x, y).unwrap();
        graph.finalize(AssignPolicy::Spread, &mut rng).unwrap();

        let src = render(&mut graph, &PreemptiveOptions::default(), &mut rng).unwrap();

        assert!(src.contains("core_0_thread_0_wait(0);"));
        assert!(src.contains("pthread_cond_wait(&core_0_thread_0_cond, &core_0_thread_0_mutex);"));
        assert!(src.contains("pthread_cond_broadcast(&core_1_thread_0_cond);"));
        assert!(src.contains("CPU_SET(1, &core_1_thread_0_cpu_set);"));
        assert!(src.contains("void mango_main(void){"));
        assert!(!src.contains("smp_load_acquire"));
    }

    #[test]
    fn unbound_launcher_skips_affinity() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut graph = Graph::new(1);
        graph.add_node(
            ActionNode::target("x_0", Payload::Native("x();".into())).with_agent(Some(AgentId(0))),
        );
        graph.finalize(AssignPolicy::Spread, &mut rng).unwrap();
        let options = PreemptiveOptions {
            core_binding: false,
            symbol_prefix: "mango".into(),
        };
        let src = render(&mut graph, &options, &mut rng).unwrap();
        assert!(!src.contains("CPU_SET"));
        assert!(!src.contains("// wait for"));
    }
}
