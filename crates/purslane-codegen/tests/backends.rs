//! Backend rendering from finalized graphs and from stored manifests.
//!
//! Each backend must emit its own synchronization primitive and only that
//! one: acquire/release counters for cooperative C, mutex/condvar waits for
//! preemptive C, fork/join_none with predecessor countdown for UVM.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use purslane_codegen::{
    generate, Backend, CooperativeOptions, PreemptiveOptions, UvmOptions,
};
use purslane_core::{ActionNode, AgentId, AssignPolicy, Graph, Manifest, Payload};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn native(graph: &mut Graph, name: &str, agent: u32) -> purslane_core::NodeId {
    graph.add_node(
        ActionNode::target(name, Payload::Native(format!("{name}_step();")))
            .with_agent(Some(AgentId(agent))),
    )
}

/// Two unrelated actions on two agents.
fn independent_pair() -> Graph {
    let mut rng = ChaCha8Rng::seed_from_u64(21);
    let mut graph = Graph::new(2);
    native(&mut graph, "x_0", 0);
    native(&mut graph, "y_0", 1);
    graph.finalize(AssignPolicy::Spread, &mut rng).unwrap();
    graph
}

/// fill@0 -> {check@1, flush@0} -> report@1
fn diamond() -> Graph {
    let mut rng = ChaCha8Rng::seed_from_u64(22);
    let mut graph = Graph::new(2);
    graph.add_header("#include \"stress.h\"");
    graph.add_decl("extern volatile uint64_t pages[];");
    let fill = native(&mut graph, "fill_0", 0);
    let check = native(&mut graph, "check_0", 1);
    let flush = native(&mut graph, "flush_0", 0);
    let report = native(&mut graph, "report_0", 1);
    graph.add_dependency(fill, check).unwrap();
    graph.add_dependency(fill, flush).unwrap();
    graph.add_dependency(check, report).unwrap();
    graph.add_dependency(flush, report).unwrap();
    graph.finalize(AssignPolicy::Spread, &mut rng).unwrap();
    graph
}

fn hosted() -> Backend {
    Backend::Cooperative(CooperativeOptions {
        hosted: true,
        ..CooperativeOptions::default()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn independent_threads_emit_no_waits() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    for backend in [hosted(), Backend::Preemptive(PreemptiveOptions::default())] {
        let mut graph = independent_pair();
        let src = generate(&mut graph, &backend, &mut rng).unwrap();
        assert!(!src.contains("// wait for"), "{} emitted a wait", backend.name());
        assert!(src.contains("x_0_body_func"));
        assert!(src.contains("y_0_body_func"));
    }
}

#[test]
fn cooperative_uses_only_counters() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut graph = diamond();
    let src = generate(&mut graph, &hosted(), &mut rng).unwrap();

    assert!(src.contains("#include \"stress.h\""));
    assert!(src.contains("extern volatile uint64_t pages[];"));
    assert!(src.contains("smp_load_acquire(&core_0_thread_"));
    assert!(src.contains("smp_store_release("));
    assert!(src.contains("while(num_active_threads_core_1 > 0){"));
    assert!(src.contains("void mango_core_main_func(uint64_t core_id){"));
    assert!(src.contains("void mango_main(void){"));
    assert!(!src.contains("pthread_mutex"));
    assert!(!src.contains("pthread_cond"));
}

#[test]
fn preemptive_uses_only_condvars() {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let mut graph = diamond();
    let src = generate(
        &mut graph,
        &Backend::Preemptive(PreemptiveOptions::default()),
        &mut rng,
    )
    .unwrap();

    assert!(src.contains("pthread_cond_wait("));
    assert!(src.contains("pthread_cond_broadcast("));
    assert!(src.contains("// wait for fill_0 @ core 0 thread 0"));
    assert!(!src.contains("smp_load_acquire"));
    assert!(!src.contains("mango_core_main_func"));
}

#[test]
fn every_action_appears_exactly_once_per_c_backend() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for backend in [
        Backend::Cooperative(CooperativeOptions::default()),
        Backend::Preemptive(PreemptiveOptions::default()),
    ] {
        let mut graph = diamond();
        let src = generate(&mut graph, &backend, &mut rng).unwrap();
        for name in ["fill_0", "check_0", "flush_0", "report_0"] {
            let definition = format!("// body function of action {name}\n");
            assert_eq!(src.matches(&definition).count(), 1);
            let call = format!("{name}_body_func(");
            // one definition plus one call site
            assert_eq!(src.matches(&call).count(), 2, "{name} in {}", backend.name());
        }
    }
}

#[test]
fn punctuated_names_do_not_collide_in_c_backends() {
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    for backend in [hosted(), Backend::Preemptive(PreemptiveOptions::default())] {
        let mut graph = Graph::new(1);
        let dotted = native(&mut graph, "a.b_0", 0);
        let plain = native(&mut graph, "a_b_0", 0);
        graph.add_dependency(dotted, plain).unwrap();
        graph.finalize(AssignPolicy::Spread, &mut rng).unwrap();

        let src = generate(&mut graph, &backend, &mut rng).unwrap();
        for func in ["a_b_0_body_func(", "a_b_0_x0_body_func("] {
            // one definition plus one call site
            assert_eq!(src.matches(func).count(), 2, "{func} in {}", backend.name());
        }
    }
}

#[test]
fn stored_manifest_renders_like_the_original_graph() {
    let mut graph = diamond();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");
    Manifest::from_graph(&graph).unwrap().write(&path).unwrap();

    let mut reloaded = Manifest::load(&path).unwrap().into_graph().unwrap();
    let backend = Backend::Preemptive(PreemptiveOptions::default());

    let a = generate(&mut graph, &backend, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
    let b = generate(&mut reloaded, &backend, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn uvm_counts_predecessors() {
    let mut rng = ChaCha8Rng::seed_from_u64(6);
    let mut graph = Graph::new(1);
    let a = graph.add_node(ActionNode::target("a", Payload::Verification("#1;".into())));
    let b = graph.add_node(ActionNode::target("b", Payload::Verification("#2;".into())));
    let c = graph.add_node(ActionNode::target("c", Payload::Verification("#3;".into())));
    graph.add_dependency(a, c).unwrap();
    graph.add_dependency(b, c).unwrap();
    graph.finalize(AssignPolicy::Random, &mut rng).unwrap();

    let src = generate(&mut graph, &Backend::Uvm(UvmOptions::default()), &mut rng).unwrap();
    assert!(src.contains("    c.num_predecessors = 2;"));
    assert!(src.contains("    a.successors[0] = c;"));
    assert!(src.contains("Action actions[] = new[3];"));
    assert!(!src.contains("package"));
}
