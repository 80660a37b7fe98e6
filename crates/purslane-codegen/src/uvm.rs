//! UVM/SystemVerilog backend.
//!
//! Each target node becomes an `Action` subclass whose `ExecBody` task holds
//! the node's verification payload. The emitted `ActionScheduler` forks
//! every action without predecessors and, as each one completes, counts down
//! its successors' remaining predecessors, forking those that reach zero.

use std::fmt::Write;

use purslane_core::{CoreError, Graph};
use tracing::info;

use crate::error::CodegenError;
use crate::UvmOptions;

const SCHEDULER: &str = r#"
class Action;
  int sn;
  string name;
  int executor_id;
  int num_predecessors;
  Action successors[];

  function new();
    sn = -1;
    name = "unknown";
    executor_id = -1;
    num_predecessors = 0;
  endfunction

  virtual task ExecBody({executor} exec);
  endtask
endclass

class ActionScheduler;
  {executor} executors[];
  Action actions[];
  int num_action_left;
  int progress_fd;

  function new({executor} executors[], Action actions[]);
    this.executors = executors;
    this.actions = actions;
    this.num_action_left = actions.size();
    this.progress_fd = $fopen("./mango_progress.txt", "w");
  endfunction

  task ExecAction(Action act);
    fork
      begin
        $fdisplay(this.progress_fd, "start %d", act.sn);
        $fflush(this.progress_fd);
        act.ExecBody(executors[act.executor_id]);
        $fdisplay(this.progress_fd, "end %d", act.sn);
        $fflush(this.progress_fd);
        foreach(act.successors[i]) begin
          Action succ = act.successors[i];
          succ.num_predecessors--;
          if(succ.num_predecessors <= 0) begin
            this.ExecAction(succ);
          end
        end
        num_action_left--;
      end
    join_none
  endtask

  task Run();
    // collect roots before forking any of them
    Action init_actions[$];
    foreach(this.actions[i]) begin
      Action act = this.actions[i];
      if(act.num_predecessors <= 0) begin
        init_actions.push_back(act);
      end
    end

    foreach(init_actions[i]) begin
      this.ExecAction(init_actions[i]);
    end

    wait(num_action_left <= 0);
    $fclose(this.progress_fd);
  endtask
endclass
"#;

/// Renders the verification program. Needs a numbered graph with agents
/// assigned; thread placement is not used.
pub fn render(graph: &Graph, options: &UvmOptions) -> Result<String, CodegenError> {
    if graph.nodes_by_serial().count() != graph.node_count() {
        let name = graph
            .node_ids()
            .filter_map(|id| graph.node(id))
            .find(|n| n.sn.is_none())
            .map(|n| n.name.clone())
            .unwrap_or_default();
        return Err(CoreError::MissingSerial { name }.into());
    }
    info!(executor = %options.executor_type, "rendering UVM");
    let executor = &options.executor_type;
    let mut out = String::with_capacity(8192);

    let _ = writeln!(out, "// generated by purslane\n");
    if let Some(package) = &options.package {
        let _ = writeln!(out, "package {package};");
    }
    let _ = writeln!(out, "import uvm_pkg::*;");
    let _ = writeln!(out, "`include \"uvm_macros.svh\"");
    out.push_str(&SCHEDULER.replace("{executor}", executor));
    out.push('\n');

    for (_, node) in graph.nodes_by_serial() {
        let src = node
            .payload
            .as_ref()
            .and_then(|p| p.verification())
            .ok_or_else(|| CodegenError::PayloadMismatch {
                name: node.name.clone(),
                expected: "verification",
            })?;
        let _ = writeln!(out, "class {}_Action extends Action;", node.ident());
        let _ = writeln!(out, "  virtual task ExecBody({executor} exec);");
        if !src.is_empty() {
            let _ = writeln!(out, "{src}");
        }
        let _ = writeln!(out, "  endtask");
        let _ = writeln!(out, "endclass\n");
    }

    let _ = writeln!(out, "class TestCase;");
    let _ = writeln!(out, "  ActionScheduler action_scheduler;\n");
    let _ = writeln!(out, "  function new({executor} execs[]);");
    let _ = writeln!(out, "    Action actions[] = new[{}];\n", graph.node_count());

    for (_, node) in graph.nodes_by_serial() {
        let ident = node.ident();
        let _ = writeln!(out, "    {ident}_Action {ident} = new;");
    }
    for (i, (id, node)) in graph.nodes_by_serial().enumerate() {
        let ident = node.ident();
        let sn = node.sn.ok_or_else(|| CoreError::MissingSerial {
            name: node.name.clone(),
        })?;
        let agent = node.agent.ok_or_else(|| CoreError::MissingAgent {
            name: node.name.clone(),
        })?;
        let _ = writeln!(out, "    {ident}.sn = {sn};");
        let _ = writeln!(out, "    {ident}.name = \"{}\";", node.name);
        let _ = writeln!(out, "    {ident}.executor_id = {agent};");
        let _ = writeln!(
            out,
            "    {ident}.num_predecessors = {};",
            graph.predecessors(id).len()
        );
        let _ = writeln!(out, "    actions[{i}] = {ident};");
    }
    out.push('\n');

    for (id, node) in graph.nodes_by_serial() {
        let successors = graph.successors(id);
        if successors.is_empty() {
            continue;
        }
        let ident = node.ident();
        let _ = writeln!(out, "    {ident}.successors = new[{}];", successors.len());
        for (j, succ) in successors.into_iter().enumerate() {
            let succ = graph.node(succ).ok_or(CoreError::NodeNotFound { id: succ })?;
            let _ = writeln!(out, "    {ident}.successors[{j}] = {};", succ.ident());
        }
    }
    let _ = writeln!(out, "    this.action_scheduler = new(execs, actions);");
    let _ = writeln!(out, "  endfunction\n");
    let _ = writeln!(out, "  task Run();");
    let _ = writeln!(out, "    this.action_scheduler.Run();");
    let _ = writeln!(out, "  endtask");
    let _ = writeln!(out, "endclass\n");

    if options.package.is_some() {
        let _ = writeln!(out, "endpackage");
    }
    Ok(out)
}
