//! Dependency diagnostics for workflow steps.
//!
//! The executor never consults this module: it discovers runnable steps by
//! scanning and treats an unrunnable remainder as a stall. These helpers let
//! tooling report the same problems before a run starts. `petgraph` models
//! the dependency edges and its topological sort detects cycles.

use std::collections::{HashMap, HashSet};

use medallion_types::workflow::StepDefinition;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::definition::WorkflowError;

/// Validate that steps form a DAG: every dependency names a step, no cycles.
pub fn validate_dag(steps: &[StepDefinition]) -> Result<(), WorkflowError> {
    let name_to_idx: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    // Edge from dependency -> dependent
    let mut graph = DiGraph::<&str, ()>::new();
    let node_indices: Vec<_> = steps.iter().map(|s| graph.add_node(s.name.as_str())).collect();

    for (to_idx, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            let from_idx = name_to_idx.get(dep.as_str()).ok_or_else(|| {
                WorkflowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.name, dep
                ))
            })?;
            graph.add_edge(node_indices[*from_idx], node_indices[to_idx], ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        let name = graph[cycle.node_id()];
        WorkflowError::CycleDetected(format!("cycle detected involving step '{name}'"))
    })?;

    Ok(())
}

/// Order in which the executor will run the steps, given every step succeeds.
///
/// Mirrors the executor's scan: repeated passes in declaration order, a step
/// runs as soon as all of its dependencies have run (including ones run
/// earlier in the same pass). Steps that can never run are omitted.
pub fn scan_order(steps: &[StepDefinition]) -> Vec<&str> {
    let mut executed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(steps.len());

    loop {
        let mut progress = false;
        for step in steps {
            if executed.contains(step.name.as_str()) {
                continue;
            }
            if step.depends_on.iter().all(|d| executed.contains(d.as_str())) {
                executed.insert(step.name.as_str());
                order.push(step.name.as_str());
                progress = true;
            }
        }
        if !progress {
            return order;
        }
    }
}

/// Returns the transitive closure of all dependencies for a given step.
///
/// If `step_name` is not found, returns an empty vec.
pub fn get_step_dependencies<'a>(step_name: &str, steps: &'a [StepDefinition]) -> Vec<&'a str> {
    let step_map: HashMap<&str, &StepDefinition> =
        steps.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut visited = HashSet::new();
    let mut stack = vec![step_name];

    while let Some(current) = stack.pop() {
        if let Some(step) = step_map.get(current) {
            for dep in &step.depends_on {
                if visited.insert(dep.as_str()) {
                    stack.push(dep.as_str());
                }
            }
        }
    }

    let mut deps: Vec<&str> = visited.into_iter().collect();
    deps.sort_unstable();
    deps
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
