//! Workflow graph analysis and the compiled execution plan.
//!
//! Uses `petgraph` to model `next_steps` edges as a directed graph. A
//! topological sort detects cycles and fixes the order in which readiness is
//! evaluated. [`ExecutionPlan`] bundles a validated workflow with its parsed
//! conditions, input bindings and predecessor sets so nothing is re-parsed
//! while a run is in flight.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use weave_types::condition::Condition;
use weave_types::config::EngineConfig;
use weave_types::workflow::{Step, Workflow};

use super::condition::compile_condition;
use super::definition::{WorkflowError, validate};
use super::reference::InputBinding;

// ---------------------------------------------------------------------------
// Graph helpers
// ---------------------------------------------------------------------------

/// Steps never named in another step's `next_steps`, in declared order.
///
/// Falls back to the first declared step when every step is referenced, and
/// to nothing for an empty workflow.
pub fn entry_steps(workflow: &Workflow) -> Vec<&Step> {
    let referenced: std::collections::HashSet<&str> = workflow
        .steps
        .iter()
        .flat_map(|s| s.next_steps.iter().map(String::as_str))
        .collect();

    let entries: Vec<&Step> = workflow
        .steps
        .iter()
        .filter(|s| !referenced.contains(s.id.as_str()))
        .collect();

    if entries.is_empty() {
        workflow.steps.first().into_iter().collect()
    } else {
        entries
    }
}

/// Build the `next_steps` graph. Edges to unknown ids are ignored.
fn build_graph(workflow: &Workflow) -> (DiGraph<&str, ()>, Vec<NodeIndex>) {
    let mut graph = DiGraph::<&str, ()>::new();
    let nodes: Vec<NodeIndex> = workflow
        .steps
        .iter()
        .map(|s| graph.add_node(s.id.as_str()))
        .collect();
    let index: HashMap<&str, usize> = workflow
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    for (from, step) in workflow.steps.iter().enumerate() {
        for next in &step.next_steps {
            if let Some(&to) = index.get(next.as_str()) {
                graph.add_edge(nodes[from], nodes[to], ());
            }
        }
    }
    (graph, nodes)
}

/// Return the id of a step on a cycle, if the graph has one.
pub fn find_cycle(workflow: &Workflow) -> Option<String> {
    let (graph, _) = build_graph(workflow);
    toposort(&graph, None)
        .err()
        .map(|cycle| graph[cycle.node_id()].to_string())
}

/// Group steps into levels: a step's level is one more than its deepest
/// predecessor. Steps in a level keep declared order.
///
/// Fails on cyclic graphs.
pub fn execution_levels(workflow: &Workflow) -> Result<Vec<Vec<&Step>>, WorkflowError> {
    if workflow.steps.is_empty() {
        return Ok(vec![]);
    }

    let (graph, nodes) = build_graph(workflow);
    let sorted = toposort(&graph, None).map_err(|cycle| {
        WorkflowError::Validation(vec![format!(
            "cycle detected involving step '{}'",
            graph[cycle.node_id()]
        )])
    })?;

    let position: HashMap<NodeIndex, usize> =
        nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    let mut depth = vec![0usize; workflow.steps.len()];
    for node in sorted {
        let from = position[&node];
        for succ in graph.neighbors(node) {
            let to = position[&succ];
            depth[to] = depth[to].max(depth[from] + 1);
        }
    }

    let max_depth = depth.iter().copied().max().unwrap_or(0);
    let mut levels: Vec<Vec<&Step>> = vec![vec![]; max_depth + 1];
    for (i, step) in workflow.steps.iter().enumerate() {
        levels[depth[i]].push(step);
    }
    Ok(levels)
}

// ---------------------------------------------------------------------------
// ExecutionPlan
// ---------------------------------------------------------------------------

/// A step with its condition and inputs parsed.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub step: Step,
    pub condition: Option<Condition>,
    pub inputs: Vec<(String, InputBinding)>,
}

/// A validated workflow ready to execute.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    workflow: Workflow,
    steps: Vec<PlannedStep>,
    index: HashMap<String, usize>,
    predecessors: Vec<Vec<usize>>,
    entries: Vec<usize>,
    topo_order: Vec<usize>,
}

impl ExecutionPlan {
    /// Validate `workflow` and compile it. All validation errors are returned
    /// together.
    pub fn compile(workflow: Workflow) -> Result<Self, WorkflowError> {
        validate(&workflow).into_result()?;

        let index: HashMap<String, usize> = workflow
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        let mut predecessors = vec![Vec::new(); workflow.steps.len()];
        for (from, step) in workflow.steps.iter().enumerate() {
            for next in &step.next_steps {
                let to = index[next.as_str()];
                if !predecessors[to].contains(&from) {
                    predecessors[to].push(from);
                }
            }
        }

        let entries = entry_steps(&workflow)
            .into_iter()
            .map(|s| index[s.id.as_str()])
            .collect();

        let (graph, nodes) = build_graph(&workflow);
        let position: HashMap<NodeIndex, usize> =
            nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let topo_order = toposort(&graph, None)
            .map_err(|cycle| {
                WorkflowError::Validation(vec![format!(
                    "cycle detected involving step '{}'",
                    graph[cycle.node_id()]
                )])
            })?
            .into_iter()
            .map(|n| position[&n])
            .collect();

        let mut steps = Vec::with_capacity(workflow.steps.len());
        for step in &workflow.steps {
            let condition = step
                .condition
                .as_ref()
                .map(compile_condition)
                .transpose()
                .map_err(|e| {
                    WorkflowError::Validation(vec![format!("step '{}' condition: {e}", step.id)])
                })?;

            let mut inputs = Vec::with_capacity(step.input_mapping.len());
            for (key, value) in &step.input_mapping {
                let binding = InputBinding::parse(value).map_err(|e| {
                    WorkflowError::Validation(vec![format!(
                        "step '{}' input '{}': {e}",
                        step.id, key
                    )])
                })?;
                inputs.push((key.clone(), binding));
            }
            inputs.sort_by(|a, b| a.0.cmp(&b.0));

            steps.push(PlannedStep {
                step: step.clone(),
                condition,
                inputs,
            });
        }

        Ok(Self {
            workflow,
            steps,
            index,
            predecessors,
            entries,
            topo_order,
        })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn step(&self, step_id: &str) -> Option<&PlannedStep> {
        self.index.get(step_id).map(|&i| &self.steps[i])
    }

    /// Steps in declared order.
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Declared position of a step, used to order ready sets.
    pub fn position(&self, step_id: &str) -> Option<usize> {
        self.index.get(step_id).copied()
    }

    pub fn is_entry(&self, step_id: &str) -> bool {
        self.index
            .get(step_id)
            .is_some_and(|i| self.entries.contains(i))
    }

    /// Ids of the steps that list `step_id` in their `next_steps`.
    pub fn predecessors(&self, step_id: &str) -> Vec<&str> {
        self.index
            .get(step_id)
            .map(|&i| {
                self.predecessors[i]
                    .iter()
                    .map(|&p| self.steps[p].step.id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Steps in a topological order of the `next_steps` graph.
    pub fn topological(&self) -> impl Iterator<Item = &PlannedStep> {
        self.topo_order.iter().map(|&i| &self.steps[i])
    }

    /// Parallel steps launched per round.
    pub fn max_parallel(&self, config: &EngineConfig) -> usize {
        self.workflow
            .max_parallel_steps
            .unwrap_or(config.default_max_parallel_steps)
            .max(1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
