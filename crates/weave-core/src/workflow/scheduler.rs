//! Readiness computation for the topological scheduler.
//!
//! Pure function of the plan and the current step statuses. A pending step
//! is ready when it is an entry step, or when every predecessor has settled
//! and at least one of them completed. When every predecessor has settled
//! and none completed, the step is pruned, and that propagates forward in
//! the same pass.

use std::collections::HashMap;

use weave_types::execution::{StepStatus, WorkflowExecution};

use super::dag::ExecutionPlan;

/// Outcome of one readiness pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Steps to dispatch this round, in declared order.
    pub ready: Vec<String>,
    /// Steps that can never run; mark them `pruned`.
    pub pruned: Vec<String>,
}

impl Readiness {
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty()
    }
}

pub fn compute_ready(plan: &ExecutionPlan, execution: &WorkflowExecution) -> Readiness {
    // Pruning in this pass must be visible to later steps in the same pass.
    let mut overlay: HashMap<&str, StepStatus> = HashMap::new();
    let status_of = |overlay: &HashMap<&str, StepStatus>, id: &str| {
        overlay
            .get(id)
            .copied()
            .unwrap_or_else(|| execution.step_status(id))
    };

    let mut readiness = Readiness::default();

    for planned in plan.topological() {
        let id = planned.step.id.as_str();
        if status_of(&overlay, id) != StepStatus::Pending {
            continue;
        }

        if plan.is_entry(id) {
            readiness.ready.push(id.to_string());
            continue;
        }

        let predecessors = plan.predecessors(id);
        let statuses: Vec<StepStatus> = predecessors
            .iter()
            .map(|p| status_of(&overlay, p))
            .collect();

        if !statuses.iter().all(StepStatus::is_settled) {
            continue;
        }

        if statuses.contains(&StepStatus::Completed) {
            readiness.ready.push(id.to_string());
        } else {
            overlay.insert(id, StepStatus::Pruned);
            readiness.pruned.push(id.to_string());
        }
    }

    readiness
        .ready
        .sort_by_key(|id| plan.position(id).unwrap_or(usize::MAX));
    readiness
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use weave_types::workflow::Workflow;

    fn plan(steps: serde_json::Value) -> ExecutionPlan {
        let workflow: Workflow = serde_json::from_value(json!({
            "id": "wf",
            "name": "wf",
            "steps": steps,
        }))
        .unwrap();
        ExecutionPlan::compile(workflow).unwrap()
    }

    fn step(id: &str, next: &[&str]) -> serde_json::Value {
        json!({"id": id, "name": id, "agent": "a", "tool": "t", "next_steps": next})
    }

    fn diamond() -> ExecutionPlan {
        plan(json!([
            step("a", &["b", "c"]),
            step("b", &["d"]),
            step("c", &["d"]),
            step("d", &[]),
        ]))
    }

    #[test]
    fn entries_are_ready_first() {
        let plan = diamond();
        let exec = WorkflowExecution::new("wf", Map::new());
        let r = compute_ready(&plan, &exec);
        assert_eq!(r.ready, vec!["a"]);
        assert!(r.pruned.is_empty());
    }

    #[test]
    fn join_waits_for_all_predecessors() {
        let plan = diamond();
        let mut exec = WorkflowExecution::new("wf", Map::new());
        exec.set_step_status("a", StepStatus::Completed);
        assert_eq!(compute_ready(&plan, &exec).ready, vec!["b", "c"]);

        exec.set_step_status("b", StepStatus::Completed);
        exec.set_step_status("c", StepStatus::Running);
        assert!(compute_ready(&plan, &exec).is_idle());

        exec.set_step_status("c", StepStatus::Failed);
        assert_eq!(compute_ready(&plan, &exec).ready, vec!["d"]);
    }

    #[test]
    fn skipped_branch_prunes_downstream() {
        let plan = plan(json!([
            step("a", &["b"]),
            step("b", &["c"]),
            step("c", &[]),
        ]));
        let mut exec = WorkflowExecution::new("wf", Map::new());
        exec.set_step_status("a", StepStatus::Skipped);

        let r = compute_ready(&plan, &exec);
        assert!(r.ready.is_empty());
        assert_eq!(r.pruned, vec!["b", "c"]);
    }

    #[test]
    fn multiple_entries_in_declared_order() {
        let plan = plan(json!([
            step("z", &["j"]),
            step("y", &["j"]),
            step("j", &[]),
        ]));
        let exec = WorkflowExecution::new("wf", Map::new());
        assert_eq!(compute_ready(&plan, &exec).ready, vec!["z", "y"]);
    }

    #[test]
    fn dropped_predecessor_does_not_activate() {
        let plan = diamond();
        let mut exec = WorkflowExecution::new("wf", Map::new());
        exec.set_step_status("a", StepStatus::Completed);
        exec.set_step_status("b", StepStatus::Dropped);
        exec.set_step_status("c", StepStatus::Dropped);
        let r = compute_ready(&plan, &exec);
        assert_eq!(r.pruned, vec!["d"]);
    }
}
