use std::collections::HashMap;

use converge_core::{Op, Step, Urn};

/// The dependency graph derived from a step plan: for each step index, the
/// set of other indices that must complete before it, and the set of
/// indices that become eligible once it completes.
pub struct StepGraph {
    pub prerequisites: Vec<Vec<usize>>,
    pub successors: Vec<Vec<usize>>,
}

/// Build the scheduling graph for `steps` per the antichain discipline: a
/// step on URN U waits for the prior step on U (total order per URN), and
/// for Create/Update steps, waits for the Create/Update of every dependency;
/// for Delete/DeleteReplaced steps, waits for the Delete of every URN that
/// depends on U (reverse-topological deletion order).
pub fn build_graph(steps: &[Step]) -> StepGraph {
    let n = steps.len();

    // URN -> step indices targeting it, in emission order.
    let mut targets: HashMap<&Urn, Vec<usize>> = HashMap::new();
    for (i, step) in steps.iter().enumerate() {
        targets.entry(&step.urn).or_default().push(i);
    }

    // URN -> indices of steps whose dependency closure names it.
    let mut dependents: HashMap<&Urn, Vec<usize>> = HashMap::new();
    let closures: Vec<Vec<Urn>> = steps.iter().map(Step::dependency_closure).collect();
    for (i, deps) in closures.iter().enumerate() {
        for dep in deps {
            dependents.entry(dep).or_default().push(i);
        }
    }

    let mut prereqs: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, step) in steps.iter().enumerate() {
        // Same-URN total order: each step waits for the previous step on its URN.
        if let Some(positions) = targets.get(&step.urn) {
            if let Some(pos) = positions.iter().position(|&idx| idx == i) {
                if pos > 0 {
                    prereqs[i].push(positions[pos - 1]);
                }
            }
        }

        if step.op.is_destructive() {
            // Wait for the deletion of anything that depended on this URN.
            if let Some(deps_on_me) = dependents.get(&step.urn) {
                for &j in deps_on_me {
                    if steps[j].op.is_destructive() && j != i {
                        prereqs[i].push(j);
                    }
                }
            }
        } else {
            // Wait for the create/update of everything this step depends on.
            for dep in &closures[i] {
                if let Some(positions) = targets.get(dep) {
                    for &j in positions {
                        if !steps[j].op.is_destructive() && j != i {
                            prereqs[i].push(j);
                        }
                    }
                }
            }
        }

        prereqs[i].sort_unstable();
        prereqs[i].dedup();
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, pre) in prereqs.iter().enumerate() {
        for &p in pre {
            successors[p].push(i);
        }
    }

    StepGraph {
        prerequisites: prereqs,
        successors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::ResourceState;

    fn step(op: Op, urn: &Urn, deps: &[Urn]) -> Step {
        let mut state = ResourceState::new(urn.clone(), true, "t");
        state.dependencies = deps.to_vec();
        Step::new(op, urn.clone()).with_old_state(state)
    }

    #[test]
    fn create_waits_for_dependency_create() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let b = Urn::new("test", "proj", "", "t", "b");
        let steps = vec![step(Op::Create, &b, &[a.clone()]), step(Op::Create, &a, &[])];
        let graph = build_graph(&steps);
        // step 0 (b) depends on step 1 (a)
        assert_eq!(graph.prerequisites[0], vec![1]);
        assert!(graph.prerequisites[1].is_empty());
    }

    #[test]
    fn delete_runs_in_reverse_topological_order() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let b = Urn::new("test", "proj", "", "t", "b");
        // b depends on a; deleting b must precede deleting a.
        let steps = vec![step(Op::Delete, &a, &[]), step(Op::Delete, &b, &[a.clone()])];
        let graph = build_graph(&steps);
        // step 0 (delete a) waits for step 1 (delete b)
        assert_eq!(graph.prerequisites[0], vec![1]);
        assert!(graph.prerequisites[1].is_empty());
    }

    #[test]
    fn same_urn_steps_are_totally_ordered() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let steps = vec![step(Op::CreateReplacement, &a, &[]), step(Op::DeleteReplaced, &a, &[])];
        let graph = build_graph(&steps);
        assert!(graph.prerequisites[0].is_empty());
        assert_eq!(graph.prerequisites[1], vec![0]);
    }
}
