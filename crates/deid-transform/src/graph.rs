//! Topological ordering of named nodes.
//!
//! Used for transformer nodes within a table and for tables within a run.

use std::collections::{BTreeSet, HashMap};

use crate::error::PipelineError;

/// Order `nodes` so that every node comes after its dependencies.
///
/// `nodes` is `(id, dependencies)` in declaration order. Among nodes that are
/// ready at the same time the one declared first goes first. Returns indices
/// into `nodes`.
pub fn topological_order<S: AsRef<str>>(
    nodes: &[(S, Vec<S>)],
) -> Result<Vec<usize>, PipelineError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (position, (id, _)) in nodes.iter().enumerate() {
        if index.insert(id.as_ref(), position).is_some() {
            return Err(PipelineError::DuplicateNode {
                node: id.as_ref().to_string(),
            });
        }
    }

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (position, (id, depends_on)) in nodes.iter().enumerate() {
        for dependency in depends_on {
            let Some(&parent) = index.get(dependency.as_ref()) else {
                return Err(PipelineError::UnknownDependency {
                    node: id.as_ref().to_string(),
                    dependency: dependency.as_ref().to_string(),
                });
            };
            dependents[parent].push(position);
            in_degree[position] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len())
        .filter(|&position| in_degree[position] == 0)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(position) = ready.pop_first() {
        order.push(position);
        for &child in &dependents[position] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < nodes.len() {
        let cyclic = (0..nodes.len())
            .filter(|&position| in_degree[position] > 0)
            .map(|position| nodes[position].0.as_ref().to_string())
            .collect();
        return Err(PipelineError::DependencyCycle { nodes: cyclic });
    }
    Ok(order)
}
