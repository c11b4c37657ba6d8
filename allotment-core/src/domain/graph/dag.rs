// allotment-core/src/domain/graph/dag.rs

use crate::domain::entity::EntityKind;
use crate::domain::error::DomainError;
use std::collections::{BTreeMap, VecDeque};

pub struct GraphSolver;

impl GraphSolver {
    /// Calculates the load order of the selected entities (Topological Sort with Layers).
    /// Returns a list of tiers, where each tier contains units that can run concurrently.
    /// Tier N depends only on tiers 0..N-1. Dependencies outside the selection are ignored.
    pub fn plan_execution(selected: &[EntityKind]) -> Result<Vec<Vec<EntityKind>>, DomainError> {
        Self::plan_with(selected, |e| e.depends_on().to_vec())
    }

    /// Same as [`GraphSolver::plan_execution`] with an explicit dependency function.
    pub fn plan_with<F>(
        selected: &[EntityKind],
        depends_on: F,
    ) -> Result<Vec<Vec<EntityKind>>, DomainError>
    where
        F: Fn(&EntityKind) -> Vec<EntityKind>,
    {
        // BTreeMap keeps tiers deterministic (declaration order)
        let mut in_degree: BTreeMap<EntityKind, usize> = BTreeMap::new();
        let mut adj_list: BTreeMap<EntityKind, Vec<EntityKind>> = BTreeMap::new();

        // 1. Initialization
        for entity in selected {
            in_degree.insert(*entity, 0);
            adj_list.insert(*entity, Vec::new());
        }

        // 2. Graph Construction (Dependency Inversion)
        for entity in in_degree.keys().copied().collect::<Vec<_>>() {
            for dep in depends_on(&entity) {
                if in_degree.contains_key(&dep) {
                    adj_list.entry(dep).or_default().push(entity);
                    *in_degree.entry(entity).or_insert(0) += 1;
                }
            }
        }

        // 3. Kahn's Algorithm (Layered)
        let mut layers: Vec<Vec<EntityKind>> = Vec::new();
        let mut queue: VecDeque<EntityKind> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(e, _)| *e)
            .collect();

        let mut total_resolved = 0;

        while !queue.is_empty() {
            let layer_size = queue.len();
            let mut current_layer = Vec::with_capacity(layer_size);

            for _ in 0..layer_size {
                if let Some(current) = queue.pop_front() {
                    current_layer.push(current);
                    total_resolved += 1;

                    if let Some(neighbors) = adj_list.get(&current) {
                        for neighbor in neighbors {
                            if let Some(degree) = in_degree.get_mut(neighbor) {
                                *degree -= 1;
                                if *degree == 0 {
                                    queue.push_back(*neighbor);
                                }
                            }
                        }
                    }
                }
            }
            current_layer.sort();
            layers.push(current_layer);
        }

        // 4. Cycle Detection
        if total_resolved != in_degree.len() {
            let stuck: Vec<String> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(e, _)| e.to_string())
                .collect();
            return Err(DomainError::CircularDependency(format!(
                "Resolved {}/{} units. Stuck: {}",
                total_resolved,
                in_degree.len(),
                stuck.join(", ")
            )));
        }

        Ok(layers)
    }
}
