//! Dependency graph checks run before a pool starts

use std::collections::{HashMap, VecDeque};

use crate::error::{MeshError, Result};

/// Items and their dependency ids, in insertion order
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    deps: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build a graph, rejecting duplicate ids and dependencies on unknown ids
    pub fn new<I, D>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = String>,
    {
        let mut graph = Self::default();
        for (id, deps) in items {
            if graph.deps.contains_key(&id) {
                return Err(MeshError::DuplicateWorkItem(id));
            }
            let mut unique = Vec::new();
            for dep in deps {
                if !unique.contains(&dep) {
                    unique.push(dep);
                }
            }
            graph.order.push(id.clone());
            graph.deps.insert(id, unique);
        }

        for id in &graph.order {
            for dep in &graph.deps[id] {
                if !graph.deps.contains_key(dep) {
                    return Err(MeshError::UnknownWorkItem(dep.clone()));
                }
            }
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// First cycle found, as a path that starts and ends on the same id
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for root in &self.order {
            if marks.contains_key(root.as_str()) {
                continue;
            }

            // Explicit stack of (node, next dependency index); `path` mirrors it
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            let mut path: Vec<&str> = vec![root.as_str()];
            marks.insert(root.as_str(), Mark::Visiting);

            while let Some((id, next)) = stack.last_mut() {
                let deps = &self.deps[*id];
                if *next == deps.len() {
                    marks.insert(*id, Mark::Done);
                    stack.pop();
                    path.pop();
                    continue;
                }

                let dep = deps[*next].as_str();
                *next += 1;
                match marks.get(dep) {
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => {
                        let start = path.iter().position(|p| *p == dep).unwrap_or(0);
                        let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                        cycle.push(dep.to_string());
                        return Some(cycle);
                    }
                    None => {
                        marks.insert(dep, Mark::Visiting);
                        stack.push((dep, 0));
                        path.push(dep);
                    }
                }
            }
        }
        None
    }

    pub fn validate(&self) -> Result<()> {
        match self.find_cycle() {
            Some(cycle) => Err(MeshError::CyclicDependency(cycle)),
            None => Ok(()),
        }
    }

    /// Group items into layers; every item's dependencies sit in earlier layers.
    ///
    /// Items within a layer keep insertion order.
    pub fn execution_layers(&self) -> Result<Vec<Vec<String>>> {
        self.validate()?;

        let mut remaining: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|id| (id.as_str(), self.deps[id].len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for id in &self.order {
            for dep in &self.deps[id] {
                dependents.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut ready: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| remaining[id] == 0)
            .collect();
        let mut layers = Vec::new();

        while !ready.is_empty() {
            let layer: Vec<&str> = ready.drain(..).collect();
            let mut next = Vec::new();
            for id in &layer {
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }
            // Keep insertion order within the next layer
            next.sort_by_key(|id| position[id]);
            ready.extend(next);
            layers.push(layer.into_iter().map(str::to_string).collect());
        }

        Ok(layers)
    }
}
