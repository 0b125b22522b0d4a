use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::Table;

/// Outcome of path planning. Expected outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPlan {
    Found(Vec<String>),
    Unreachable,
    InvalidOrigin,
}

/// Split a page-transition id `from_to_ordinal`. The ordinal may itself
/// contain underscores.
pub fn split_transition_id(id: &str) -> Option<(&str, &str, &str)> {
    let mut parts = id.splitn(3, '_');
    let from = parts.next()?;
    let to = parts.next()?;
    let ordinal = parts.next()?;
    if from.is_empty() || to.is_empty() {
        return None;
    }
    Some((from, to, ordinal))
}

/// Directed page graph: state -> [(next state, transition id)] in
/// declaration order. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct NavGraph {
    edges: HashMap<String, Vec<(String, String)>>,
}

impl NavGraph {
    pub fn build(page_transitions: &Table) -> Self {
        let mut edges: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for id in page_transitions.keys() {
            let Some((from, to, _)) = split_transition_id(id) else { continue };
            let out = edges.entry(from.to_string()).or_default();
            // First declaration of a (from, to) pair wins
            if !out.iter().any(|(next, _)| next == to) {
                out.push((to.to_string(), id.to_string()));
            }
        }
        NavGraph { edges }
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&str> {
        self.edges
            .get(from)?
            .iter()
            .find(|(next, _)| next == to)
            .map(|(_, id)| id.as_str())
    }

    pub fn neighbors(&self, from: &str) -> impl Iterator<Item = &str> {
        self.edges.get(from).into_iter().flatten().map(|(next, _)| next.as_str())
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn has_node(&self, state: &str) -> bool {
        self.edges.contains_key(state)
            || self.edges.values().flatten().any(|(next, _)| next == state)
    }

    /// Breadth-first shortest path. Ties resolve by edge declaration order.
    pub fn find_path(&self, start: &str, end: &str) -> PathPlan {
        if !self.has_node(start) {
            return PathPlan::InvalidOrigin;
        }
        if start == end {
            return PathPlan::Found(vec![start.to_string()]);
        }

        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut queue: VecDeque<(&str, Vec<&str>)> = VecDeque::from([(start, vec![start])]);

        while let Some((node, path)) = queue.pop_front() {
            for next in self.neighbors(node) {
                if next == end {
                    let mut found: Vec<String> = path.iter().map(|s| s.to_string()).collect();
                    found.push(next.to_string());
                    return PathPlan::Found(found);
                }
                if visited.insert(next) {
                    let mut longer = path.clone();
                    longer.push(next);
                    queue.push_back((next, longer));
                }
            }
        }
        PathPlan::Unreachable
    }
}
