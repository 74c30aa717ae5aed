//! Package dependency graph.
//!
//! Edges point from a dependency to its dependents, so a topological walk
//! visits every package after everything it depends on. Dependencies naming
//! packages outside the workspace are external and ignored.

use crate::package::{Package, PackageId};
use miette::Diagnostic;
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use thiserror::Error;

/// The dependency graph contains a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("Dependency cycle detected between packages: {}", packages.join(", "))]
#[diagnostic(
    code(cascade::release::cycle),
    help("Remove one of the dependencies so the packages form a DAG; no plan was produced")
)]
pub struct CycleError {
    /// Every package participating in a cycle, sorted.
    pub packages: Vec<PackageId>,
}

impl CycleError {
    /// Create a cycle error, sorting and deduplicating the participants.
    #[must_use]
    pub fn new(mut packages: Vec<PackageId>) -> Self {
        packages.sort();
        packages.dedup();
        Self { packages }
    }
}

/// Dependency graph over the workspace packages.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<PackageId, ()>,
    nodes: BTreeMap<PackageId, NodeIndex>,
    packages: BTreeMap<PackageId, Package>,
}

impl DependencyGraph {
    /// Build the graph and validate that it is acyclic.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] naming all packages on a cycle.
    pub fn new(packages: &[Package]) -> Result<Self, CycleError> {
        let mut graph: DiGraph<PackageId, ()> = DiGraph::new();
        let mut nodes = BTreeMap::new();

        // Insert in id order so node indices are deterministic.
        let by_id: BTreeMap<PackageId, Package> = packages
            .iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect();
        for id in by_id.keys() {
            nodes.insert(id.clone(), graph.add_node(id.clone()));
        }

        for package in by_id.values() {
            let dependent = nodes[&package.id];
            for dep in &package.dependencies {
                if let Some(&dependency) = nodes.get(dep) {
                    graph.add_edge(dependency, dependent, ());
                }
            }
        }

        let built = Self {
            graph,
            nodes,
            packages: by_id,
        };
        built.check_acyclic()?;
        Ok(built)
    }

    fn check_acyclic(&self) -> Result<(), CycleError> {
        let mut cyclic = Vec::new();
        for component in tarjan_scc(&self.graph) {
            let self_loop = component.len() == 1
                && self.graph.contains_edge(component[0], component[0]);
            if component.len() > 1 || self_loop {
                cyclic.extend(component.iter().map(|&idx| self.graph[idx].clone()));
            }
        }
        if cyclic.is_empty() {
            Ok(())
        } else {
            let err = CycleError::new(cyclic);
            tracing::error!(packages = ?err.packages, "Dependency cycle detected");
            Err(err)
        }
    }

    /// Number of packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the graph has no packages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Whether the package is part of the workspace.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Look up a package.
    #[must_use]
    pub fn package(&self, id: &str) -> Option<&Package> {
        self.packages.get(id)
    }

    /// All packages in id order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    fn neighbors(&self, id: &str, direction: Direction) -> BTreeSet<PackageId> {
        self.nodes
            .get(id)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, direction)
                    .map(|n| self.graph[n].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct workspace dependencies of a package.
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> BTreeSet<PackageId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct dependents of a package.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> BTreeSet<PackageId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Every package that depends on `id`, directly or transitively.
    #[must_use]
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<PackageId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<PackageId> = self.dependents_of(id).into_iter().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.dependents_of(&next));
            }
        }
        seen
    }

    /// Topological order, dependencies first; ties broken by id.
    ///
    /// With a subset, only its members are ordered. A member reaching another
    /// through packages outside the subset still comes first.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] if the graph contains a cycle.
    pub fn topological_order(
        &self,
        subset: Option<&BTreeSet<PackageId>>,
    ) -> Result<Vec<PackageId>, CycleError> {
        let members: BTreeSet<PackageId> = match subset {
            Some(subset) => subset.iter().filter(|id| self.contains(id)).cloned().collect(),
            None => self.nodes.keys().cloned().collect(),
        };
        let successors: BTreeMap<PackageId, BTreeSet<PackageId>> = members
            .iter()
            .map(|id| {
                let reachable = if subset.is_some() {
                    self.transitive_dependents(id)
                } else {
                    self.dependents_of(id)
                };
                let within = reachable
                    .into_iter()
                    .filter(|dependent| members.contains(dependent))
                    .collect();
                (id.clone(), within)
            })
            .collect();

        let mut in_degree: BTreeMap<&PackageId, usize> =
            members.iter().map(|id| (id, 0)).collect();
        for dependent in successors.values().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<&PackageId>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(members.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id.clone());
            for dependent in successors.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }

        if order.len() != members.len() {
            self.check_acyclic()?;
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn make_package(name: &str, deps: Vec<&str>) -> Package {
        Package::new(name, Version::new(0, 1, 0)).with_dependencies(deps)
    }

    fn ids(set: &BTreeSet<PackageId>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new(&[]).unwrap();
        assert!(graph.is_empty());
        assert!(graph.topological_order(None).unwrap().is_empty());
    }

    #[test]
    fn test_linear_order() {
        let graph = DependencyGraph::new(&[
            make_package("web", vec!["orm"]),
            make_package("orm", vec!["core"]),
            make_package("core", vec![]),
        ])
        .unwrap();
        assert_eq!(graph.topological_order(None).unwrap(), vec!["core", "orm", "web"]);
    }

    #[test]
    fn test_independent_packages_sorted_by_id() {
        let graph = DependencyGraph::new(&[
            make_package("zeta", vec![]),
            make_package("alpha", vec![]),
            make_package("mid", vec!["zeta"]),
        ])
        .unwrap();
        assert_eq!(
            graph.topological_order(None).unwrap(),
            vec!["alpha", "zeta", "mid"]
        );
    }

    #[test]
    fn test_diamond() {
        let graph = DependencyGraph::new(&[
            make_package("d", vec!["b", "c"]),
            make_package("b", vec!["a"]),
            make_package("c", vec!["a"]),
            make_package("a", vec![]),
        ])
        .unwrap();
        assert_eq!(graph.topological_order(None).unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(ids(&graph.dependencies_of("d")), vec!["b", "c"]);
        assert_eq!(ids(&graph.dependents_of("a")), vec!["b", "c"]);
        assert_eq!(ids(&graph.transitive_dependents("a")), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_subset_keeps_transitive_constraints() {
        let graph = DependencyGraph::new(&[
            make_package("a", vec!["z"]),
            make_package("m", vec!["a"]),
            make_package("z", vec![]),
        ])
        .unwrap();
        let subset: BTreeSet<PackageId> = ["z", "m"].into_iter().map(String::from).collect();
        assert_eq!(graph.topological_order(Some(&subset)).unwrap(), vec!["z", "m"]);
    }

    #[test]
    fn test_subset_ignores_unrelated_outside_packages() {
        let graph = DependencyGraph::new(&[
            make_package("a2", vec!["z"]),
            make_package("b", vec![]),
            make_package("z", vec![]),
        ])
        .unwrap();
        assert_eq!(graph.topological_order(None).unwrap(), vec!["b", "z", "a2"]);

        let subset: BTreeSet<PackageId> = ["a2", "b"].into_iter().map(String::from).collect();
        assert_eq!(graph.topological_order(Some(&subset)).unwrap(), vec!["a2", "b"]);
    }

    #[test]
    fn test_external_dependencies_ignored() {
        let graph = DependencyGraph::new(&[
            make_package("a", vec!["serde"]),
            make_package("b", vec!["a"]),
        ])
        .unwrap();
        assert_eq!(graph.topological_order(None).unwrap(), vec!["a", "b"]);
        assert!(graph.dependencies_of("a").is_empty());
        assert!(!graph.contains("serde"));
    }

    #[test]
    fn test_cycle_names_participants() {
        let err = DependencyGraph::new(&[
            make_package("b", vec!["a"]),
            make_package("a", vec!["b"]),
            make_package("c", vec!["a"]),
        ])
        .unwrap_err();
        assert_eq!(err.packages, vec!["a", "b"]);
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let err = DependencyGraph::new(&[make_package("a", vec!["a"])]).unwrap_err();
        assert_eq!(err.packages, vec!["a"]);
    }

    #[test]
    fn test_cycle_error_new_sorts_and_dedups() {
        let err = CycleError::new(vec!["b".into(), "a".into(), "b".into()]);
        assert_eq!(err.packages, vec!["a", "b"]);
    }
}
