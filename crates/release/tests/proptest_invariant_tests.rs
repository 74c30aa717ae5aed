//! Property-based tests for graph ordering, cascades, and version increases.
//!
//! Workspaces are random DAGs: package `pN` may only depend on packages with
//! a lower index, so every generated graph is acyclic.

use cascade_release::calculator::VersionDecision;
use cascade_release::cascade::propagate;
use cascade_release::{
    BumpLevel, CascadePolicy, DependencyGraph, Package, PackageId, PlanBuilder, Version,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn bump_strategy() -> impl Strategy<Value = BumpLevel> {
    prop_oneof![
        3 => Just(BumpLevel::None),
        2 => Just(BumpLevel::Patch),
        2 => Just(BumpLevel::Minor),
        1 => Just(BumpLevel::Major),
    ]
}

fn version_strategy() -> impl Strategy<Value = Version> {
    (0u64..3, 0u64..5, 0u64..5, prop::option::of(0u64..4)).prop_map(
        |(major, minor, patch, pre)| {
            let version = Version::new(major, minor, patch);
            match pre {
                Some(ordinal) => version.with_pre_release("rc", ordinal),
                None => version,
            }
        },
    )
}

fn id(index: usize) -> PackageId {
    format!("p{index:02}")
}

/// A workspace of up to 12 packages with random edges to earlier packages
/// and a random primary bump per package.
fn workspace_strategy() -> impl Strategy<Value = (Vec<Package>, BTreeMap<PackageId, BumpLevel>)> {
    (1usize..12)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(version_strategy(), n),
                prop::collection::vec(prop::collection::vec(any::<bool>(), n), n),
                prop::collection::vec(bump_strategy(), n),
            )
        })
        .prop_map(|(versions, edges, bumps)| {
            let packages: Vec<Package> = versions
                .into_iter()
                .enumerate()
                .map(|(i, version)| {
                    let deps = (0..i).filter(|&j| edges[i][j]).map(id);
                    Package::new(id(i), version).with_dependencies(deps)
                })
                .collect();
            let bumps: BTreeMap<PackageId, BumpLevel> = bumps
                .into_iter()
                .enumerate()
                .map(|(i, bump)| (id(i), bump))
                .collect();
            (packages, bumps)
        })
}

fn primaries(bumps: &BTreeMap<PackageId, BumpLevel>) -> BTreeMap<PackageId, VersionDecision> {
    bumps
        .iter()
        .map(|(id, bump)| (id.clone(), VersionDecision::primary(id.clone(), *bump, Vec::new())))
        .collect()
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    /// Contract: every dependency appears before its dependents.
    #[test]
    fn prop_topological_order_is_sound((packages, _) in workspace_strategy()) {
        let graph = DependencyGraph::new(&packages).unwrap();
        let order = graph.topological_order(None).unwrap();
        prop_assert_eq!(order.len(), packages.len());

        let position: BTreeMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for package in &packages {
            for dep in &package.dependencies {
                prop_assert!(position[dep.as_str()] < position[package.id.as_str()]);
            }
        }
    }

    /// Contract: ordering is a pure function of the workspace.
    #[test]
    fn prop_topological_order_is_deterministic((packages, _) in workspace_strategy()) {
        let mut reversed = packages.clone();
        reversed.reverse();
        let a = DependencyGraph::new(&packages).unwrap().topological_order(None).unwrap();
        let b = DependencyGraph::new(&reversed).unwrap().topological_order(None).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Contract: a dependent's final bump is at least its own primary bump
    /// and at least the final bump of every direct dependency.
    #[test]
    fn prop_cascade_is_monotonic((packages, bumps) in workspace_strategy()) {
        let graph = DependencyGraph::new(&packages).unwrap();
        let finals = propagate(&primaries(&bumps), &graph, CascadePolicy::Always).unwrap();
        prop_assert_eq!(finals.len(), packages.len());

        for package in &packages {
            let own = finals[&package.id].bump;
            prop_assert!(own >= bumps[&package.id]);
            for dep in &package.dependencies {
                prop_assert!(own >= finals[dep].bump);
            }
            if finals[&package.id].is_cascaded {
                prop_assert!(!finals[&package.id].sources().is_empty());
            }
        }
    }

    /// Contract: every planned version is greater than the current one and
    /// the plan's order respects dependencies among released packages.
    #[test]
    fn prop_planned_versions_increase((packages, bumps) in workspace_strategy()) {
        let graph = DependencyGraph::new(&packages).unwrap();
        let finals = propagate(&primaries(&bumps), &graph, CascadePolicy::Always).unwrap();
        let Ok(plan) = PlanBuilder::new().build(&finals, &graph, BTreeMap::new()) else {
            prop_assert!(finals.values().all(|d| d.bump == BumpLevel::None));
            return Ok(());
        };

        for release in plan.releases.values() {
            let current = &release.current_version;
            let new = &release.new_version;
            prop_assert!(new > current);
            if current.is_pre_release() {
                prop_assert_eq!(
                    (new.major, new.minor, new.patch),
                    (current.major, current.minor, current.patch)
                );
            } else {
                let changed = [
                    new.major != current.major,
                    new.minor != current.minor,
                    new.patch != current.patch,
                ];
                prop_assert!(changed.iter().any(|c| *c));
            }
        }

        let position: BTreeMap<&str, usize> = plan
            .publish_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        for id in &plan.publish_order {
            for dep in graph.dependencies_of(id) {
                if let Some(before) = position.get(dep.as_str()) {
                    prop_assert!(*before < position[id.as_str()]);
                }
            }
        }
        plan.validate().unwrap();
    }
}
