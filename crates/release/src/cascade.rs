//! Cascade propagation.
//!
//! Packages are visited in topological order, so every dependency's final
//! decision exists before its dependents are evaluated. A dependent's final
//! bump is the maximum of its own primary bump and the final bumps of the
//! direct dependencies that contribute under the configured policy;
//! transitive effects follow by induction.

use crate::calculator::VersionDecision;
use crate::config::CascadePolicy;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::package::{Package, PackageId};
use crate::version::BumpLevel;
use std::collections::BTreeMap;

/// Propagate primary decisions through the dependency graph.
///
/// Returns one decision per workspace package. Decisions with
/// `bump == None` are kept so callers can report them; the plan builder
/// filters them out.
///
/// # Errors
///
/// Returns a cycle error if the graph is cyclic, or a configuration error if
/// a declared requirement cannot be parsed under the requirement policy.
pub fn propagate(
    primary: &BTreeMap<PackageId, VersionDecision>,
    graph: &DependencyGraph,
    policy: CascadePolicy,
) -> Result<BTreeMap<PackageId, VersionDecision>> {
    let order = graph.topological_order(None)?;
    let mut finals: BTreeMap<PackageId, VersionDecision> = BTreeMap::new();

    for id in order {
        let Some(package) = graph.package(&id) else {
            continue;
        };
        let mut decision = primary
            .get(&id)
            .cloned()
            .unwrap_or_else(|| VersionDecision::primary(id.clone(), BumpLevel::None, Vec::new()));

        let mut sources = Vec::new();
        let mut cascaded = BumpLevel::None;
        for dep in graph.dependencies_of(&id) {
            let Some(dep_decision) = finals.get(&dep) else {
                continue;
            };
            if !dep_decision.bump.is_some() {
                continue;
            }
            if !contributes(package, &dep, dep_decision.bump, graph, policy)? {
                tracing::debug!(
                    package = %id,
                    dependency = %dep,
                    "Dependency bump still satisfies declared requirement"
                );
                continue;
            }
            cascaded = cascaded.max(dep_decision.bump);
            sources.push(dep);
        }

        if !sources.is_empty() {
            decision.bump = decision.bump.max(cascaded);
            decision.is_cascaded = true;
            decision.cascade_source = Some(sources);
            tracing::debug!(
                package = %id,
                bump = %decision.bump,
                sources = ?decision.cascade_source,
                "Cascaded decision"
            );
        }

        finals.insert(id, decision);
    }

    Ok(finals)
}

/// Whether a dependency's bump reaches the dependent under `policy`.
fn contributes(
    dependent: &Package,
    dependency: &str,
    bump: BumpLevel,
    graph: &DependencyGraph,
    policy: CascadePolicy,
) -> Result<bool> {
    match policy {
        CascadePolicy::Always => Ok(true),
        CascadePolicy::Requirement => {
            let Some(requirement) = dependent.requirements.get(dependency) else {
                return Ok(true);
            };
            let req = semver::VersionReq::parse(requirement).map_err(|e| {
                Error::config(
                    format!(
                        "Package '{}' declares invalid requirement '{requirement}' on '{dependency}': {e}",
                        dependent.id
                    ),
                    "Use a semver requirement such as ^1.2 or >=0.3, <0.5",
                )
            })?;
            let current = graph
                .package(dependency)
                .map(|p| p.current_version.clone())
                .ok_or_else(|| Error::package_not_found(dependency))?;
            let next = current.next(bump);
            Ok(!req.matches(&next.to_semver()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn pkg(id: &str, deps: Vec<&str>) -> Package {
        Package::new(id, Version::new(0, 1, 0)).with_dependencies(deps)
    }

    fn primaries(levels: &[(&str, BumpLevel)]) -> BTreeMap<PackageId, VersionDecision> {
        levels
            .iter()
            .map(|(id, bump)| ((*id).to_string(), VersionDecision::primary(*id, *bump, Vec::new())))
            .collect()
    }

    #[test]
    fn test_single_dependency_cascade() {
        let graph = DependencyGraph::new(&[
            pkg("core", vec![]),
            pkg("orm", vec!["core"]),
            pkg("web", vec!["orm"]),
        ])
        .unwrap();
        let primary = primaries(&[("orm", BumpLevel::Minor)]);

        let finals = propagate(&primary, &graph, CascadePolicy::Always).unwrap();
        assert_eq!(finals["core"].bump, BumpLevel::None);
        assert_eq!(finals["orm"].bump, BumpLevel::Minor);
        assert!(!finals["orm"].is_cascaded);
        assert_eq!(finals["web"].bump, BumpLevel::Minor);
        assert!(finals["web"].is_cascaded);
        assert_eq!(finals["web"].sources(), ["orm".to_string()]);
    }

    #[test]
    fn test_transitive_cascade() {
        let graph = DependencyGraph::new(&[
            pkg("a", vec![]),
            pkg("b", vec!["a"]),
            pkg("c", vec!["b"]),
        ])
        .unwrap();
        let finals =
            propagate(&primaries(&[("a", BumpLevel::Patch)]), &graph, CascadePolicy::Always)
                .unwrap();
        assert_eq!(finals["c"].bump, BumpLevel::Patch);
        assert_eq!(finals["c"].sources(), ["b".to_string()]);
    }

    #[test]
    fn test_mixed_priority_takes_maximum() {
        let graph = DependencyGraph::new(&[
            pkg("db", vec![]),
            pkg("rest", vec![]),
            pkg("web", vec!["db", "rest"]),
        ])
        .unwrap();
        let primary = primaries(&[("db", BumpLevel::Minor), ("rest", BumpLevel::Patch)]);
        let finals = propagate(&primary, &graph, CascadePolicy::Always).unwrap();
        assert_eq!(finals["web"].bump, BumpLevel::Minor);
        assert_eq!(
            finals["web"].sources(),
            ["db".to_string(), "rest".to_string()]
        );
    }

    #[test]
    fn test_own_change_higher_than_cascade() {
        let graph = DependencyGraph::new(&[pkg("core", vec![]), pkg("app", vec!["core"])]).unwrap();
        let primary = primaries(&[("core", BumpLevel::Patch), ("app", BumpLevel::Major)]);
        let finals = propagate(&primary, &graph, CascadePolicy::Always).unwrap();
        assert_eq!(finals["app"].bump, BumpLevel::Major);
        assert!(finals["app"].is_cascaded);
        assert_eq!(finals["app"].sources(), ["core".to_string()]);
    }

    #[test]
    fn test_requirement_policy_skips_satisfied_edges() {
        let core = Package::new("core", Version::new(1, 2, 0));
        let app = Package::new("app", Version::new(1, 0, 0)).with_requirement("core", "^1.2");
        let cli = Package::new("cli", Version::new(1, 0, 0)).with_requirement("core", "~1.2");
        let tool = Package::new("tool", Version::new(1, 0, 0)).with_dependencies(["core"]);
        let graph = DependencyGraph::new(&[core, app, cli, tool]).unwrap();

        let primary = primaries(&[("core", BumpLevel::Minor)]);
        let finals = propagate(&primary, &graph, CascadePolicy::Requirement).unwrap();
        // 1.3.0 still matches ^1.2
        assert_eq!(finals["app"].bump, BumpLevel::None);
        assert!(!finals["app"].is_cascaded);
        // 1.3.0 no longer matches ~1.2
        assert_eq!(finals["cli"].bump, BumpLevel::Minor);
        // no declared requirement behaves like Always
        assert_eq!(finals["tool"].bump, BumpLevel::Minor);
    }

    #[test]
    fn test_requirement_policy_invalid_requirement() {
        let core = Package::new("core", Version::new(1, 2, 0));
        let app = Package::new("app", Version::new(1, 0, 0)).with_requirement("core", "not a req");
        let graph = DependencyGraph::new(&[core, app]).unwrap();
        let err = propagate(
            &primaries(&[("core", BumpLevel::Patch)]),
            &graph,
            CascadePolicy::Requirement,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_no_changes_no_cascade() {
        let graph = DependencyGraph::new(&[pkg("a", vec![]), pkg("b", vec!["a"])]).unwrap();
        let finals = propagate(&BTreeMap::new(), &graph, CascadePolicy::Always).unwrap();
        assert!(finals.values().all(|d| !d.is_release()));
        assert_eq!(finals.len(), 2);
    }
}
