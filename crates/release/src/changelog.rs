//! Changelog generation and formatting.
//!
//! Sections are rendered from the same records that drove the version
//! decisions. Rendering is pure text; writing to disk goes through a
//! [`ChangelogSink`].

use crate::calculator::VersionDecision;
use crate::commit::{ChangeKind, ChangeRecord};
use crate::config::ChangelogConfig;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::package::{Package, PackageId};
use crate::version::Version;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

const CHANGELOG_HEADER: &str =
    "# Changelog\n\nAll notable changes to this project will be documented in this file.\n\n";

const CATEGORIES: [(ChangeKind, &str); 4] = [
    (ChangeKind::Breaking, "Breaking Changes"),
    (ChangeKind::Feature, "Features"),
    (ChangeKind::Fix, "Fixes"),
    (ChangeKind::Other, "Other"),
];

/// A rendered changelog section for one package release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogSection {
    /// Package released.
    pub package: PackageId,
    /// Version the section documents.
    pub version: Version,
    /// Release date.
    pub date: NaiveDate,
    /// Deterministic anchor, see [`anchor`].
    pub anchor: String,
    /// Bullets other sections may quote, in category order.
    pub highlights: Vec<String>,
    /// Full Markdown text, heading included.
    pub text: String,
}

/// Deterministic anchor for a version heading.
///
/// Alphanumerics of the version, a dash, then alphanumerics of the date:
/// `1.2.0` on 2024-01-05 gives `120-20240105`.
#[must_use]
pub fn anchor(version: &Version, date: NaiveDate) -> String {
    let keep = |s: String| s.chars().filter(char::is_ascii_alphanumeric).collect::<String>();
    format!(
        "{}-{}",
        keep(version.to_string()),
        keep(date.format("%Y-%m-%d").to_string())
    )
}

fn format_bullet(record: &ChangeRecord) -> String {
    if record.issue_refs.is_empty() {
        record.summary.clone()
    } else {
        let refs: Vec<&str> = record.issue_refs.iter().map(String::as_str).collect();
        format!("{} ({})", record.summary, refs.join(", "))
    }
}

/// Group records into `### Category` blocks. Returns the text and the
/// bullets in category order.
fn render_categories(records: &[&ChangeRecord]) -> (String, Vec<String>) {
    let mut output = String::new();
    let mut bullets = Vec::new();
    for (kind, title) in CATEGORIES {
        let items: Vec<String> = records
            .iter()
            .filter(|r| r.change_kind == kind)
            .map(|r| format_bullet(r))
            .collect();
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(output, "### {title}\n");
        for item in &items {
            let _ = writeln!(output, "- {item}");
        }
        output.push('\n');
        bullets.extend(items);
    }
    (output, bullets)
}

/// Generator for changelog sections.
#[derive(Debug, Clone)]
pub struct ChangelogGenerator {
    config: ChangelogConfig,
}

impl Default for ChangelogGenerator {
    fn default() -> Self {
        Self::new(ChangelogConfig::default())
    }
}

impl ChangelogGenerator {
    /// Create a new changelog generator with the given configuration.
    #[must_use]
    pub const fn new(config: ChangelogConfig) -> Self {
        Self { config }
    }

    /// Render the section of one package.
    ///
    /// `rendered` holds the sections of packages earlier in publish order;
    /// dependency update bullets quote up to three of their highlights.
    #[must_use]
    pub fn render(
        &self,
        package: &Package,
        decision: &VersionDecision,
        graph: &DependencyGraph,
        rendered: &BTreeMap<PackageId, ChangelogSection>,
        date: NaiveDate,
    ) -> ChangelogSection {
        let version = package.current_version.next(decision.bump);
        let anchor = anchor(&version, date);

        let mut text = String::new();
        let _ = writeln!(text, "<a id=\"{anchor}\"></a>");
        let _ = writeln!(text, "## [{version}] - {}\n", date.format("%Y-%m-%d"));

        let own: Vec<&ChangeRecord> = decision.triggering_records.iter().collect();
        let (categories, mut highlights) = render_categories(&own);
        text.push_str(&categories);

        if decision.is_cascaded && !decision.sources().is_empty() {
            text.push_str("### Dependency Updates\n\n");
            let limit = self.config.bullet_limit();
            for dep in decision.sources() {
                let line = graph.package(dep).map_or_else(
                    || dep.clone(),
                    |p| {
                        let new = rendered
                            .get(dep)
                            .map_or_else(|| p.current_version.clone(), |s| s.version.clone());
                        format!("{dep}: {} → {new}", p.current_version)
                    },
                );
                let _ = writeln!(text, "- {line}");
                if let Some(section) = rendered.get(dep) {
                    for bullet in section.highlights.iter().take(limit) {
                        let _ = writeln!(text, "  - {bullet}");
                    }
                }
                if own.is_empty() {
                    highlights.push(line);
                }
            }
            text.push('\n');
        } else if own.is_empty() {
            // Changed through its manifest alone.
            let line = "Manifest updated".to_string();
            let _ = writeln!(text, "### Other\n\n- {line}\n");
            highlights.push(line);
        }

        ChangelogSection {
            package: package.id.clone(),
            version,
            date,
            anchor,
            highlights,
            text,
        }
    }

    /// Render sections for every released package, in publish order.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is cyclic or a decision names an unknown package.
    pub fn render_all(
        &self,
        decisions: &BTreeMap<PackageId, VersionDecision>,
        graph: &DependencyGraph,
        date: NaiveDate,
    ) -> Result<BTreeMap<PackageId, ChangelogSection>> {
        let released: BTreeSet<PackageId> = decisions
            .values()
            .filter(|d| d.is_release())
            .map(|d| d.package.clone())
            .collect();

        let mut rendered = BTreeMap::new();
        for id in graph.topological_order(Some(&released))? {
            let package = graph
                .package(&id)
                .ok_or_else(|| Error::package_not_found(&id))?;
            let Some(decision) = decisions.get(&id) else {
                continue;
            };
            let section = self.render(package, decision, graph, &rendered, date);
            rendered.insert(id, section);
        }
        Ok(rendered)
    }

    /// Render the repository-wide log from unscoped, non-excluded records.
    ///
    /// Returns `None` when there is nothing to report.
    #[must_use]
    pub fn render_workspace(&self, records: &[ChangeRecord], date: NaiveDate) -> Option<String> {
        if !self.config.workspace {
            return None;
        }
        let unscoped: Vec<&ChangeRecord> = records
            .iter()
            .filter(|r| r.is_unscoped() && !r.excluded)
            .collect();
        if unscoped.is_empty() {
            return None;
        }
        let (categories, _) = render_categories(&unscoped);
        Some(format!("## {}\n\n{categories}", date.format("%Y-%m-%d")))
    }

    /// Changelog file path for a package.
    #[must_use]
    pub fn changelog_path(&self, package: &Package) -> PathBuf {
        package.directory().join(&self.config.path)
    }
}

/// Destination for rendered changelog text.
pub trait ChangelogSink {
    /// Write a package's section.
    ///
    /// # Errors
    ///
    /// Returns a changelog error if the section cannot be written.
    fn write_section(&self, package: &Package, section: &ChangelogSection) -> Result<()>;

    /// Write the repository-wide log.
    ///
    /// # Errors
    ///
    /// Returns a changelog error if the log cannot be written.
    fn write_workspace(&self, text: &str) -> Result<()>;
}

/// Writes `CHANGELOG.md` files next to each package and at the workspace root.
#[derive(Debug, Clone)]
pub struct FileChangelogSink {
    root: PathBuf,
    config: ChangelogConfig,
}

impl FileChangelogSink {
    /// Create a sink for the workspace at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: ChangelogConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Insert `entry` after the file header, newest first.
    ///
    /// Entries whose anchor is already present are skipped, so re-applying a
    /// plan does not duplicate sections.
    fn prepend(path: &Path, entry: &str, anchor: Option<&str>) -> Result<()> {
        let existing = if path.exists() {
            fs::read_to_string(path).map_err(|e| {
                Error::changelog_with_source(
                    format!("Failed to read changelog: {}", path.display()),
                    Some(path.to_path_buf()),
                    e,
                )
            })?
        } else {
            CHANGELOG_HEADER.to_string()
        };

        if let Some(anchor) = anchor
            && existing.contains(&format!("id=\"{anchor}\""))
        {
            tracing::debug!(path = %path.display(), anchor, "Changelog already has section");
            return Ok(());
        }

        let first_entry = [existing.find("\n<a id="), existing.find("\n## ")]
            .into_iter()
            .flatten()
            .min();
        let content = first_entry.map_or_else(
            || format!("{}\n\n{}", existing.trim_end(), entry.trim_end()) + "\n",
            |idx| format!("{}\n{}\n{}", &existing[..idx], entry.trim_end(), &existing[idx..]),
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::changelog_with_source(
                    format!("Failed to create directory: {}", parent.display()),
                    Some(parent.to_path_buf()),
                    e,
                )
            })?;
        }

        fs::write(path, content).map_err(|e| {
            Error::changelog_with_source(
                format!("Failed to write changelog: {}", path.display()),
                Some(path.to_path_buf()),
                e,
            )
        })
    }
}

impl ChangelogSink for FileChangelogSink {
    fn write_section(&self, package: &Package, section: &ChangelogSection) -> Result<()> {
        if !self.config.per_package {
            return Ok(());
        }
        let path = package.directory().join(&self.config.path);
        Self::prepend(&path, &section.text, Some(&section.anchor))?;
        tracing::info!(package = %package.id, path = %path.display(), "Updated changelog");
        Ok(())
    }

    fn write_workspace(&self, text: &str) -> Result<()> {
        if !self.config.workspace {
            return Ok(());
        }
        let path = self.root.join(&self.config.path);
        Self::prepend(&path, text, None)?;
        tracing::info!(path = %path.display(), "Updated workspace changelog");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::classify;
    use crate::version::BumpLevel;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
    }

    fn record(message: &str) -> ChangeRecord {
        classify(message).unwrap()
    }

    #[test]
    fn test_anchor() {
        assert_eq!(anchor(&Version::new(1, 2, 0), date()), "120-20240105");
        assert_eq!(
            anchor(&Version::new(0, 1, 0).with_pre_release("alpha", 3), date()),
            "010alpha3-20240105"
        );
    }

    #[test]
    fn test_render_categories_in_order() {
        let graph = DependencyGraph::new(&[Package::new("orm", Version::new(1, 0, 0))]).unwrap();
        let package = graph.package("orm").unwrap().clone();
        let decision = VersionDecision::primary(
            "orm",
            BumpLevel::Major,
            vec![
                record("fix(orm): null handling (#4)"),
                record("chore(orm): bump deps"),
                record("feat(orm)!: new query api\n\nRefs #9"),
                record("feat(orm): joins"),
            ],
        );

        let section = ChangelogGenerator::default().render(
            &package,
            &decision,
            &graph,
            &BTreeMap::new(),
            date(),
        );
        assert_eq!(section.version, Version::new(2, 0, 0));
        assert_eq!(section.anchor, "200-20240105");
        assert!(section.text.contains("## [2.0.0] - 2024-01-05"));

        let breaking = section.text.find("### Breaking Changes").unwrap();
        let features = section.text.find("### Features").unwrap();
        let fixes = section.text.find("### Fixes").unwrap();
        let other = section.text.find("### Other").unwrap();
        assert!(breaking < features && features < fixes && fixes < other);
        assert!(section.text.contains("- new query api (#9)"));
        assert!(section.text.contains("- null handling (#4)"));
        assert!(!section.text.contains("Dependency Updates"));
        assert_eq!(section.highlights[0], "new query api (#9)");
    }

    #[test]
    fn test_render_all_cascaded_section() {
        let graph = DependencyGraph::new(&[
            Package::new("orm", Version::new(0, 1, 0)),
            Package::new("web", Version::new(0, 1, 0)).with_dependencies(["orm"]),
        ])
        .unwrap();
        let mut decisions = BTreeMap::new();
        decisions.insert(
            "orm".to_string(),
            VersionDecision::primary(
                "orm",
                BumpLevel::Minor,
                vec![
                    record("feat(orm): a"),
                    record("feat(orm): b"),
                    record("fix(orm): c"),
                    record("fix(orm): d"),
                ],
            ),
        );
        decisions.insert(
            "web".to_string(),
            VersionDecision {
                package: "web".to_string(),
                bump: BumpLevel::Minor,
                triggering_records: Vec::new(),
                is_cascaded: true,
                cascade_source: Some(vec!["orm".to_string()]),
            },
        );

        let sections = ChangelogGenerator::default()
            .render_all(&decisions, &graph, date())
            .unwrap();
        let web = &sections["web"];
        assert!(web.text.contains("### Dependency Updates"));
        assert!(web.text.contains("- orm: 0.1.0 → 0.2.0"));
        assert!(web.text.contains("  - a\n  - b\n  - c\n"));
        assert!(!web.text.contains("  - d"));
        assert!(!web.text.contains("### Features"));
        assert_eq!(web.highlights, vec!["orm: 0.1.0 → 0.2.0"]);
    }

    #[test]
    fn test_representative_bullet_limit() {
        let config = ChangelogConfig {
            representative_bullets: 1,
            ..Default::default()
        };
        let graph = DependencyGraph::new(&[
            Package::new("orm", Version::new(0, 1, 0)),
            Package::new("web", Version::new(0, 1, 0)).with_dependencies(["orm"]),
        ])
        .unwrap();
        let mut decisions = BTreeMap::new();
        decisions.insert(
            "orm".to_string(),
            VersionDecision::primary(
                "orm",
                BumpLevel::Patch,
                vec![record("fix(orm): a"), record("fix(orm): b")],
            ),
        );
        decisions.insert(
            "web".to_string(),
            VersionDecision {
                package: "web".to_string(),
                bump: BumpLevel::Minor,
                triggering_records: vec![record("feat(web): own")],
                is_cascaded: true,
                cascade_source: Some(vec!["orm".to_string()]),
            },
        );
        let sections = ChangelogGenerator::new(config)
            .render_all(&decisions, &graph, date())
            .unwrap();
        let web = &sections["web"];
        assert!(web.text.contains("### Features\n\n- own"));
        assert!(web.text.contains("- orm: 0.1.0 → 0.1.1\n  - a\n\n"));
    }

    #[test]
    fn test_manifest_only_section() {
        let graph = DependencyGraph::new(&[Package::new("core", Version::new(1, 0, 0))]).unwrap();
        let decision = VersionDecision::primary("core", BumpLevel::Patch, Vec::new());
        let section = ChangelogGenerator::default().render(
            graph.package("core").unwrap(),
            &decision,
            &graph,
            &BTreeMap::new(),
            date(),
        );
        assert!(section.text.contains("### Other\n\n- Manifest updated"));
    }

    #[test]
    fn test_render_workspace() {
        let generator = ChangelogGenerator::default();
        let records = vec![
            record("docs: contributing guide"),
            record("feat(core): scoped"),
            record("ci: cache deps"),
            record("Merge branch 'main'"),
        ];
        let text = generator.render_workspace(&records, date()).unwrap();
        assert!(text.starts_with("## 2024-01-05"));
        assert!(text.contains("- contributing guide"));
        assert!(text.contains("- cache deps"));
        assert!(!text.contains("scoped"));
        assert!(!text.contains("Merge"));

        assert!(generator.render_workspace(&records[1..2], date()).is_none());
    }

    #[test]
    fn test_sink_creates_and_prepends() {
        let temp = TempDir::new().unwrap();
        let package = Package::new("orm", Version::new(0, 1, 0))
            .with_manifest(temp.path().join("orm/pkg.toml"));
        let graph = DependencyGraph::new(std::slice::from_ref(&package)).unwrap();
        let generator = ChangelogGenerator::default();
        let sink = FileChangelogSink::new(temp.path(), ChangelogConfig::default());

        let first = generator.render(
            &package,
            &VersionDecision::primary("orm", BumpLevel::Minor, vec![record("feat(orm): one")]),
            &graph,
            &BTreeMap::new(),
            date(),
        );
        sink.write_section(&package, &first).unwrap();

        let bumped = Package::new("orm", Version::new(0, 2, 0))
            .with_manifest(temp.path().join("orm/pkg.toml"));
        let second = generator.render(
            &bumped,
            &VersionDecision::primary("orm", BumpLevel::Patch, vec![record("fix(orm): two")]),
            &graph,
            &BTreeMap::new(),
            date(),
        );
        sink.write_section(&bumped, &second).unwrap();
        // re-applying is a no-op
        sink.write_section(&bumped, &second).unwrap();

        let path = generator.changelog_path(&package);
        let content = fs::read_to_string(path).unwrap();
        assert!(content.starts_with("# Changelog"));
        let newer = content.find("## [0.2.1]").unwrap();
        let older = content.find("## [0.2.0]").unwrap();
        assert!(newer < older);
        assert_eq!(content.matches("## [0.2.1]").count(), 1);
    }

    #[test]
    fn test_sink_workspace_log() {
        let temp = TempDir::new().unwrap();
        let sink = FileChangelogSink::new(temp.path(), ChangelogConfig::default());
        sink.write_workspace("## 2024-01-05\n\n### Other\n\n- docs\n").unwrap();
        let content = fs::read_to_string(temp.path().join("CHANGELOG.md")).unwrap();
        assert!(content.contains("# Changelog"));
        assert!(content.contains("- docs"));
    }
}
