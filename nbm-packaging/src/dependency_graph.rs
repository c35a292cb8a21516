// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Module dependency graphs.

A [DependencyGraph] holds the modules of a build or installation, keyed by code
name base. It can report modules whose dependencies cannot be satisfied and
compute an order in which modules can be built.

A module is *inconsistent* if one of its runtime dependencies is missing or
unsatisfied, a token it requires is not provided, or a module it depends on is
itself inconsistent.
*/

use {
    crate::{
        dependency::{DependencyDeclaration, DependencyMismatch, ReleaseRange},
        error::{NbmError, Result},
        manifest::{
            ModuleManifest, BUNDLE_VERSION, OPENIDE_MODULE_IMPLEMENTATION_VERSION,
            OPENIDE_MODULE_MODULE_DEPENDENCIES, OPENIDE_MODULE_NEEDS, OPENIDE_MODULE_PROVIDES,
            OPENIDE_MODULE_REQUIRES, OPENIDE_MODULE_SPECIFICATION_VERSION, REQUIRE_BUNDLE,
        },
        module_identity::ModuleIdentity,
        spec_version::SpecificationVersion,
        update_tracking::TrackingDirectory,
    },
    log::{debug, warn},
    std::{
        collections::{BTreeMap, BTreeSet, VecDeque},
        fmt::{Display, Formatter},
        path::Path,
    },
};

/// A module in a [DependencyGraph].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleNode {
    pub identity: ModuleIdentity,
    pub specification_version: Option<SpecificationVersion>,
    pub implementation_version: Option<String>,
    pub dependencies: Vec<DependencyDeclaration>,
    /// Tokens provided by this module.
    pub provides: Vec<String>,
    /// Tokens this module requires or needs.
    pub requires: Vec<String>,
    /// Whether the module is an OSGi bundle.
    pub osgi: bool,
    /// Specification version recorded as installed by an update tracking ledger.
    pub installed: Option<SpecificationVersion>,
}

impl ModuleNode {
    /// Construct a node from a module manifest.
    pub fn from_manifest(manifest: &ModuleManifest) -> Result<Self> {
        let identity = ModuleIdentity::from_manifest(manifest)?;
        let osgi = manifest.is_osgi();

        let specification_version = if osgi {
            manifest
                .attribute(BUNDLE_VERSION)
                .map(SpecificationVersion::parse_osgi)
                .transpose()?
        } else {
            manifest
                .attribute(OPENIDE_MODULE_SPECIFICATION_VERSION)
                .map(SpecificationVersion::parse)
                .transpose()?
        };

        let mut dependencies = manifest
            .attribute(OPENIDE_MODULE_MODULE_DEPENDENCIES)
            .map(DependencyDeclaration::parse_manifest_list)
            .transpose()?
            .unwrap_or_default();

        if osgi {
            if let Some(value) = manifest.attribute(REQUIRE_BUNDLE) {
                dependencies.extend(DependencyDeclaration::parse_require_bundle(value)?);
            }
        }

        let requires = manifest
            .attribute_list(OPENIDE_MODULE_REQUIRES)
            .into_iter()
            .chain(manifest.attribute_list(OPENIDE_MODULE_NEEDS))
            .map(|s| s.to_string())
            .collect();

        Ok(Self {
            identity,
            specification_version,
            implementation_version: manifest
                .attribute(OPENIDE_MODULE_IMPLEMENTATION_VERSION)
                .map(|s| s.to_string()),
            dependencies,
            provides: manifest
                .attribute_list(OPENIDE_MODULE_PROVIDES)
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
            requires,
            osgi,
            installed: None,
        })
    }

    pub fn code_name_base(&self) -> &str {
        self.identity.code_name_base()
    }

    /// The specification version dependencies are checked against.
    ///
    /// An installed version takes precedence over the declared one.
    pub fn effective_specification_version(&self) -> Option<&SpecificationVersion> {
        self.installed
            .as_ref()
            .or(self.specification_version.as_ref())
    }

    /// Whether this module provides a token. Every module provides its code name base.
    pub fn provides_token(&self, token: &str) -> bool {
        self.code_name_base() == token || self.provides.iter().any(|p| p == token)
    }
}

/// Why a module is inconsistent.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ConsistencyProblem {
    /// No module with the dependency's code name base exists.
    MissingDependency { dependency: String },
    /// The target's specification version is older than required.
    VersionTooLow {
        dependency: String,
        wanted: SpecificationVersion,
        found: Option<SpecificationVersion>,
    },
    /// The target's release version is outside the required range.
    ReleaseMismatch {
        dependency: String,
        wanted: Option<ReleaseRange>,
        found: Option<u32>,
    },
    /// The target's implementation version does not match.
    ImplementationMismatch {
        dependency: String,
        wanted: Option<String>,
        found: Option<String>,
    },
    /// No module or environment provides a required token.
    MissingToken { token: String },
    /// A module this module depends on is inconsistent.
    Propagated { dependency: String },
}

impl ConsistencyProblem {
    fn from_mismatch(dependency: &DependencyDeclaration, mismatch: DependencyMismatch) -> Self {
        let dependency = dependency.to_string();

        match mismatch {
            DependencyMismatch::Release { wanted, found } => Self::ReleaseMismatch {
                dependency,
                wanted,
                found,
            },
            DependencyMismatch::SpecificationTooLow { wanted, found } => Self::VersionTooLow {
                dependency,
                wanted,
                found,
            },
            DependencyMismatch::Implementation { wanted, found } => {
                Self::ImplementationMismatch {
                    dependency,
                    wanted,
                    found,
                }
            }
        }
    }
}

fn or_none<T: Display>(v: &Option<T>) -> String {
    v.as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl Display for ConsistencyProblem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDependency { dependency } => {
                write!(f, "missing dependency: {}", dependency)
            }
            Self::VersionTooLow {
                dependency, found, ..
            } => write!(
                f,
                "dependency {} not satisfied; found specification version {}",
                dependency,
                or_none(found)
            ),
            Self::ReleaseMismatch {
                dependency, found, ..
            } => write!(
                f,
                "dependency {} not satisfied; found release version {}",
                dependency,
                or_none(found)
            ),
            Self::ImplementationMismatch {
                dependency, found, ..
            } => write!(
                f,
                "dependency {} not satisfied; found implementation version {}",
                dependency,
                or_none(found)
            ),
            Self::MissingToken { token } => write!(f, "no module provides {}", token),
            Self::Propagated { dependency } => {
                write!(f, "dependency {} is itself inconsistent", dependency)
            }
        }
    }
}

/// Sort nodes so every node comes before the nodes its edges point to.
///
/// `edges[a]` lists the nodes that must come after `a`. Input order is kept as far
/// as the edges allow. Edge targets not in `nodes` constrain the order but are not
/// part of the result.
pub fn topological_sort<T>(nodes: &[T], edges: &BTreeMap<T, Vec<T>>) -> Result<Vec<T>>
where
    T: Clone + Display + Ord,
{
    #[derive(Clone, Copy, Eq, PartialEq)]
    enum State {
        Visiting,
        Done,
    }

    let mut states = BTreeMap::new();
    let mut output = Vec::with_capacity(nodes.len());

    for root in nodes.iter().rev() {
        if states.contains_key(root) {
            continue;
        }

        // Nodes being visited with the index of their next edge to follow.
        states.insert(root.clone(), State::Visiting);
        let mut stack = vec![(root.clone(), 0usize)];

        while let Some((node, index)) = stack.last_mut() {
            let next = edges.get(node).and_then(|e| e.get(*index)).cloned();

            match next {
                Some(next) => {
                    *index += 1;

                    match states.get(&next) {
                        Some(State::Done) => {}
                        Some(State::Visiting) => {
                            let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);

                            return Err(NbmError::CycleDetected(
                                stack[start..].iter().map(|(n, _)| n.to_string()).collect(),
                            ));
                        }
                        None => {
                            states.insert(next.clone(), State::Visiting);
                            stack.push((next, 0));
                        }
                    }
                }
                None => {
                    let node = node.clone();
                    stack.pop();
                    states.insert(node.clone(), State::Done);
                    output.push(node);
                }
            }
        }
    }

    let wanted = nodes.iter().collect::<BTreeSet<_>>();
    output.reverse();
    output.retain(|n| wanted.contains(n));

    Ok(output)
}

/// A set of modules and their dependencies.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    modules: BTreeMap<String, ModuleNode>,
    environment_tokens: BTreeSet<String>,
}

impl DependencyGraph {
    /// Build a graph from module manifests.
    pub fn build<'a>(manifests: impl IntoIterator<Item = &'a ModuleManifest>) -> Result<Self> {
        let mut graph = Self::default();

        for manifest in manifests {
            graph.add_module(ModuleNode::from_manifest(manifest)?);
        }

        Ok(graph)
    }

    /// Build a graph from the `*.MF` files of a directory.
    pub fn from_manifest_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = vec![];

        for entry in
            std::fs::read_dir(dir).map_err(|e| NbmError::IoPath(dir.display().to_string(), e))?
        {
            let path = entry?.path();
            if path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("mf"))
                .unwrap_or(false)
            {
                paths.push(path);
            }
        }
        paths.sort();

        let mut graph = Self::default();
        for path in paths {
            debug!("reading manifest {}", path.display());
            graph.add_module(ModuleNode::from_manifest(&ModuleManifest::from_path(&path)?)?);
        }

        Ok(graph)
    }

    /// Add a module. A module with the same code name base is replaced.
    pub fn add_module(&mut self, node: ModuleNode) {
        let cnb = node.code_name_base().to_string();

        if self.modules.insert(cnb.clone(), node).is_some() {
            warn!("{} declared more than once; last declaration wins", cnb);
        }
    }

    /// Declare a token as provided by the runtime environment.
    pub fn add_environment_token(&mut self, token: impl ToString) {
        self.environment_tokens.insert(token.to_string());
    }

    pub fn module(&self, code_name_base: &str) -> Option<&ModuleNode> {
        self.modules.get(code_name_base)
    }

    /// Iterate over modules in code name base order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    /// Record installed versions from update tracking ledgers.
    pub fn attach_tracking(&mut self, tracking: &TrackingDirectory) {
        for (cnb, node) in self.modules.iter_mut() {
            node.installed = tracking
                .get(cnb)
                .and_then(|t| t.current())
                .map(|r| r.specification_version.clone());
        }
    }

    fn token_provided(&self, token: &str) -> bool {
        self.environment_tokens.contains(token)
            || self.modules.values().any(|m| m.provides_token(token))
    }

    fn direct_problems(&self, node: &ModuleNode) -> BTreeSet<ConsistencyProblem> {
        let mut problems = BTreeSet::new();

        for dependency in node.dependencies.iter().filter(|d| d.kinds.run) {
            match self.modules.get(&dependency.code_name_base) {
                Some(target) => {
                    if let Err(mismatch) = dependency.check(
                        &target.identity,
                        target.effective_specification_version(),
                        target.implementation_version.as_deref(),
                    ) {
                        problems.insert(ConsistencyProblem::from_mismatch(dependency, mismatch));
                    }
                }
                None => {
                    problems.insert(ConsistencyProblem::MissingDependency {
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        for token in &node.requires {
            if !self.token_provided(token) {
                problems.insert(ConsistencyProblem::MissingToken {
                    token: token.clone(),
                });
            }
        }

        problems
    }

    /// Compute the problems of every inconsistent module.
    ///
    /// Modules without problems are absent from the result.
    pub fn problems(&self) -> BTreeMap<String, BTreeSet<ConsistencyProblem>> {
        let mut problems = BTreeMap::new();

        for (cnb, node) in &self.modules {
            let direct = self.direct_problems(node);
            if !direct.is_empty() {
                problems.insert(cnb.clone(), direct);
            }
        }

        // Modules depending on a given module at runtime.
        let mut reverse: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (cnb, node) in &self.modules {
            for dependency in node.dependencies.iter().filter(|d| d.kinds.run) {
                if self.modules.contains_key(&dependency.code_name_base) {
                    reverse
                        .entry(dependency.code_name_base.as_str())
                        .or_default()
                        .insert(cnb.as_str());
                }
            }
        }

        // Each entry is a broken module and the module its failure started at.
        let mut broken = problems.keys().cloned().collect::<BTreeSet<_>>();
        let mut queue = broken
            .iter()
            .map(|cnb| (cnb.clone(), cnb.clone()))
            .collect::<VecDeque<_>>();

        while let Some((cnb, origin)) = queue.pop_front() {
            for dependent in reverse.get(cnb.as_str()).into_iter().flatten() {
                if *dependent == origin {
                    continue;
                }

                problems
                    .entry(dependent.to_string())
                    .or_insert_with(BTreeSet::new)
                    .insert(ConsistencyProblem::Propagated {
                        dependency: cnb.clone(),
                    });

                if broken.insert(dependent.to_string()) {
                    queue.push_back((dependent.to_string(), origin.clone()));
                }
            }
        }

        problems
    }

    /// Compute problems of inconsistent modules as human readable messages.
    pub fn find_inconsistencies(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.problems()
            .into_iter()
            .map(|(cnb, problems)| (cnb, problems.iter().map(|p| p.to_string()).collect()))
            .collect()
    }

    /// Code name bases ordered so every module comes after its dependencies.
    ///
    /// Dependencies on modules outside the graph are ignored.
    pub fn build_order(&self) -> Result<Vec<String>> {
        let nodes = self.modules.keys().cloned().collect::<Vec<_>>();
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (cnb, node) in &self.modules {
            for dependency in &node.dependencies {
                if self.modules.contains_key(&dependency.code_name_base) {
                    edges
                        .entry(dependency.code_name_base.clone())
                        .or_default()
                        .push(cnb.clone());
                }
            }
        }

        topological_sort(&nodes, &edges)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::update_tracking::{LedgerPolicy, Origin},
    };

    fn manifest(cnb: &str, spec: &str, deps: &str) -> Result<ModuleManifest> {
        let mut s = format!(
            "OpenIDE-Module: {}\nOpenIDE-Module-Specification-Version: {}\n",
            cnb, spec
        );
        if !deps.is_empty() {
            s.push_str(&format!("OpenIDE-Module-Module-Dependencies: {}\n", deps));
        }

        ModuleManifest::parse_str(&s)
    }

    fn graph(manifests: &[(&str, &str, &str)]) -> Result<DependencyGraph> {
        let manifests = manifests
            .iter()
            .map(|(cnb, spec, deps)| manifest(cnb, spec, deps))
            .collect::<Result<Vec<_>>>()?;

        DependencyGraph::build(&manifests)
    }

    #[test]
    fn version_too_low() -> Result<()> {
        let g = graph(&[("a", "1.0", "b > 2.0"), ("b", "1.0", ""), ("c", "1.0", "")])?;

        let problems = g.problems();
        assert_eq!(problems.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(
            problems["a"].iter().next(),
            Some(&ConsistencyProblem::VersionTooLow {
                dependency: "b > 2.0".to_string(),
                wanted: SpecificationVersion::parse("2.0")?,
                found: Some(SpecificationVersion::parse("1.0")?),
            })
        );

        let messages = g.find_inconsistencies();
        assert_eq!(messages.len(), 1);
        assert!(messages["a"].iter().next().unwrap().contains("b > 2.0"));

        Ok(())
    }

    #[test]
    fn consistent_graph() -> Result<()> {
        let g = graph(&[("a", "1.0", "b > 1.0, c"), ("b", "1.1", ""), ("c", "1.0", "")])?;
        assert!(g.find_inconsistencies().is_empty());

        Ok(())
    }

    #[test]
    fn direct_problem_kinds() -> Result<()> {
        let mut manifests = vec![
            manifest("a", "1.0", "missing")?,
            manifest("b", "1.0", "c/1")?,
            manifest("c/2", "1.0", "")?,
            manifest("d", "1.0", "e = 20200101")?,
        ];
        manifests.push(ModuleManifest::parse_str(
            "OpenIDE-Module: e\nOpenIDE-Module-Implementation-Version: 20210101\n",
        )?);
        let g = DependencyGraph::build(&manifests)?;

        let problems = g.problems();
        assert!(matches!(
            problems["a"].iter().next(),
            Some(ConsistencyProblem::MissingDependency { .. })
        ));
        assert!(matches!(
            problems["b"].iter().next(),
            Some(ConsistencyProblem::ReleaseMismatch { found: Some(2), .. })
        ));
        assert!(matches!(
            problems["d"].iter().next(),
            Some(ConsistencyProblem::ImplementationMismatch { .. })
        ));
        assert!(!problems.contains_key("c"));
        assert!(!problems.contains_key("e"));

        Ok(())
    }

    #[test]
    fn release_required_when_target_has_one() -> Result<()> {
        let g = graph(&[("a", "1.0", "b"), ("b/1", "1.0", "")])?;
        assert!(matches!(
            g.problems()["a"].iter().next(),
            Some(ConsistencyProblem::ReleaseMismatch { wanted: None, .. })
        ));

        let g = graph(&[("a", "1.0", "b/1-2 > 1.0"), ("b/2", "1.0", "")])?;
        assert!(g.problems().is_empty());

        Ok(())
    }

    #[test]
    fn propagation() -> Result<()> {
        let g = graph(&[
            ("a", "1.0", "b > 2.0"),
            ("b", "1.0", ""),
            ("d", "1.0", "a"),
            ("e", "1.0", "d"),
            ("f", "1.0", "b"),
        ])?;

        let problems = g.problems();
        assert_eq!(
            problems.keys().collect::<Vec<_>>(),
            vec!["a", "d", "e"]
        );
        assert_eq!(
            problems["e"].iter().collect::<Vec<_>>(),
            vec![&ConsistencyProblem::Propagated {
                dependency: "d".to_string()
            }]
        );

        Ok(())
    }

    #[test]
    fn propagation_through_cycle_terminates() -> Result<()> {
        let g = graph(&[
            ("a", "1.0", "b, missing"),
            ("b", "1.0", "c"),
            ("c", "1.0", "a"),
        ])?;

        let problems = g.problems();
        assert_eq!(problems.len(), 3);

        // The failure started at a, so a only reports its own problem.
        assert_eq!(
            problems["a"].iter().collect::<Vec<_>>(),
            vec![&ConsistencyProblem::MissingDependency {
                dependency: "missing".to_string()
            }]
        );
        assert!(problems["c"].contains(&ConsistencyProblem::Propagated {
            dependency: "a".to_string()
        }));
        assert!(problems["b"].contains(&ConsistencyProblem::Propagated {
            dependency: "c".to_string()
        }));

        Ok(())
    }

    #[test]
    fn cycle_is_not_inconsistent() -> Result<()> {
        let g = graph(&[("a", "1.0", "b"), ("b", "1.0", "c"), ("c", "1.0", "a")])?;

        assert!(g.find_inconsistencies().is_empty());

        match g.build_order() {
            Err(NbmError::CycleDetected(members)) => {
                assert_eq!(
                    members.into_iter().collect::<BTreeSet<_>>(),
                    ["a", "b", "c"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<BTreeSet<_>>()
                );
            }
            res => panic!("expected cycle; got {:?}", res),
        }

        Ok(())
    }

    #[test]
    fn tokens() -> Result<()> {
        let manifests = vec![
            ModuleManifest::parse_str(
                "OpenIDE-Module: a\nOpenIDE-Module-Requires: org.example.Spi, org.openide.modules.os.Linux\n",
            )?,
            ModuleManifest::parse_str("OpenIDE-Module: b\nOpenIDE-Module-Needs: c\n")?,
            ModuleManifest::parse_str("OpenIDE-Module: c\n")?,
        ];
        let mut g = DependencyGraph::build(&manifests)?;

        let problems = g.problems();
        assert_eq!(problems.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(problems["a"].len(), 2);

        g.add_environment_token("org.openide.modules.os.Linux");
        g.add_module(ModuleNode::from_manifest(&ModuleManifest::parse_str(
            "OpenIDE-Module: spi.impl\nOpenIDE-Module-Provides: org.example.Spi\n",
        )?)?);
        assert!(g.problems().is_empty());

        Ok(())
    }

    #[test]
    fn osgi_bundles() -> Result<()> {
        let manifests = vec![
            ModuleManifest::parse_str(
                "Bundle-SymbolicName: org.osgi.a\nBundle-Version: 1.2.3.qualifier\nRequire-Bundle: org.osgi.b;bundle-version=\"2.0.0\"\n",
            )?,
            ModuleManifest::parse_str("Bundle-SymbolicName: org.osgi.b\nBundle-Version: 1.9.0\n")?,
        ];
        let g = DependencyGraph::build(&manifests)?;

        let a = g.module("org.osgi.a").unwrap();
        assert!(a.osgi);
        assert_eq!(a.specification_version.as_ref().unwrap().to_string(), "1.2.3");
        assert!(matches!(
            g.problems()["org.osgi.a"].iter().next(),
            Some(ConsistencyProblem::VersionTooLow { .. })
        ));

        Ok(())
    }

    #[test]
    fn bundle_requires_module_with_release() -> Result<()> {
        let manifests = vec![
            ModuleManifest::parse_str(
                "Bundle-SymbolicName: org.osgi.a\nBundle-Version: 1.0.0\nRequire-Bundle: org.openide.util;bundle-version=\"8.0\"\n",
            )?,
            ModuleManifest::parse_str(
                "OpenIDE-Module: org.openide.util/1\nOpenIDE-Module-Specification-Version: 9.0\n",
            )?,
        ];
        let mut g = DependencyGraph::build(&manifests)?;
        assert!(g.problems().is_empty());

        g.add_module(ModuleNode::from_manifest(&ModuleManifest::parse_str(
            "OpenIDE-Module: org.openide.util/1\nOpenIDE-Module-Specification-Version: 7.5\n",
        )?)?);
        assert!(matches!(
            g.problems()["org.osgi.a"].iter().next(),
            Some(ConsistencyProblem::VersionTooLow { .. })
        ));

        Ok(())
    }

    #[test]
    fn topological_sort_examples() -> Result<()> {
        let nodes = vec!["A", "B", "C"];

        assert_eq!(topological_sort(&nodes, &BTreeMap::new())?, vec!["A", "B", "C"]);

        let mut edges = BTreeMap::new();
        edges.insert("C", vec!["A"]);
        assert_eq!(topological_sort(&nodes, &edges)?, vec!["B", "C", "A"]);

        let mut edges = BTreeMap::new();
        edges.insert("A", vec!["X"]);
        edges.insert("X", vec!["B"]);
        let sorted = topological_sort(&["B", "A"], &edges)?;
        assert_eq!(sorted, vec!["A", "B"]);

        let mut edges = BTreeMap::new();
        edges.insert("A", vec!["A"]);
        assert!(matches!(
            topological_sort(&nodes, &edges),
            Err(NbmError::CycleDetected(members)) if members == vec!["A".to_string()]
        ));

        Ok(())
    }

    #[test]
    fn topological_sort_deep_chain() -> Result<()> {
        let nodes = (0..200_000u32).collect::<Vec<_>>();
        let edges = nodes
            .iter()
            .map(|n| (*n, vec![n + 1]))
            .collect::<BTreeMap<_, _>>();

        assert_eq!(topological_sort(&nodes, &edges)?, nodes);

        Ok(())
    }

    #[test]
    fn build_order_respects_dependencies() -> Result<()> {
        let g = graph(&[
            ("app", "1.0", "lib, util"),
            ("lib", "1.0", "util"),
            ("util", "1.0", ""),
            ("zzz", "1.0", "external"),
        ])?;

        let order = g.build_order()?;
        assert_eq!(order, vec!["util", "lib", "app", "zzz"]);
        assert_eq!(g.build_order()?, order);

        Ok(())
    }

    #[test]
    fn installed_versions() -> Result<()> {
        let g_manifests = vec![manifest("a", "1.0", "b > 2.0")?, manifest("b", "1.0", "")?];
        let mut g = DependencyGraph::build(&g_manifests)?;
        assert!(!g.problems().is_empty());

        let td = tempfile::TempDir::new()?;
        let mut tracking = TrackingDirectory::new(td.path(), LedgerPolicy::Strict);
        tracking.add_module_version(
            &ModuleIdentity::parse("b")?,
            SpecificationVersion::parse("2.1")?,
            Origin::Nbm,
        );

        g.attach_tracking(&tracking);
        assert_eq!(
            g.module("b").unwrap().installed,
            Some(SpecificationVersion::parse("2.1")?)
        );
        assert!(g.problems().is_empty());

        Ok(())
    }
}
