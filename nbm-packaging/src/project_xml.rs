// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Module project descriptors (`nbproject/project.xml`).

The interesting part of a descriptor is the `<module-dependencies>` element:

```xml
<dependency>
    <code-name-base>org.example.api</code-name-base>
    <build-prerequisite/>
    <compile-dependency/>
    <run-dependency>
        <release-version>1</release-version>
        <specification-version>1.2</specification-version>
    </run-dependency>
</dependency>
```

Edits only touch the dependency elements being changed. The rest of the document,
including whitespace and comments, is written back as it was read.
*/

use {
    crate::{
        dependency::{DependencyDeclaration, DependencyKinds, ReleaseRange, VersionRequirement},
        error::{NbmError, Result},
        io::{read_path, write_with_backup},
        rewriter::DependencyEdit,
        spec_version::SpecificationVersion,
        xml_tree::{XmlDocument, XmlElement, XmlNode},
    },
    log::debug,
    std::path::Path,
};

/// Children of `<data>` that precede `<module-dependencies>`.
const DATA_ORDER: &[&str] = &[
    "module-type",
    "code-name-base",
    "suite-component",
    "standalone",
    "module-dependencies",
];

/// Schema order of `<dependency>` children.
const DEPENDENCY_ORDER: &[&str] = &[
    "code-name-base",
    "build-prerequisite",
    "compile-dependency",
    "run-dependency",
];

/// Schema order of `<run-dependency>` children.
const RUN_DEPENDENCY_ORDER: &[&str] = &[
    "release-version",
    "specification-version",
    "implementation-version",
];

const DEFAULT_INDENT: &str = "    ";

fn depth_of(element: &XmlElement, local_name: &str, depth: usize) -> Option<usize> {
    if element.local_name() == local_name {
        Some(depth)
    } else {
        element
            .child_elements()
            .find_map(|e| depth_of(e, local_name, depth + 1))
    }
}

/// Insert `child` after the last sibling preceding it in `order`.
///
/// Without such a sibling the child becomes the first element. Indentation is
/// copied from existing children, falling back to `child_indent`.
fn insert_ordered(
    parent: &mut XmlElement,
    child: XmlElement,
    order: &[&str],
    child_indent: &str,
    closing_indent: &str,
) {
    let rank = |name: &str| order.iter().position(|n| *n == name);
    let new_rank = rank(child.local_name()).unwrap_or(order.len());

    let mut after = None;
    let mut first = None;

    for (i, node) in parent.children.iter().enumerate() {
        if let XmlNode::Element(e) = node {
            first.get_or_insert(i);

            if matches!(rank(e.local_name()), Some(r) if r <= new_rank) {
                after = Some(i);
            }
        }
    }

    let indent = parent
        .child_indent()
        .unwrap_or_else(|| child_indent.to_string());

    match (after, first) {
        (Some(i), _) => parent.insert_element_after(i, child, &indent),
        (None, Some(i)) => parent.insert_element_before(i, child, &indent),
        (None, None) => parent.append_element(child, &indent, closing_indent),
    }
}

fn remove_all(parent: &mut XmlElement, local_name: &str) {
    while parent.remove_child(local_name).is_some() {}
}

/// Indentation of the children of elements at a given depth.
struct Indenter<'a> {
    unit: &'a str,
}

impl<'a> Indenter<'a> {
    fn at(&self, depth: usize) -> String {
        format!("\n{}", self.unit.repeat(depth))
    }

    fn sync_marker(
        &self,
        parent: &mut XmlElement,
        depth: usize,
        local_name: &str,
        present: bool,
        order: &[&str],
    ) {
        if !present {
            remove_all(parent, local_name);
        } else if parent.find_child(local_name).is_none() {
            let child = parent.new_child(local_name);
            insert_ordered(parent, child, order, &self.at(depth + 1), &self.at(depth));
        }
    }

    fn sync_text(
        &self,
        parent: &mut XmlElement,
        depth: usize,
        local_name: &str,
        value: Option<&str>,
        order: &[&str],
    ) {
        match value {
            None => remove_all(parent, local_name),
            Some(value) => {
                if let Some(existing) = parent.find_child_mut(local_name) {
                    if existing.text().as_deref() != Some(value) {
                        existing.set_text(value);
                    }
                } else {
                    let child = parent.new_child(local_name).with_text(value);
                    insert_ordered(parent, child, order, &self.at(depth + 1), &self.at(depth));
                }
            }
        }
    }

    /// Make a `<dependency>` element at `depth` express a declaration.
    fn write_declaration(
        &self,
        dependency: &mut XmlElement,
        depth: usize,
        declaration: &DependencyDeclaration,
    ) -> Result<()> {
        let kinds = &declaration.kinds;

        self.sync_marker(
            dependency,
            depth,
            "build-prerequisite",
            kinds.build_prerequisite,
            DEPENDENCY_ORDER,
        );
        self.sync_marker(
            dependency,
            depth,
            "compile-dependency",
            kinds.compile,
            DEPENDENCY_ORDER,
        );
        self.sync_marker(dependency, depth, "run-dependency", kinds.run, DEPENDENCY_ORDER);

        if !kinds.run {
            return Ok(());
        }

        let run = dependency.find_child_mut("run-dependency").ok_or_else(|| {
            NbmError::MalformedDescriptor("run-dependency element vanished".to_string())
        })?;
        let depth = depth + 1;

        let release = declaration.release.map(|r| r.to_string());
        self.sync_text(
            run,
            depth,
            "release-version",
            release.as_deref(),
            RUN_DEPENDENCY_ORDER,
        );

        match &declaration.requirement {
            VersionRequirement::Any => {
                remove_all(run, "specification-version");
                remove_all(run, "implementation-version");
            }
            VersionRequirement::Specification(version) => {
                remove_all(run, "implementation-version");
                self.sync_text(
                    run,
                    depth,
                    "specification-version",
                    Some(&version.to_string()),
                    RUN_DEPENDENCY_ORDER,
                );
            }
            VersionRequirement::Implementation(version) => {
                remove_all(run, "specification-version");
                match version {
                    Some(version) => self.sync_text(
                        run,
                        depth,
                        "implementation-version",
                        Some(version),
                        RUN_DEPENDENCY_ORDER,
                    ),
                    None => self.sync_marker(
                        run,
                        depth,
                        "implementation-version",
                        true,
                        RUN_DEPENDENCY_ORDER,
                    ),
                }
            }
        }

        Ok(())
    }
}

fn dependency_code_name_base(element: &XmlElement) -> Option<String> {
    element.find_child("code-name-base").and_then(|e| e.text())
}

fn parse_dependency(element: &XmlElement) -> Result<DependencyDeclaration> {
    let code_name_base = dependency_code_name_base(element).ok_or_else(|| {
        NbmError::MalformedDescriptor("dependency without code-name-base".to_string())
    })?;

    let run = element.find_child("run-dependency");

    let kinds = DependencyKinds {
        build_prerequisite: element.find_child("build-prerequisite").is_some(),
        compile: element.find_child("compile-dependency").is_some(),
        run: run.is_some(),
    };

    let (release, requirement) = if let Some(run) = run {
        let release = run
            .find_child("release-version")
            .and_then(|e| e.text())
            .map(|s| ReleaseRange::parse(&s))
            .transpose()?;

        let requirement = match (
            run.find_child("specification-version"),
            run.find_child("implementation-version"),
        ) {
            (Some(_), Some(_)) => {
                return Err(NbmError::MalformedDescriptor(format!(
                    "dependency on {} declares both specification and implementation versions",
                    code_name_base
                )));
            }
            (Some(spec), None) => {
                let text = spec.text().ok_or_else(|| {
                    NbmError::MalformedDescriptor(format!(
                        "empty specification-version in dependency on {}",
                        code_name_base
                    ))
                })?;
                VersionRequirement::Specification(SpecificationVersion::parse(&text)?)
            }
            (None, Some(implementation)) => {
                VersionRequirement::Implementation(implementation.text())
            }
            (None, None) => VersionRequirement::Any,
        };

        (release, requirement)
    } else {
        (None, VersionRequirement::Any)
    };

    Ok(DependencyDeclaration {
        code_name_base,
        kinds,
        release,
        any_release: false,
        requirement,
    })
}

/// A parsed `project.xml`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectDescriptor {
    document: XmlDocument,
    code_name_base: String,
    data_depth: usize,
    indent_unit: String,
}

impl ProjectDescriptor {
    /// Parse a descriptor from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let document = XmlDocument::parse(data)?;

        let data_element = document.root.find_descendant("data").ok_or_else(|| {
            NbmError::MalformedDescriptor("no <data> element".to_string())
        })?;
        let code_name_base = data_element
            .find_child("code-name-base")
            .and_then(|e| e.text())
            .ok_or_else(|| {
                NbmError::MalformedDescriptor("no code-name-base in <data>".to_string())
            })?;
        let data_depth = depth_of(&document.root, "data", 0).unwrap_or_default();

        let indent_unit = document
            .root
            .child_indent()
            .map(|s| s.trim_start_matches(|c| c == '\n' || c == '\r').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_INDENT.to_string());

        Ok(Self {
            document,
            code_name_base,
            data_depth,
            indent_unit,
        })
    }

    /// Read a descriptor file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("reading {}", path.display());

        Self::parse(&read_path(path)?)
    }

    /// Serialize the descriptor.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.document.to_bytes(false)
    }

    /// Write the descriptor to a file, restoring the previous content on failure.
    pub fn write_path(&self, path: impl AsRef<Path>) -> Result<()> {
        write_with_backup(path.as_ref(), &self.to_bytes()?)
    }

    /// The code name base of the described module.
    pub fn code_name_base(&self) -> &str {
        &self.code_name_base
    }

    fn module_dependencies(&self) -> Option<&XmlElement> {
        self.document
            .root
            .find_descendant("data")
            .and_then(|e| e.find_child("module-dependencies"))
    }

    /// Declared module dependencies in document order.
    pub fn dependencies(&self) -> Result<Vec<DependencyDeclaration>> {
        match self.module_dependencies() {
            Some(md) => md
                .child_elements()
                .filter(|e| e.local_name() == "dependency")
                .map(parse_dependency)
                .collect(),
            None => Ok(vec![]),
        }
    }

    /// Obtain the declared dependency on a module.
    pub fn dependency(&self, code_name_base: &str) -> Result<Option<DependencyDeclaration>> {
        Ok(self
            .dependencies()?
            .into_iter()
            .find(|d| d.code_name_base == code_name_base))
    }

    /// Apply an edit, creating the dependency element if needed.
    ///
    /// New dependencies are placed in code name base order.
    pub fn apply(&mut self, edit: &DependencyEdit) -> Result<()> {
        let declaration = &edit.after;
        let indenter = Indenter {
            unit: &self.indent_unit,
        };
        let data_depth = self.data_depth;
        let md_depth = data_depth + 1;
        let dependency_depth = md_depth + 1;

        let data = self
            .document
            .root
            .find_descendant_mut("data")
            .ok_or_else(|| NbmError::MalformedDescriptor("no <data> element".to_string()))?;

        if data.find_child("module-dependencies").is_none() {
            let md = data.new_child("module-dependencies");
            insert_ordered(
                data,
                md,
                DATA_ORDER,
                &indenter.at(md_depth),
                &indenter.at(data_depth),
            );
        }

        let md = data.find_child_mut("module-dependencies").ok_or_else(|| {
            NbmError::MalformedDescriptor("module-dependencies element vanished".to_string())
        })?;

        let existing = md.child_elements_mut().find(|e| {
            e.local_name() == "dependency"
                && dependency_code_name_base(e).as_deref() == Some(&declaration.code_name_base)
        });

        if let Some(element) = existing {
            debug!(
                "updating dependency of {} on {}",
                self.code_name_base, declaration.code_name_base
            );
            return indenter.write_declaration(element, dependency_depth, declaration);
        }

        debug!(
            "adding dependency of {} on {}",
            self.code_name_base, declaration.code_name_base
        );

        let mut element = md.new_child("dependency");
        let cnb = element
            .new_child("code-name-base")
            .with_text(&declaration.code_name_base);
        element.append_element(
            cnb,
            &indenter.at(dependency_depth + 1),
            &indenter.at(dependency_depth),
        );
        indenter.write_declaration(&mut element, dependency_depth, declaration)?;

        let indent = md
            .child_indent()
            .unwrap_or_else(|| indenter.at(dependency_depth));

        let before = md.children.iter().position(|n| {
            matches!(n, XmlNode::Element(e) if e.local_name() == "dependency"
                && dependency_code_name_base(e)
                    .map(|cnb| cnb > declaration.code_name_base)
                    .unwrap_or(false))
        });

        match before {
            Some(index) => md.insert_element_before(index, element, &indent),
            None => md.append_element(element, &indent, &indenter.at(md_depth)),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    const PROJECT: &str = indoc! {r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <project xmlns="http://www.netbeans.org/ns/project/1">
            <type>org.netbeans.modules.apisupport.project</type>
            <configuration>
                <data xmlns="http://www.netbeans.org/ns/nb-module-project/3">
                    <code-name-base>org.example.editor</code-name-base>
                    <suite-component/>
                    <module-dependencies>
                        <dependency>
                            <code-name-base>org.example.api</code-name-base>
                            <build-prerequisite/>
                            <compile-dependency/>
                            <run-dependency>
                                <release-version>1</release-version>
                                <specification-version>1.2</specification-version>
                            </run-dependency>
                        </dependency>
                        <dependency>
                            <code-name-base>org.example.impl</code-name-base>
                            <build-prerequisite/>
                            <compile-dependency/>
                            <run-dependency>
                                <implementation-version/>
                            </run-dependency>
                        </dependency>
                        <dependency>
                            <code-name-base>org.example.util</code-name-base>
                            <compile-dependency/>
                        </dependency>
                    </module-dependencies>
                    <public-packages/>
                </data>
            </configuration>
        </project>
    "#};

    fn edit(after: DependencyDeclaration) -> DependencyEdit {
        DependencyEdit {
            code_name_base: after.code_name_base.clone(),
            before: None,
            after,
        }
    }

    #[test]
    fn parse_descriptor() -> Result<()> {
        let p = ProjectDescriptor::parse(PROJECT.as_bytes())?;
        assert_eq!(p.code_name_base(), "org.example.editor");

        let deps = p.dependencies()?;
        assert_eq!(deps.len(), 3);

        assert_eq!(deps[0].code_name_base, "org.example.api");
        assert_eq!(deps[0].kinds, DependencyKinds::all());
        assert_eq!(deps[0].release, Some(ReleaseRange::exact(1)));
        assert_eq!(
            deps[0].requirement,
            VersionRequirement::Specification(SpecificationVersion::parse("1.2")?)
        );

        assert_eq!(deps[1].requirement, VersionRequirement::Implementation(None));

        assert!(!deps[2].kinds.run);
        assert!(deps[2].kinds.compile);
        assert_eq!(deps[2].requirement, VersionRequirement::Any);

        Ok(())
    }

    #[test]
    fn round_trip_is_identical() -> Result<()> {
        let p = ProjectDescriptor::parse(PROJECT.as_bytes())?;
        assert_eq!(String::from_utf8_lossy(&p.to_bytes()?), PROJECT);

        Ok(())
    }

    #[test]
    fn malformed_descriptors() {
        assert!(matches!(
            ProjectDescriptor::parse(b"<project/>"),
            Err(NbmError::MalformedDescriptor(_))
        ));

        let both = PROJECT.replace(
            "<implementation-version/>",
            "<specification-version>1.0</specification-version><implementation-version/>",
        );
        let p = ProjectDescriptor::parse(both.as_bytes()).unwrap();
        assert!(matches!(
            p.dependencies(),
            Err(NbmError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn add_dependency() -> Result<()> {
        let mut p = ProjectDescriptor::parse(PROJECT.as_bytes())?;

        let mut after = DependencyDeclaration::run(
            "org.example.lib",
            VersionRequirement::Specification(SpecificationVersion::parse("1.0")?),
        );
        after.kinds = DependencyKinds::all();
        p.apply(&edit(after.clone()))?;

        let written = String::from_utf8_lossy(&p.to_bytes()?).to_string();
        assert!(written.contains(concat!(
            "                </dependency>\n",
            "                <dependency>\n",
            "                    <code-name-base>org.example.lib</code-name-base>\n",
            "                    <build-prerequisite/>\n",
            "                    <compile-dependency/>\n",
            "                    <run-dependency>\n",
            "                        <specification-version>1.0</specification-version>\n",
            "                    </run-dependency>\n",
            "                </dependency>\n",
            "                <dependency>\n",
            "                    <code-name-base>org.example.util</code-name-base>\n",
        )));

        let reparsed = ProjectDescriptor::parse(written.as_bytes())?;
        let names = reparsed
            .dependencies()?
            .into_iter()
            .map(|d| d.code_name_base)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "org.example.api",
                "org.example.impl",
                "org.example.lib",
                "org.example.util"
            ]
        );
        assert_eq!(reparsed.dependency("org.example.lib")?, Some(after));

        Ok(())
    }

    #[test]
    fn switch_version_style() -> Result<()> {
        let mut p = ProjectDescriptor::parse(PROJECT.as_bytes())?;

        let mut after = p.dependency("org.example.api")?.unwrap();
        after.requirement = VersionRequirement::Implementation(None);
        p.apply(&edit(after.clone()))?;

        let written = String::from_utf8_lossy(&p.to_bytes()?).to_string();
        assert!(written.contains(concat!(
            "                    <run-dependency>\n",
            "                        <release-version>1</release-version>\n",
            "                        <implementation-version/>\n",
            "                    </run-dependency>\n",
        )));
        assert!(!written.contains("<specification-version>1.2"));
        assert_eq!(
            ProjectDescriptor::parse(written.as_bytes())?.dependency("org.example.api")?,
            Some(after)
        );

        Ok(())
    }

    #[test]
    fn add_run_dependency_to_compile_only() -> Result<()> {
        let mut p = ProjectDescriptor::parse(PROJECT.as_bytes())?;

        let mut after = p.dependency("org.example.util")?.unwrap();
        after.kinds = DependencyKinds::all();
        after.requirement = VersionRequirement::Specification(SpecificationVersion::parse("2.3")?);
        p.apply(&edit(after.clone()))?;

        let written = String::from_utf8_lossy(&p.to_bytes()?).to_string();
        assert!(written.contains(concat!(
            "                    <code-name-base>org.example.util</code-name-base>\n",
            "                    <build-prerequisite/>\n",
            "                    <compile-dependency/>\n",
            "                    <run-dependency>\n",
            "                        <specification-version>2.3</specification-version>\n",
            "                    </run-dependency>\n",
            "                </dependency>\n",
            "            </module-dependencies>\n",
        )));

        Ok(())
    }

    #[test]
    fn create_module_dependencies() -> Result<()> {
        let mut p = ProjectDescriptor::parse(
            indoc! {r#"
                <project xmlns="http://www.netbeans.org/ns/project/1">
                  <configuration>
                    <data xmlns="http://www.netbeans.org/ns/nb-module-project/3">
                      <code-name-base>org.a</code-name-base>
                      <public-packages/>
                    </data>
                  </configuration>
                </project>
            "#}
            .as_bytes(),
        )?;

        p.apply(&edit(DependencyDeclaration::run(
            "org.b",
            VersionRequirement::Any,
        )))?;

        let written = String::from_utf8_lossy(&p.to_bytes()?).to_string();
        assert!(written.contains(concat!(
            "      <code-name-base>org.a</code-name-base>\n",
            "      <module-dependencies>\n",
            "        <dependency>\n",
            "          <code-name-base>org.b</code-name-base>\n",
            "          <run-dependency/>\n",
            "        </dependency>\n",
            "      </module-dependencies>\n",
            "      <public-packages/>\n",
        )));

        Ok(())
    }

    #[test]
    fn write_and_read_file() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let path = td.path().join("project.xml");
        std::fs::write(&path, PROJECT)?;

        let p = ProjectDescriptor::from_path(&path)?;
        p.write_path(&path)?;
        assert_eq!(std::fs::read_to_string(&path)?, PROJECT);

        Ok(())
    }
}
