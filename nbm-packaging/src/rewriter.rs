// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Rewriting module dependencies of project descriptors.

Two kinds of rewrites exist:

* *Refresh* raises the required specification version of existing runtime
  dependencies to the current version of their targets.
* *Inject* makes every module depend on a set of modules, adding the
  declaration or completing an existing one.

Running a rewrite on its own output produces no edits.
*/

use {
    crate::{
        dependency::{DependencyDeclaration, DependencyKinds, VersionRequirement},
        error::{NbmError, Result},
        io::{read_path, restore, write_with_backup},
        project_xml::ProjectDescriptor,
        spec_version::SpecificationVersion,
    },
    log::{info, warn},
    serde::Deserialize,
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
        path::{Path, PathBuf},
    },
};

/// A change to the dependency of a module on `code_name_base`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DependencyEdit {
    pub code_name_base: String,
    /// The declaration before the edit. `None` if the dependency is new.
    pub before: Option<DependencyDeclaration>,
    pub after: DependencyDeclaration,
}

impl Display for DependencyEdit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.before {
            Some(before) => write!(f, "{} -> {}", before, self.after),
            None => write!(f, "+ {}", self.after),
        }
    }
}

/// Raise the specification version required by an existing dependency.
///
/// Implementation version dependencies, dependencies without a runtime part or
/// specification version, and requirements already at or above `required` are
/// left alone.
pub fn compute_refresh(
    existing: &DependencyDeclaration,
    required: &SpecificationVersion,
) -> Option<DependencyEdit> {
    if !existing.kinds.run {
        return None;
    }

    match &existing.requirement {
        VersionRequirement::Specification(current) if required > current => {
            let mut after = existing.clone();
            after.requirement = VersionRequirement::Specification(required.clone());

            Some(DependencyEdit {
                code_name_base: existing.code_name_base.clone(),
                before: Some(existing.clone()),
                after,
            })
        }
        _ => None,
    }
}

/// A dependency every module should have.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InjectedDependency {
    pub code_name_base: String,
    pub requirement: VersionRequirement,
}

/// Make a declaration express an injected dependency.
///
/// A missing declaration is created with all dependency kinds. An existing one
/// gains missing kinds and switches to the injected version style. A required
/// specification version is never lowered.
pub fn compute_inject(
    existing: Option<&DependencyDeclaration>,
    injected: &InjectedDependency,
) -> Option<DependencyEdit> {
    let existing = match existing {
        Some(existing) => existing,
        None => {
            return Some(DependencyEdit {
                code_name_base: injected.code_name_base.clone(),
                before: None,
                after: DependencyDeclaration {
                    code_name_base: injected.code_name_base.clone(),
                    kinds: DependencyKinds::all(),
                    release: None,
                    any_release: false,
                    requirement: injected.requirement.clone(),
                },
            });
        }
    };

    let mut after = existing.clone();
    after.kinds = existing.kinds.union(&DependencyKinds::all());

    after.requirement = match (&existing.requirement, &injected.requirement) {
        (_, VersionRequirement::Any) => existing.requirement.clone(),
        (VersionRequirement::Specification(current), VersionRequirement::Specification(wanted)) => {
            VersionRequirement::Specification(current.max(wanted).clone())
        }
        (VersionRequirement::Implementation(Some(current)), VersionRequirement::Implementation(None)) => {
            VersionRequirement::Implementation(Some(current.clone()))
        }
        (_, wanted) => wanted.clone(),
    };

    if &after == existing {
        None
    } else {
        Some(DependencyEdit {
            code_name_base: existing.code_name_base.clone(),
            before: Some(existing.clone()),
            after,
        })
    }
}

/// Checks a rewritten descriptor.
///
/// Returning an error reverts the descriptor to its previous content.
pub trait ProjectValidator {
    fn validate(&self, project_xml: &Path) -> Result<()>;
}

/// A validator accepting everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoValidation;

impl ProjectValidator for NoValidation {
    fn validate(&self, _: &Path) -> Result<()> {
        Ok(())
    }
}

impl<F> ProjectValidator for F
where
    F: Fn(&Path) -> Result<()>,
{
    fn validate(&self, project_xml: &Path) -> Result<()> {
        self(project_xml)
    }
}

/// An edit that failed validation and was taken back.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RejectedEdit {
    pub edit: DependencyEdit,
    pub reason: String,
}

/// Outcome of rewriting a single descriptor.
///
/// Edits are validated one at a time. A rejected edit does not affect the
/// others.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProjectRewrite {
    /// Edits that were written and validated.
    pub applied: Vec<DependencyEdit>,
    /// Edits that failed validation.
    pub rejected: Vec<RejectedEdit>,
}

impl ProjectRewrite {
    /// Whether no edits were needed.
    pub fn is_unchanged(&self) -> bool {
        self.applied.is_empty() && self.rejected.is_empty()
    }
}

/// Outcome of rewriting many descriptors.
#[derive(Debug, Default)]
pub struct RewriteReport {
    /// Descriptors that were changed, with the edits that were kept.
    pub rewritten: Vec<(PathBuf, Vec<DependencyEdit>)>,
    /// Problems attributed to their descriptor.
    pub failures: Vec<String>,
}

impl RewriteReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Convert to the list of rewritten descriptors.
    ///
    /// Errors with [NbmError::RewriteValidationFailed] if anything failed.
    pub fn into_result(self) -> Result<Vec<(PathBuf, Vec<DependencyEdit>)>> {
        if self.failures.is_empty() {
            Ok(self.rewritten)
        } else {
            Err(NbmError::RewriteValidationFailed(self.failures))
        }
    }
}

/// Injected dependency as written in a configuration file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct InjectConfig {
    pub cnb: String,
    #[serde(default)]
    pub specification_version: Option<String>,
    #[serde(default)]
    pub implementation: bool,
}

/// Rewrite directives, typically read from YAML.
///
/// ```yaml
/// refresh:
///   org.example.api: "1.14"
/// inject:
///   - cnb: org.example.bootstrap
///     specification_version: "2.0"
///   - cnb: org.example.core
///     implementation: true
/// validate_command: ["ant", "-q", "compile"]
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct RewriteConfig {
    #[serde(default)]
    pub refresh: BTreeMap<String, String>,
    #[serde(default)]
    pub inject: Vec<InjectConfig>,
    #[serde(default)]
    pub validate_command: Option<Vec<String>>,
}

impl RewriteConfig {
    /// Resolve the configuration into a [DependencyRewriter].
    pub fn to_rewriter(&self) -> Result<DependencyRewriter> {
        let mut rewriter = DependencyRewriter::default();

        for (cnb, version) in &self.refresh {
            rewriter.refresh.insert(
                cnb.clone(),
                SpecificationVersion::parse(version).map_err(|e| {
                    NbmError::InvalidRewriteConfig(format!("refresh of {}: {}", cnb, e))
                })?,
            );
        }

        for inject in &self.inject {
            let requirement = match (&inject.specification_version, inject.implementation) {
                (Some(_), true) => {
                    return Err(NbmError::InvalidRewriteConfig(format!(
                        "{} cannot require both a specification and an implementation version",
                        inject.cnb
                    )));
                }
                (Some(version), false) => VersionRequirement::Specification(
                    SpecificationVersion::parse(version).map_err(|e| {
                        NbmError::InvalidRewriteConfig(format!("inject of {}: {}", inject.cnb, e))
                    })?,
                ),
                (None, true) => VersionRequirement::Implementation(None),
                (None, false) => VersionRequirement::Any,
            };

            rewriter.inject.push(InjectedDependency {
                code_name_base: inject.cnb.clone(),
                requirement,
            });
        }

        Ok(rewriter)
    }
}

/// Applies refresh and inject directives to project descriptors.
#[derive(Clone, Debug, Default)]
pub struct DependencyRewriter {
    /// Current specification versions of dependency targets.
    pub refresh: BTreeMap<String, SpecificationVersion>,
    pub inject: Vec<InjectedDependency>,
}

impl DependencyRewriter {
    fn is_injected(&self, code_name_base: &str) -> bool {
        self.inject.iter().any(|i| i.code_name_base == code_name_base)
    }

    /// Compute the edits needed for a descriptor.
    ///
    /// Descriptors of injected modules are never edited and a module never gains
    /// a dependency on itself.
    pub fn compute_edits(&self, descriptor: &ProjectDescriptor) -> Result<Vec<DependencyEdit>> {
        let own = descriptor.code_name_base();

        if self.is_injected(own) {
            return Ok(vec![]);
        }

        let original = descriptor.dependencies()?;
        let mut declarations = original.clone();

        for declaration in declarations.iter_mut() {
            if let Some(required) = self.refresh.get(&declaration.code_name_base) {
                if let Some(edit) = compute_refresh(declaration, required) {
                    *declaration = edit.after;
                }
            }
        }

        for injected in &self.inject {
            if injected.code_name_base == own {
                continue;
            }

            let index = declarations
                .iter()
                .position(|d| d.code_name_base == injected.code_name_base);

            if let Some(edit) = compute_inject(index.map(|i| &declarations[i]), injected) {
                match index {
                    Some(i) => declarations[i] = edit.after,
                    None => declarations.push(edit.after),
                }
            }
        }

        Ok(declarations
            .into_iter()
            .filter_map(|after| {
                let before = original
                    .iter()
                    .find(|d| d.code_name_base == after.code_name_base)
                    .cloned();

                if before.as_ref() == Some(&after) {
                    None
                } else {
                    Some(DependencyEdit {
                        code_name_base: after.code_name_base.clone(),
                        before,
                        after,
                    })
                }
            })
            .collect())
    }

    /// Compute and apply edits to a descriptor in memory.
    pub fn rewrite_descriptor(
        &self,
        descriptor: &mut ProjectDescriptor,
    ) -> Result<Vec<DependencyEdit>> {
        let edits = self.compute_edits(descriptor)?;

        for edit in &edits {
            descriptor.apply(edit)?;
        }

        Ok(edits)
    }

    /// Rewrite a `project.xml` file, validating every edit.
    ///
    /// Edits are written one at a time and the validator runs after each. An
    /// edit failing validation is taken back by restoring the last validated
    /// content and the remaining edits are still tried.
    pub fn rewrite_project(
        &self,
        path: impl AsRef<Path>,
        validator: &dyn ProjectValidator,
    ) -> Result<ProjectRewrite> {
        let path = path.as_ref();
        let mut accepted = read_path(path)?;

        let mut descriptor = ProjectDescriptor::parse(&accepted)?;
        let edits = self.compute_edits(&descriptor)?;

        let mut res = ProjectRewrite::default();

        for edit in edits {
            let mut candidate = descriptor.clone();
            candidate.apply(&edit)?;
            let data = candidate.to_bytes()?;

            write_with_backup(path, &data)?;

            match validator.validate(path) {
                Ok(()) => {
                    info!("{}: {}", descriptor.code_name_base(), edit);
                    descriptor = candidate;
                    accepted = data;
                    res.applied.push(edit);
                }
                Err(e) => {
                    warn!("{}: {} failed validation; restoring: {}", path.display(), edit, e);
                    restore(path, &accepted)?;
                    res.rejected.push(RejectedEdit {
                        edit,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(res)
    }

    /// Rewrite many `project.xml` files.
    ///
    /// A descriptor that cannot be read, parsed or written, and every edit
    /// failing validation, is recorded as a failure and processing continues
    /// with the next descriptor.
    pub fn rewrite_projects(
        &self,
        paths: &[PathBuf],
        validator: &dyn ProjectValidator,
    ) -> RewriteReport {
        let mut report = RewriteReport::default();

        for path in paths {
            match self.rewrite_project(path, validator) {
                Ok(res) => {
                    for rejected in res.rejected {
                        report.failures.push(format!(
                            "{}: {}: {}",
                            path.display(),
                            rejected.edit,
                            rejected.reason
                        ));
                    }

                    if !res.applied.is_empty() {
                        report.rewritten.push((path.clone(), res.applied));
                    }
                }
                Err(e) => {
                    warn!("{}: {}", path.display(), e);
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        report
    }
}
