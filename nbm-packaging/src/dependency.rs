// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Module dependency declarations.

Dependencies are declared in 2 places:

* In module manifests, via `OpenIDE-Module-Module-Dependencies`. Entries look like
  `org.example.api/1-2 > 1.3` (specification version) or `org.example.impl = 201005`
  (implementation version). These are always runtime dependencies.
* In project descriptors (`project.xml`), where each dependency also states whether it
  is a build prerequisite and a compile dependency. See [crate::project_xml].

OSGi bundles declare dependencies via `Require-Bundle`.
*/

use {
    crate::{
        error::{NbmError, Result},
        module_identity::ModuleIdentity,
        spec_version::SpecificationVersion,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// Regular expression to parse manifest dependency expressions.
pub static RE_DEPENDENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^
        # Code name base runs until whitespace, / or an operator.
        (?P<cnb>[^\s/<>=]+)
        # Optional release version or release version range.
        (?:/(?P<release>\d+(?:-\d+)?))?
        \s*
        # Optional version relationship.
        (?:
            (?P<op>[>=])
            \s*
            (?P<version>\S+)
        )?
        \s*
        $
        "#,
    )
    .unwrap()
});

/// A range of acceptable release versions (inclusive).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ReleaseRange {
    pub low: u32,
    pub high: u32,
}

impl ReleaseRange {
    /// A range accepting exactly 1 release.
    pub fn exact(release: u32) -> Self {
        Self {
            low: release,
            high: release,
        }
    }

    /// Parse `N` or `N-M`.
    pub fn parse(s: &str) -> Result<Self> {
        let parse_int = |v: &str| -> Result<u32> {
            if v.is_empty() || !v.chars().all(|c| c.is_ascii_digit()) {
                return Err(NbmError::DependencyParse(format!(
                    "release version is not a non-negative integer: {}",
                    s
                )));
            }

            u32::from_str(v).map_err(|_| {
                NbmError::DependencyParse(format!("release version overflow: {}", s))
            })
        };

        let s_trimmed = s.trim();

        let range = if let Some((low, high)) = s_trimmed.split_once('-') {
            Self {
                low: parse_int(low)?,
                high: parse_int(high)?,
            }
        } else {
            Self::exact(parse_int(s_trimmed)?)
        };

        if range.low > range.high {
            return Err(NbmError::DependencyParse(format!(
                "release range is inverted: {}",
                s
            )));
        }

        Ok(range)
    }

    /// Whether a release version falls within this range.
    pub fn contains(&self, release: u32) -> bool {
        release >= self.low && release <= self.high
    }
}

impl Display for ReleaseRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

/// The version constraint of a runtime dependency.
///
/// A dependency constrains either the specification version or the
/// implementation version of its target, never both.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum VersionRequirement {
    /// Any version of the target is acceptable.
    Any,
    /// Target specification version must be at least this version.
    Specification(SpecificationVersion),
    /// Target implementation version must match exactly.
    ///
    /// Project descriptors only carry a marker (`None`); the concrete value is
    /// resolved from the target at build time.
    Implementation(Option<String>),
}

/// Which phases of the build and runtime a dependency applies to.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct DependencyKinds {
    pub build_prerequisite: bool,
    pub compile: bool,
    pub run: bool,
}

impl DependencyKinds {
    /// All kinds set.
    pub fn all() -> Self {
        Self {
            build_prerequisite: true,
            compile: true,
            run: true,
        }
    }

    /// Only a runtime dependency.
    pub fn run_only() -> Self {
        Self {
            build_prerequisite: false,
            compile: false,
            run: true,
        }
    }

    /// Whether this set contains all kinds of another set.
    pub fn contains(&self, other: &Self) -> bool {
        (self.build_prerequisite || !other.build_prerequisite)
            && (self.compile || !other.compile)
            && (self.run || !other.run)
    }

    /// The union of 2 sets.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            build_prerequisite: self.build_prerequisite || other.build_prerequisite,
            compile: self.compile || other.compile,
            run: self.run || other.run,
        }
    }
}

/// Why an installed module does not satisfy a dependency.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DependencyMismatch {
    Release {
        wanted: Option<ReleaseRange>,
        found: Option<u32>,
    },
    SpecificationTooLow {
        wanted: SpecificationVersion,
        found: Option<SpecificationVersion>,
    },
    Implementation {
        wanted: Option<String>,
        found: Option<String>,
    },
}

/// A dependency of one module on another.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DependencyDeclaration {
    pub code_name_base: String,
    pub kinds: DependencyKinds,
    pub release: Option<ReleaseRange>,
    /// Accept targets of any release version.
    ///
    /// Set for OSGi bundle requirements, which cannot name a release.
    pub any_release: bool,
    pub requirement: VersionRequirement,
}

impl DependencyDeclaration {
    /// Construct a runtime dependency.
    pub fn run(code_name_base: impl ToString, requirement: VersionRequirement) -> Self {
        Self {
            code_name_base: code_name_base.to_string(),
            kinds: DependencyKinds::run_only(),
            release: None,
            any_release: false,
            requirement,
        }
    }

    /// Parse a single manifest dependency expression like `org.foo/1 > 1.2`.
    pub fn parse_manifest_entry(s: &str) -> Result<Self> {
        let caps = RE_DEPENDENCY
            .captures(s.trim())
            .ok_or_else(|| NbmError::DependencyParse(s.to_string()))?;

        let code_name_base = caps["cnb"].to_string();
        let release = caps
            .name("release")
            .map(|m| ReleaseRange::parse(m.as_str()))
            .transpose()?;

        let requirement = match (caps.name("op"), caps.name("version")) {
            (Some(op), Some(version)) if op.as_str() == ">" => {
                VersionRequirement::Specification(SpecificationVersion::parse(version.as_str())?)
            }
            (Some(_), Some(version)) => {
                VersionRequirement::Implementation(Some(version.as_str().to_string()))
            }
            _ => VersionRequirement::Any,
        };

        Ok(Self {
            code_name_base,
            kinds: DependencyKinds::run_only(),
            release,
            any_release: false,
            requirement,
        })
    }

    /// Parse the comma delimited value of `OpenIDE-Module-Module-Dependencies`.
    pub fn parse_manifest_list(value: &str) -> Result<Vec<Self>> {
        value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Self::parse_manifest_entry)
            .collect()
    }

    /// Parse the value of an OSGi `Require-Bundle` attribute.
    ///
    /// The lower bound of `bundle-version` becomes a specification version
    /// requirement. Other parameters are ignored.
    pub fn parse_require_bundle(value: &str) -> Result<Vec<Self>> {
        split_outside_quotes(value, ',')
            .into_iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let mut parts = split_outside_quotes(entry, ';').into_iter();
                let name = parts.next().unwrap_or_default().trim();
                if name.is_empty() {
                    return Err(NbmError::DependencyParse(entry.to_string()));
                }

                let mut requirement = VersionRequirement::Any;
                for param in parts {
                    if let Some((key, value)) = param.split_once('=') {
                        if key.trim() == "bundle-version" {
                            let value = value.trim().trim_matches('"');
                            let lower = value
                                .trim_start_matches(|c| c == '[' || c == '(')
                                .split(',')
                                .next()
                                .unwrap_or_default();
                            requirement = VersionRequirement::Specification(
                                SpecificationVersion::parse_osgi(lower)?,
                            );
                        }
                    }
                }

                Ok(Self {
                    any_release: true,
                    ..Self::run(name, requirement)
                })
            })
            .collect()
    }

    /// Check whether an installed module satisfies this dependency.
    ///
    /// `installed` is the identity of the candidate module. Its release version
    /// must fall within the declared range; a dependency without a release range
    /// only accepts modules without a release version, unless it accepts any
    /// release.
    pub fn check(
        &self,
        installed: &ModuleIdentity,
        specification_version: Option<&SpecificationVersion>,
        implementation_version: Option<&str>,
    ) -> std::result::Result<(), DependencyMismatch> {
        let release_ok = match (&self.release, installed.release()) {
            _ if self.any_release => true,
            (Some(range), Some(release)) => range.contains(release),
            (Some(_), None) => false,
            (None, Some(_)) => false,
            (None, None) => true,
        };

        if !release_ok {
            return Err(DependencyMismatch::Release {
                wanted: self.release,
                found: installed.release(),
            });
        }

        match &self.requirement {
            VersionRequirement::Any => Ok(()),
            VersionRequirement::Specification(wanted) => match specification_version {
                Some(found) if found.satisfies(wanted) => Ok(()),
                found => Err(DependencyMismatch::SpecificationTooLow {
                    wanted: wanted.clone(),
                    found: found.cloned(),
                }),
            },
            VersionRequirement::Implementation(wanted) => {
                let ok = match (wanted, implementation_version) {
                    (Some(wanted), Some(found)) => wanted == found,
                    (None, Some(_)) => true,
                    (_, None) => false,
                };

                if ok {
                    Ok(())
                } else {
                    Err(DependencyMismatch::Implementation {
                        wanted: wanted.clone(),
                        found: implementation_version.map(|s| s.to_string()),
                    })
                }
            }
        }
    }

    /// The dependency target as written in manifests (`cnb` or `cnb/N-M`).
    pub fn target_string(&self) -> String {
        if let Some(release) = &self.release {
            format!("{}/{}", self.code_name_base, release)
        } else {
            self.code_name_base.clone()
        }
    }
}

impl Display for DependencyDeclaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.target_string())?;

        match &self.requirement {
            VersionRequirement::Any => Ok(()),
            VersionRequirement::Specification(v) => write!(f, " > {}", v),
            VersionRequirement::Implementation(Some(v)) => write!(f, " = {}", v),
            VersionRequirement::Implementation(None) => write!(f, " = *"),
        }
    }
}

/// Split a string on a delimiter, ignoring delimiters inside double quotes.
fn split_outside_quotes(s: &str, delimiter: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);

    parts
}
