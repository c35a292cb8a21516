// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Module identities.

A module is identified by its *code name base*, a dotted identifier such as
`org.example.editor`, optionally followed by a release version: `org.example.editor/2`.
*/

use {
    crate::{
        error::{NbmError, Result},
        manifest::ModuleManifest,
    },
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// Kinds of files named after a module.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrackingFileKind {
    /// The update tracking ledger (`.xml`).
    Ledger,
    /// The distributable module package (`.nbm`).
    Nbm,
}

impl TrackingFileKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ledger => "xml",
            Self::Nbm => "nbm",
        }
    }
}

/// A module code name base with an optional release version.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModuleIdentity {
    code_name_base: String,
    release: Option<u32>,
}

impl ModuleIdentity {
    /// Construct an instance from its parts.
    pub fn new(code_name_base: impl ToString, release: Option<u32>) -> Result<Self> {
        let code_name_base = code_name_base.to_string();

        if code_name_base.is_empty() {
            return Err(NbmError::MalformedModuleIdentity(
                code_name_base,
                "empty code name base",
            ));
        }

        Ok(Self {
            code_name_base,
            release,
        })
    }

    /// Parse a manifest value like `org.example.module/1`.
    pub fn parse(value: &str) -> Result<Self> {
        let value_trimmed = value.trim();

        let (cnb, release) = if let Some(pos) = value_trimmed.rfind('/') {
            let suffix = &value_trimmed[pos + 1..];

            if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
                return Err(NbmError::MalformedModuleIdentity(
                    value.to_string(),
                    "release version is not a non-negative integer",
                ));
            }

            let release = u32::from_str(suffix).map_err(|_| {
                NbmError::MalformedModuleIdentity(value.to_string(), "release version overflow")
            })?;

            (&value_trimmed[0..pos], Some(release))
        } else {
            (value_trimmed, None)
        };

        if cnb.is_empty() {
            return Err(NbmError::MalformedModuleIdentity(
                value.to_string(),
                "empty code name base",
            ));
        }

        Ok(Self {
            code_name_base: cnb.to_string(),
            release,
        })
    }

    /// Resolve the identity declared by a module manifest.
    ///
    /// `OpenIDE-Module` is preferred. OSGi bundles are identified by
    /// `Bundle-SymbolicName`, with any `;` parameters stripped.
    pub fn from_manifest(manifest: &ModuleManifest) -> Result<Self> {
        if let Some(value) = manifest.attribute(crate::manifest::OPENIDE_MODULE) {
            Self::parse(value)
        } else if let Some(value) = manifest.attribute(crate::manifest::BUNDLE_SYMBOLIC_NAME) {
            let name = value.split(';').next().unwrap_or_default().trim();
            Self::new(name, None)
        } else {
            Err(NbmError::MalformedModuleIdentity(
                String::new(),
                "manifest declares neither OpenIDE-Module nor Bundle-SymbolicName",
            ))
        }
    }

    /// The code name base.
    pub fn code_name_base(&self) -> &str {
        &self.code_name_base
    }

    /// The release version, if declared.
    pub fn release(&self) -> Option<u32> {
        self.release
    }

    /// Whether another identity has the same code name base, ignoring release.
    pub fn same_code_name_base(&self, other: &Self) -> bool {
        self.code_name_base == other.code_name_base
    }

    /// The canonical `cnb` or `cnb/N` form.
    pub fn canonical_string(&self) -> String {
        self.to_string()
    }

    /// The file name used for files named after this module.
    ///
    /// `org.example.module` becomes `org-example-module.xml` or `org-example-module.nbm`.
    pub fn to_file_name(&self, kind: TrackingFileKind) -> String {
        format!(
            "{}.{}",
            self.code_name_base.replace('.', "-"),
            kind.extension()
        )
    }
}

impl FromStr for ModuleIdentity {
    type Err = NbmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for ModuleIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(release) = self.release {
            write!(f, "{}/{}", self.code_name_base, release)
        } else {
            write!(f, "{}", self.code_name_base)
        }
    }
}
