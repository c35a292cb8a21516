// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! JAR manifest primitives.

A manifest consists of *sections* of `Name: value` attributes separated by
blank lines. The first section is the *main* section and holds the module
metadata. A line starting with a single space continues the value of the
previous line; the leading space is not part of the value.

Attribute names are case insensitive on read and case preserving on set.
*/

use {
    crate::error::{NbmError, Result},
    std::{
        io::{BufRead, Write},
        path::Path,
    },
};

pub const OPENIDE_MODULE: &str = "OpenIDE-Module";
pub const OPENIDE_MODULE_SPECIFICATION_VERSION: &str = "OpenIDE-Module-Specification-Version";
pub const OPENIDE_MODULE_IMPLEMENTATION_VERSION: &str = "OpenIDE-Module-Implementation-Version";
pub const OPENIDE_MODULE_MODULE_DEPENDENCIES: &str = "OpenIDE-Module-Module-Dependencies";
pub const OPENIDE_MODULE_PROVIDES: &str = "OpenIDE-Module-Provides";
pub const OPENIDE_MODULE_REQUIRES: &str = "OpenIDE-Module-Requires";
pub const OPENIDE_MODULE_NEEDS: &str = "OpenIDE-Module-Needs";
pub const BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const BUNDLE_VERSION: &str = "Bundle-Version";
pub const REQUIRE_BUNDLE: &str = "Require-Bundle";

/// An attribute in a manifest section.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ManifestAttribute {
    name: String,
    value: String,
}

impl ManifestAttribute {
    pub fn new(name: impl ToString, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// The name of this attribute.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value of this attribute, with continuation lines joined.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered series of attributes.
///
/// A section can only contain a single occurrence of an attribute. Setting an
/// attribute that already exists replaces its value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ManifestSection {
    attributes: Vec<ManifestAttribute>,
}

impl ManifestSection {
    /// Whether the section is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Set the value of an attribute.
    pub fn set_attribute(&mut self, name: impl ToString, value: impl ToString) {
        let attribute = ManifestAttribute::new(name, value);

        self.attributes
            .retain(|a| !a.name.eq_ignore_ascii_case(&attribute.name));
        self.attributes.push(attribute);
    }

    /// Obtain the value of the named attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Iterate over attributes in insertion order.
    pub fn iter_attributes(&self) -> impl Iterator<Item = &ManifestAttribute> {
        self.attributes.iter()
    }
}

/// Holds parsing state for manifests.
///
/// Instances are fed lines of text and emit [ManifestSection] instances as they
/// are completed.
#[derive(Clone, Debug, Default)]
pub struct ManifestParser {
    section: ManifestSection,
    attribute: Option<String>,
}

impl ManifestParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress section, that section is returned.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ManifestSection>> {
        let line = line.trim_end_matches(|c| c == '\n' || c == '\r');

        let current = self.attribute.take();

        if line.is_empty() {
            if let Some(attribute) = current {
                self.flush_attribute(attribute)?;
            }

            return Ok(if self.section.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.section))
            });
        }

        match (current, line.strip_prefix(' ')) {
            // Continuation of the attribute on the stack.
            (Some(v), Some(continuation)) => {
                self.attribute = Some(v + continuation);
            }
            (None, Some(_)) => {
                return Err(NbmError::ManifestParse(format!(
                    "continuation line without attribute: '{}'",
                    line
                )));
            }
            (Some(v), None) => {
                self.flush_attribute(v)?;
                self.attribute = Some(line.to_string());
            }
            (None, None) => {
                self.attribute = Some(line.to_string());
            }
        }

        Ok(None)
    }

    /// Finish parsing, consuming self.
    pub fn finish(mut self) -> Result<Option<ManifestSection>> {
        if let Some(attribute) = self.attribute.take() {
            self.flush_attribute(attribute)?;
        }

        Ok(if self.section.is_empty() {
            None
        } else {
            Some(self.section)
        })
    }

    fn flush_attribute(&mut self, v: String) -> Result<()> {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            NbmError::ManifestParse(format!("error parsing line '{}'; missing colon", v))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(NbmError::ManifestParse(format!(
                "error parsing line '{}'; empty attribute name",
                v
            )));
        }

        self.section
            .set_attribute(name, value.strip_prefix(' ').unwrap_or(value));

        Ok(())
    }
}

/// A parsed module manifest.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ModuleManifest {
    main: ManifestSection,
    entries: Vec<ManifestSection>,
}

impl ModuleManifest {
    /// Parse a manifest from a reader.
    pub fn parse_reader<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut parser = ManifestParser::default();
        let mut sections = vec![];

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                break;
            }

            if let Some(section) = parser.write_line(&line)? {
                sections.push(section);
            }
        }

        if let Some(section) = parser.finish()? {
            sections.push(section);
        }

        let mut sections = sections.into_iter();

        Ok(Self {
            main: sections.next().unwrap_or_default(),
            entries: sections.collect(),
        })
    }

    pub fn parse_str(s: &str) -> Result<Self> {
        let mut reader = std::io::BufReader::new(s.as_bytes());
        Self::parse_reader(&mut reader)
    }

    /// Parse a manifest file from the filesystem.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fh = std::fs::File::open(path)
            .map_err(|e| NbmError::IoPath(path.display().to_string(), e))?;
        let mut reader = std::io::BufReader::new(fh);

        Self::parse_reader(&mut reader)
    }

    /// Per-entry sections following the main section.
    pub fn entry_sections(&self) -> impl Iterator<Item = &ManifestSection> {
        self.entries.iter()
    }

    /// Obtain the value of a main section attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.main.attribute(name)
    }

    /// Obtain a main section attribute as a list of comma delimited values.
    ///
    /// Surrounding whitespace is trimmed and empty values are dropped.
    pub fn attribute_list(&self, name: &str) -> Vec<&str> {
        self.attribute(name)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether this manifest describes an OSGi bundle rather than a module.
    pub fn is_osgi(&self) -> bool {
        self.attribute(OPENIDE_MODULE).is_none()
            && self.attribute(BUNDLE_SYMBOLIC_NAME).is_some()
    }

    /// Serialize the manifest to a writer.
    ///
    /// Values are written on a single line.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (i, section) in std::iter::once(&self.main)
            .chain(self.entries.iter())
            .enumerate()
        {
            if i > 0 {
                writer.write_all(b"\n")?;
            }
            for attribute in section.iter_attributes() {
                writeln!(writer, "{}: {}", attribute.name, attribute.value)?;
            }
        }

        Ok(())
    }
}
