// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Files owned by an installed module.

An installed module version owns a set of files relative to the root of the
cluster it was installed into. Each file is recorded with the CRC32 of its
content so later tooling can tell whether the file was modified after
installation.

Paths are always stored with `/` as the separator, regardless of the host
operating system.
*/

use {
    log::debug,
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
        io::Read,
        path::{Path, PathBuf},
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum FileManifestError {
    #[error("path cannot contain '..': {0}")]
    IllegalRelativePath(String),

    #[error("path cannot be absolute: {0}")]
    IllegalAbsolutePath(String),

    #[error("path is empty")]
    EmptyPath,

    #[error("short read of {path}: read {actual} of {expected} bytes")]
    ShortRead {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FileManifestError>;

/// Normalize a relative path string to use `/` separators.
///
/// Empty components and `.` components are dropped. `..` components and absolute
/// paths are rejected.
pub fn normalize_relative_path(path: &str) -> Result<String> {
    let unified = path.replace('\\', "/");

    // is_absolute() on Windows doesn't check for leading /.
    if unified.starts_with('/') || Path::new(path).is_absolute() {
        return Err(FileManifestError::IllegalAbsolutePath(path.to_string()));
    }

    let mut parts = vec![];
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(FileManifestError::IllegalRelativePath(path.to_string())),
            part => parts.push(part),
        }
    }

    if parts.is_empty() {
        Err(FileManifestError::EmptyPath)
    } else {
        Ok(parts.join("/"))
    }
}

/// Compute the CRC32 (IEEE) of a byte slice.
pub fn crc_for_bytes(data: &[u8]) -> u32 {
    crc::crc32::checksum_ieee(data)
}

/// Compute the CRC32 of a filesystem path.
///
/// The entire file is read into memory. If fewer bytes than the file's reported
/// size could be read, an error is returned instead of a checksum over partial
/// content.
pub fn crc_for_file(path: impl AsRef<Path>) -> Result<u32> {
    let path = path.as_ref();

    let mut fh = std::fs::File::open(path)?;
    let expected = fh.metadata()?.len();

    let mut data = Vec::with_capacity(expected as usize);
    fh.read_to_end(&mut data)?;

    if data.len() as u64 != expected {
        return Err(FileManifestError::ShortRead {
            path: path.display().to_string(),
            expected,
            actual: data.len() as u64,
        });
    }

    let crc = crc_for_bytes(&data);
    debug!("computed crc {} for {}", crc, path.display());

    Ok(crc)
}

/// A file owned by a module version: a relative path and its CRC32.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileManifestEntry {
    relative_path: String,
    crc32: u32,
}

impl FileManifestEntry {
    /// Construct an instance from a relative path and checksum.
    ///
    /// The path is normalized to `/` separators.
    pub fn new(relative_path: &str, crc32: u32) -> Result<Self> {
        Ok(Self {
            relative_path: normalize_relative_path(relative_path)?,
            crc32,
        })
    }

    /// The `/` separated path relative to the install root.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// The CRC32 of the file content.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Resolve the filesystem location of this entry under an install root.
    pub fn resolve(&self, root: impl AsRef<Path>) -> PathBuf {
        self.relative_path
            .split('/')
            .fold(root.as_ref().to_path_buf(), |acc, part| acc.join(part))
    }
}

impl Display for FileManifestEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.relative_path, self.crc32)
    }
}

/// Outcome of comparing a tracked file against the filesystem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileIntegrity {
    /// File exists and its CRC matches.
    Intact,
    /// File does not exist.
    Missing,
    /// File exists with different content.
    Modified { actual: u32 },
}

impl FileManifestEntry {
    /// Compare this entry against the file under an install root.
    pub fn check_integrity(&self, root: impl AsRef<Path>) -> Result<FileIntegrity> {
        let path = self.resolve(root);

        if !path.exists() {
            return Ok(FileIntegrity::Missing);
        }

        let actual = crc_for_file(&path)?;

        Ok(if actual == self.crc32 {
            FileIntegrity::Intact
        } else {
            FileIntegrity::Modified { actual }
        })
    }
}

/// A collection of [FileManifestEntry] keyed by relative path.
///
/// Unlike the ordered entry list of a tracked module version, a path can only
/// occur once in this collection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileManifest {
    files: BTreeMap<String, u32>,
}

impl FileManifest {
    /// Whether the instance has any files entries.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Add an entry, replacing an existing entry for the same path.
    pub fn add_entry(&mut self, entry: FileManifestEntry) -> Option<u32> {
        self.files.insert(entry.relative_path, entry.crc32)
    }

    /// Obtain the CRC for a given path.
    pub fn crc(&self, path: &str) -> Option<u32> {
        self.files.get(path).copied()
    }

    /// Iterate over entries in path order.
    pub fn iter_entries(&self) -> impl Iterator<Item = FileManifestEntry> + '_ {
        self.files.iter().map(|(path, crc)| FileManifestEntry {
            relative_path: path.clone(),
            crc32: *crc,
        })
    }
}

impl FromIterator<FileManifestEntry> for FileManifest {
    fn from_iter<T: IntoIterator<Item = FileManifestEntry>>(iter: T) -> Self {
        let mut m = Self::default();
        for entry in iter {
            m.add_entry(entry);
        }

        m
    }
}
