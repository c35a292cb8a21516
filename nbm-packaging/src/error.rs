// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {nbm_file_manifest::FileManifestError, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum NbmError {
    #[error("file manifest error: {0}")]
    FileManifest(#[from] FileManifestError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("XML parse error: {0}")]
    XmlRead(#[from] xml::reader::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] xml::writer::Error),

    #[error("malformed version '{0}': {1}")]
    MalformedVersion(String, &'static str),

    #[error("sticky level must be between 1 and {}; got {0}", crate::spec_version::MAX_STICKY_LEVEL)]
    InvalidStickyLevel(usize),

    #[error("malformed module identity '{0}': {1}")]
    MalformedModuleIdentity(String, &'static str),

    #[error("malformed update tracking ledger: {0}")]
    MalformedLedger(String),

    #[error("malformed project descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    #[error("failed to parse dependency expression: {0}")]
    DependencyParse(String),

    #[error("dependency cycle detected among: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error("invalid rewrite configuration: {0}")]
    InvalidRewriteConfig(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("dependency edits could not be validated: {}", .0.join("; "))]
    RewriteValidationFailed(Vec<String>),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, NbmError>;
