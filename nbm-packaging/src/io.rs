// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers. */

use {
    crate::error::{NbmError, Result},
    log::warn,
    std::path::Path,
};

/// Read a file, attributing errors to its path.
pub fn read_path(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| NbmError::IoPath(path.display().to_string(), e))
}

/// Read a file if it exists.
pub fn read_existing(path: &Path) -> Result<Option<Vec<u8>>> {
    if path.exists() {
        Ok(Some(read_path(path)?))
    } else {
        Ok(None)
    }
}

/// Replace the content of a file.
///
/// The previous content is held in memory and written back if the write fails.
pub fn write_with_backup(path: &Path, data: &[u8]) -> Result<()> {
    let backup = read_existing(path)?;

    if let Err(e) = std::fs::write(path, data) {
        if let Some(backup) = backup {
            warn!("restoring {} after failed write", path.display());
            restore(path, &backup)?;
        }

        return Err(NbmError::IoPath(path.display().to_string(), e));
    }

    Ok(())
}

/// Write previously saved content back to a file.
pub fn restore(path: &Path, backup: &[u8]) -> Result<()> {
    std::fs::write(path, backup).map_err(|e| NbmError::IoPath(path.display().to_string(), e))
}
