//! Ownership helpers for the provisioned data directory.
//!
//! The engine only manages directory membership; file contents belong to
//! whichever strategy wrote them and to the search tool that reads them.

use std::fs;
use std::io;
use std::path::Path;

/// Create `path` if missing and remove everything inside it.
///
/// After this returns the directory exists and is empty, so no file from a
/// previous provisioning pass can survive into the next one.
pub fn reset(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        // file_type() does not follow symlinks, so a link to a directory is
        // unlinked rather than recursed into.
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&entry_path)?;
        } else {
            fs::remove_file(&entry_path)?;
        }
    }
    Ok(())
}

/// Create `path` if missing. Existing contents are left alone.
pub fn ensure(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

pub fn is_empty(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}
