//! ---
//! cutover_section: "03-pointer"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Symbolic-link backed stable pointer."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use tracing::error;

use crate::{platform, resolve_link_target, same_entry, DirectoryPointer, PointerError, PointerKind};

/// Pointer backed directly by the platform's symbolic links.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePointer;

impl NativePointer {
    pub fn new() -> Self {
        Self
    }
}

impl DirectoryPointer for NativePointer {
    fn kind(&self) -> PointerKind {
        PointerKind::Native
    }

    fn create(&self, target: &Path, link: &Path) -> Result<(), PointerError> {
        platform::symlink_dir(target, link).map_err(|source| {
            error!(
                target = %target.display(),
                link = %link.display(),
                error = %source,
                "failed to create symlink"
            );
            PointerError::Create {
                link: link.to_path_buf(),
                target: target.to_path_buf(),
                source,
            }
        })
    }

    fn remove(&self, link: &Path) -> Result<(), PointerError> {
        fs::remove_file(link).map_err(|source| {
            error!(link = %link.display(), error = %source, "failed to unlink");
            PointerError::Remove {
                link: link.to_path_buf(),
                source,
            }
        })
    }

    fn read(&self, link: &Path) -> Result<PathBuf, PointerError> {
        let read_err = |source| PointerError::Read {
            link: link.to_path_buf(),
            source,
        };
        let raw = fs::read_link(link).map_err(read_err)?;
        resolve_link_target(link, &raw).map_err(read_err)
    }

    fn same_directory(&self, a: &Path, b: &Path) -> Result<bool, PointerError> {
        let compare_err = |source| PointerError::Compare {
            left: a.to_path_buf(),
            right: b.to_path_buf(),
            source,
        };
        match same_entry(a, b).map_err(compare_err)? {
            Some(same) => Ok(same),
            None => {
                let left = fs::canonicalize(a).map_err(compare_err)?;
                let right = fs::canonicalize(b).map_err(compare_err)?;
                Ok(left == right)
            }
        }
    }
}
