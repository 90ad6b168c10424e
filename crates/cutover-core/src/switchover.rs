//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Pointer swap and guarded cleanup of the previous instance."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use cutover_pointer::DirectoryPointer;
use tracing::{debug, error, info, warn};

use crate::error::InstallError;

/// Result of [`SwitchoverEngine::switch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The pointer already designated the new directory; nothing was touched.
    Unchanged,
    Switched {
        previous: Option<PathBuf>,
        deleted_directory: bool,
        deleted_archive: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct SwitchoverEngine<'a> {
    pointer: &'a dyn DirectoryPointer,
}

impl<'a> SwitchoverEngine<'a> {
    pub fn new(pointer: &'a dyn DirectoryPointer) -> Self {
        Self { pointer }
    }

    /// Repoint `pointer_path` at `new_dir`, deleting the previous directory
    /// and its `.zip` beforehand unless skipped. Cleanup failures are logged;
    /// comparison and pointer failures are returned.
    ///
    /// A comparison that fails because the pointer dangles (its recorded
    /// target no longer exists) is the one tolerated case: the pointer is
    /// replaced and nothing is deleted but the stale archive.
    pub fn switch(
        &self,
        new_dir: &Path,
        pointer_path: &Path,
        skip_delete_old: bool,
        skip_delete_old_archive: bool,
    ) -> Result<SwitchOutcome, InstallError> {
        let previous = match self.pointer.same_directory(new_dir, pointer_path) {
            Ok(true) => {
                debug!(release = %new_dir.display(), "pointer already designates release");
                return Ok(SwitchOutcome::Unchanged);
            }
            Ok(false) => match self.pointer.read(pointer_path) {
                Ok(target) => Some(target),
                Err(err) => {
                    error!(pointer = %pointer_path.display(), error = %err, "unable to get pointer target");
                    None
                }
            },
            Err(err) => match self.pointer.read(pointer_path) {
                Ok(target) if fs::symlink_metadata(&target).is_err() => {
                    warn!(
                        pointer = %pointer_path.display(),
                        target = %target.display(),
                        "pointer target is gone, replacing pointer"
                    );
                    Some(target)
                }
                _ => {
                    error!(
                        pointer = %pointer_path.display(),
                        release = %new_dir.display(),
                        error = %err,
                        "unable to compare release with pointer"
                    );
                    return Err(err.into());
                }
            },
        };
        let previous_archive = previous.as_deref().map(archive_path);

        let mut deleted_directory = false;
        if let (false, Some(target)) = (skip_delete_old, previous.as_deref()) {
            if target.exists() {
                info!(path = %target.display(), "deleting previous instance");
                match fs::remove_dir_all(target) {
                    Ok(()) => deleted_directory = true,
                    Err(err) => error!(path = %target.display(), error = %err, "failed to delete"),
                }
            }
        }

        let mut deleted_archive = false;
        if let (false, Some(archive)) = (skip_delete_old_archive, previous_archive.as_deref()) {
            if archive.exists() {
                info!(path = %archive.display(), "deleting previous archive");
                match fs::remove_file(archive) {
                    Ok(()) => deleted_archive = true,
                    Err(err) => error!(path = %archive.display(), error = %err, "failed to delete"),
                }
            }
        }

        self.pointer.remove(pointer_path)?;
        self.pointer.create(new_dir, pointer_path)?;
        info!(pointer = %pointer_path.display(), target = %new_dir.display(), "pointer switched");

        Ok(SwitchOutcome::Switched {
            previous,
            deleted_directory,
            deleted_archive,
        })
    }
}

/// `<dir>.zip` next to an instance directory.
pub fn archive_path(directory: &Path) -> PathBuf {
    let mut name: OsString = directory.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io;

    use cutover_pointer::{sidecar_path, EmulatedPointer, NativePointer, PointerError, PointerKind};

    /// Symlink pointer whose directory comparison always fails.
    #[derive(Debug)]
    struct UncomparablePointer(NativePointer);

    impl DirectoryPointer for UncomparablePointer {
        fn kind(&self) -> PointerKind {
            self.0.kind()
        }
        fn create(&self, target: &Path, link: &Path) -> Result<(), PointerError> {
            self.0.create(target, link)
        }
        fn remove(&self, link: &Path) -> Result<(), PointerError> {
            self.0.remove(link)
        }
        fn read(&self, link: &Path) -> Result<PathBuf, PointerError> {
            self.0.read(link)
        }
        fn same_directory(&self, a: &Path, b: &Path) -> Result<bool, PointerError> {
            Err(PointerError::Compare {
                left: a.to_path_buf(),
                right: b.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only directory"),
            })
        }
    }

    struct Layout {
        _dir: tempfile::TempDir,
        old: PathBuf,
        new: PathBuf,
        link: PathBuf,
    }

    fn layout() -> Layout {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("service-5.1");
        let new = dir.path().join("service-5.2");
        fs::create_dir_all(old.join("var")).unwrap();
        fs::create_dir(&new).unwrap();
        fs::write(archive_path(&old), b"zip").unwrap();
        let link = dir.path().join("CURRENT");
        std::os::unix::fs::symlink(&old, &link).unwrap();
        Layout {
            old,
            new,
            link,
            _dir: dir,
        }
    }

    #[test]
    fn same_directory_is_a_no_op() {
        let layout = layout();
        let pointer = NativePointer::new();
        let engine = SwitchoverEngine::new(&pointer);
        let outcome = engine.switch(&layout.old, &layout.link, false, false).unwrap();
        assert_eq!(outcome, SwitchOutcome::Unchanged);
        assert_eq!(fs::read_link(&layout.link).unwrap(), layout.old);
        assert!(layout.old.is_dir());
        assert!(archive_path(&layout.old).exists());
    }

    #[test]
    fn switch_repoints_and_cleans_up() {
        let layout = layout();
        let pointer = NativePointer::new();
        let outcome = SwitchoverEngine::new(&pointer)
            .switch(&layout.new, &layout.link, false, false)
            .unwrap();
        assert_eq!(
            outcome,
            SwitchOutcome::Switched {
                previous: Some(layout.old.clone()),
                deleted_directory: true,
                deleted_archive: true,
            }
        );
        assert_eq!(pointer.read(&layout.link).unwrap(), layout.new);
        assert!(!layout.old.exists());
        assert!(!archive_path(&layout.old).exists());
    }

    #[test]
    fn keeping_directory_still_deletes_archive() {
        let layout = layout();
        let pointer = NativePointer::new();
        SwitchoverEngine::new(&pointer)
            .switch(&layout.new, &layout.link, true, false)
            .unwrap();
        assert!(layout.old.is_dir());
        assert!(!archive_path(&layout.old).exists());
    }

    #[test]
    fn keeping_archive_still_deletes_directory() {
        let layout = layout();
        let pointer = NativePointer::new();
        SwitchoverEngine::new(&pointer)
            .switch(&layout.new, &layout.link, false, true)
            .unwrap();
        assert!(!layout.old.exists());
        assert!(archive_path(&layout.old).exists());
    }

    #[test]
    fn dangling_pointer_is_replaced() {
        let layout = layout();
        fs::remove_dir_all(&layout.old).unwrap();
        let pointer = NativePointer::new();
        let outcome = SwitchoverEngine::new(&pointer)
            .switch(&layout.new, &layout.link, false, false)
            .unwrap();
        assert!(matches!(
            outcome,
            SwitchOutcome::Switched {
                deleted_directory: false,
                deleted_archive: true,
                ..
            }
        ));
        assert_eq!(pointer.read(&layout.link).unwrap(), layout.new);
    }

    #[test]
    fn failed_comparison_keeps_active_release() {
        let layout = layout();
        // The pointer already designates the release being switched to.
        fs::remove_file(&layout.link).unwrap();
        std::os::unix::fs::symlink(&layout.new, &layout.link).unwrap();
        let pointer = UncomparablePointer(NativePointer::new());

        let err = SwitchoverEngine::new(&pointer)
            .switch(&layout.new, &layout.link, false, false)
            .unwrap_err();

        assert!(matches!(
            err,
            InstallError::Pointer(PointerError::Compare { .. })
        ));
        assert_eq!(err.exit_code(), 1);
        assert!(layout.new.is_dir());
        assert!(layout.old.is_dir());
        assert!(archive_path(&layout.old).exists());
        assert_eq!(fs::read_link(&layout.link).unwrap(), layout.new);
    }

    #[test]
    fn failed_comparison_with_live_previous_is_fatal() {
        let layout = layout();
        let pointer = UncomparablePointer(NativePointer::new());
        assert!(SwitchoverEngine::new(&pointer)
            .switch(&layout.new, &layout.link, false, false)
            .is_err());
        assert!(layout.old.is_dir());
        assert_eq!(fs::read_link(&layout.link).unwrap(), layout.old);
    }

    #[test]
    fn emulated_switch_rewrites_sidecar() {
        let layout = layout();
        let pointer = EmulatedPointer::new();
        fs::remove_file(&layout.link).unwrap();
        pointer.create(&layout.old, &layout.link).unwrap();
        assert_eq!(
            fs::read_to_string(sidecar_path(&layout.link)).unwrap(),
            layout.old.to_string_lossy()
        );

        let outcome = SwitchoverEngine::new(&pointer)
            .switch(&layout.new, &layout.link, false, false)
            .unwrap();

        assert!(matches!(
            outcome,
            SwitchOutcome::Switched {
                deleted_directory: true,
                deleted_archive: true,
                ..
            }
        ));
        assert_eq!(
            fs::read_to_string(sidecar_path(&layout.link)).unwrap(),
            layout.new.to_string_lossy()
        );
        assert_eq!(pointer.read(&layout.link).unwrap(), layout.new);
        assert!(!layout.old.exists());
    }

    #[test]
    fn emulated_switch_to_active_release_is_unchanged() {
        let layout = layout();
        let pointer = EmulatedPointer::new();
        fs::remove_file(&layout.link).unwrap();
        pointer.create(&layout.new, &layout.link).unwrap();

        let outcome = SwitchoverEngine::new(&pointer)
            .switch(&layout.new, &layout.link, false, false)
            .unwrap();

        assert_eq!(outcome, SwitchOutcome::Unchanged);
        assert!(layout.new.is_dir());
        assert_eq!(
            fs::read_to_string(sidecar_path(&layout.link)).unwrap(),
            layout.new.to_string_lossy()
        );
    }
}
