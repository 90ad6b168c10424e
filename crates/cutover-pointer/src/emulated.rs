//! ---
//! cutover_section: "03-pointer"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Sidecar-recorded stable pointer for hosts without readable links."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::{
    normalize, platform, resolve_link_target, same_entry, sidecar_path, DirectoryPointer,
    PointerError, PointerKind,
};

/// Pointer that records its target in a `<link>.target` sidecar.
///
/// Links on these hosts may need elevated privileges to create and may not
/// read back through the standard calls, so the sidecar is the source of
/// truth whenever `read_link` fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmulatedPointer;

impl EmulatedPointer {
    pub fn new() -> Self {
        Self
    }
}

impl DirectoryPointer for EmulatedPointer {
    fn kind(&self) -> PointerKind {
        PointerKind::Emulated
    }

    fn create(&self, target: &Path, link: &Path) -> Result<(), PointerError> {
        let create_err = |source| PointerError::Create {
            link: link.to_path_buf(),
            target: target.to_path_buf(),
            source,
        };
        let normalized = normalize(target).map_err(create_err)?;

        if let Err(primary) = platform::symlink_dir(&normalized, link) {
            warn!(
                link = %link.display(),
                error = %primary,
                "standard link call refused, trying fallback"
            );
            platform::fallback_link(&normalized, link).map_err(|source| {
                error!(
                    target = %normalized.display(),
                    link = %link.display(),
                    error = %source,
                    "failed to create link"
                );
                create_err(source)
            })?;
        }

        let sidecar = sidecar_path(link);
        fs::write(&sidecar, normalized.to_string_lossy().as_bytes()).map_err(create_err)?;
        debug!(sidecar = %sidecar.display(), "pointer sidecar written");
        Ok(())
    }

    fn remove(&self, link: &Path) -> Result<(), PointerError> {
        let remove_err = |source| PointerError::Remove {
            link: link.to_path_buf(),
            source,
        };
        let meta = fs::symlink_metadata(link).map_err(remove_err)?;
        if platform::is_directory_like(&meta) {
            fs::remove_dir(link).map_err(remove_err)?;
        } else {
            fs::remove_file(link).map_err(remove_err)?;
        }

        match fs::remove_file(sidecar_path(link)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(remove_err(err)),
        }
    }

    fn read(&self, link: &Path) -> Result<PathBuf, PointerError> {
        let read_err = |source| PointerError::Read {
            link: link.to_path_buf(),
            source,
        };
        match fs::read_link(link) {
            Ok(raw) => resolve_link_target(link, &raw).map_err(read_err),
            Err(native) => {
                debug!(link = %link.display(), error = %native, "read_link failed, using sidecar");
                let recorded = fs::read_to_string(sidecar_path(link)).map_err(read_err)?;
                let recorded = recorded.trim_end_matches(['\r', '\n']);
                if recorded.is_empty() {
                    return Err(read_err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "pointer sidecar is empty",
                    )));
                }
                normalize(Path::new(recorded)).map_err(read_err)
            }
        }
    }

    fn same_directory(&self, a: &Path, b: &Path) -> Result<bool, PointerError> {
        let compare_err = |source| PointerError::Compare {
            left: a.to_path_buf(),
            right: b.to_path_buf(),
            source,
        };
        match same_entry(a, b).map_err(compare_err)? {
            Some(same) => Ok(same),
            None => probe_same_directory(a, b).map_err(compare_err),
        }
    }
}

/// Write-and-probe identity test: create a uniquely named marker under `a`
/// and check whether it is visible under `b`. The marker is removed on return.
pub fn probe_same_directory(a: &Path, b: &Path) -> io::Result<bool> {
    let marker = tempfile::Builder::new()
        .prefix(".cutover-probe-")
        .tempfile_in(a)?;
    let name = marker
        .path()
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "probe marker has no file name"))?;
    Ok(b.join(name).exists())
}
