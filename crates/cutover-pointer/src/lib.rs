//! ---
//! cutover_section: "03-pointer"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Stable directory pointer abstraction and platform variants."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
//! A stable pointer is a fixed filesystem name that designates the active,
//! versioned instance directory.
//!
//! [`NativePointer`] relies on symbolic links that can be created and read
//! back with standard calls. [`EmulatedPointer`] is used where that round
//! trip is not available: it falls back to a platform link call and records
//! the target in a `<link>.target` sidecar file. [`detect_pointer`] probes
//! the host once at startup and returns the appropriate variant.

use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;
use thiserror::Error;
use tracing::{debug, warn};

pub mod emulated;
pub mod native;
mod platform;

pub use emulated::{probe_same_directory, EmulatedPointer};
pub use native::NativePointer;

/// Suffix appended to a pointer path to form its sidecar record.
pub const SIDECAR_SUFFIX: &str = ".target";

#[derive(Debug, Error)]
pub enum PointerError {
    #[error("failed to create pointer {link} -> {target}: {source}")]
    Create {
        link: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove pointer {link}: {source}")]
    Remove {
        link: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read pointer {link}: {source}")]
    Read {
        link: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to compare {left} with {right}: {source}")]
    Compare {
        left: PathBuf,
        right: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which pointer implementation is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Native,
    Emulated,
}

impl fmt::Display for PointerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerKind::Native => f.write_str("native"),
            PointerKind::Emulated => f.write_str("emulated"),
        }
    }
}

/// Named indirection from a stable path to a versioned directory.
pub trait DirectoryPointer: fmt::Debug {
    fn kind(&self) -> PointerKind;

    /// Create `link` designating `target`. `link` must not exist.
    fn create(&self, target: &Path, link: &Path) -> Result<(), PointerError>;

    fn remove(&self, link: &Path) -> Result<(), PointerError>;

    /// Normalized directory designated by `link`.
    fn read(&self, link: &Path) -> Result<PathBuf, PointerError>;

    /// Whether `a` and `b` denote the same underlying directory, following
    /// pointers on either side.
    fn same_directory(&self, a: &Path, b: &Path) -> Result<bool, PointerError>;

    /// Whether anything exists under the pointer name, including a pointer
    /// whose target has gone away.
    fn exists(&self, link: &Path) -> bool {
        fs::symlink_metadata(link).is_ok()
    }
}

/// Path of the sidecar record for `link`.
pub fn sidecar_path(link: &Path) -> PathBuf {
    let mut name: OsString = link.as_os_str().to_owned();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Whether two existing paths are the same filesystem entry, if the platform
/// exposes device/inode identity. `None` means identity is unavailable.
pub fn same_entry(a: &Path, b: &Path) -> io::Result<Option<bool>> {
    match (platform::file_identity(a)?, platform::file_identity(b)?) {
        (Some(left), Some(right)) => Ok(Some(left == right)),
        _ => Ok(None),
    }
}

/// Probe the host and return the pointer variant to use for this run.
///
/// The probe creates a throwaway directory and link under `scratch` and
/// checks that the link reads back to its target. Any failure selects the
/// emulated variant.
pub fn detect_pointer(scratch: &Path) -> Box<dyn DirectoryPointer> {
    if cfg!(windows) {
        debug!("windows host, using emulated pointer");
        return Box::new(EmulatedPointer::new());
    }
    match probe_native_links(scratch) {
        Ok(true) => {
            debug!(scratch = %scratch.display(), "native links available");
            Box::new(NativePointer::new())
        }
        Ok(false) => {
            warn!(scratch = %scratch.display(), "links do not read back, using emulated pointer");
            Box::new(EmulatedPointer::new())
        }
        Err(err) => {
            warn!(scratch = %scratch.display(), error = %err, "link probe failed, using emulated pointer");
            Box::new(EmulatedPointer::new())
        }
    }
}

fn probe_native_links(scratch: &Path) -> io::Result<bool> {
    let probe = tempfile::Builder::new()
        .prefix(".cutover-link-probe-")
        .tempdir_in(scratch)?;
    let target = probe.path().join("target");
    let link = probe.path().join("link");
    fs::create_dir(&target)?;
    platform::symlink_dir(&target, &link)?;
    let read_back = fs::read_link(&link)?;
    Ok(read_back == target)
}

/// Absolute, lexically normalized form of `path` without resolving links.
pub(crate) fn normalize(path: &Path) -> io::Result<PathBuf> {
    let absolute: Cow<'_, Path> = path.absolutize()?;
    Ok(absolute.into_owned())
}

/// Resolve a link's raw target relative to the directory holding the link.
pub(crate) fn resolve_link_target(link: &Path, raw: &Path) -> io::Result<PathBuf> {
    if raw.is_absolute() {
        return normalize(raw);
    }
    let base = link.parent().unwrap_or_else(|| Path::new(""));
    normalize(&base.join(raw))
}
