//! ---
//! cutover_section: "03-pointer"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Platform link primitives behind the pointer variants."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;

#[cfg(unix)]
pub(crate) fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn symlink_dir(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

/// Link call used when the standard primitive is refused. On Windows this is
/// a directory junction created through the shell.
#[cfg(windows)]
pub(crate) fn fallback_link(target: &Path, link: &Path) -> io::Result<()> {
    let status = std::process::Command::new("cmd")
        .arg("/C")
        .arg("mklink")
        .arg("/J")
        .arg(link)
        .arg(target)
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("mklink exited with {status}"),
        ))
    }
}

#[cfg(not(windows))]
pub(crate) fn fallback_link(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no fallback link call on this platform",
    ))
}

/// Whether the pointer object itself must be removed as a directory.
#[cfg(unix)]
pub(crate) fn is_directory_like(meta: &Metadata) -> bool {
    meta.is_dir()
}

#[cfg(windows)]
pub(crate) fn is_directory_like(meta: &Metadata) -> bool {
    use std::os::windows::fs::FileTypeExt;
    meta.is_dir() || meta.file_type().is_symlink_dir()
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn is_directory_like(meta: &Metadata) -> bool {
    meta.is_dir()
}

#[cfg(unix)]
pub(crate) fn file_identity(path: &Path) -> io::Result<Option<(u64, u64)>> {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(path)?;
    Ok(Some((meta.dev(), meta.ino())))
}

#[cfg(not(unix))]
pub(crate) fn file_identity(path: &Path) -> io::Result<Option<(u64, u64)>> {
    fs::metadata(path)?;
    Ok(None)
}
