//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Zip archiving of the previous instance's log directory."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::fs::File;
use std::io;
use std::path::{Component, Path};

use tracing::{debug, info};
use walkdir::WalkDir;
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::InstallError;

/// Zip `<previous>/var/log` into `archive`, replacing any existing file.
/// Entry names are relative to `var`, so they all start with `log/`.
/// Returns the number of files written.
pub fn archive_logs(previous_pointer: &Path, archive: &Path) -> Result<usize, InstallError> {
    let base = previous_pointer.join("var");
    let logs = base.join("log");
    info!(logs = %logs.display(), archive = %archive.display(), "archiving logs");
    write_archive(&base, &logs, archive).map_err(|source| InstallError::Archive {
        path: archive.to_path_buf(),
        source,
    })
}

fn write_archive(base: &Path, root: &Path, archive: &Path) -> ZipResult<usize> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("log directory {} not found", root.display()),
        )
        .into());
    }
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(File::create(archive)?);
    let mut files = 0;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let name = entry_name(relative);
        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else if entry.file_type().is_file() {
            debug!(entry = %name, "adding log file");
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut zip)?;
            files += 1;
        }
    }
    zip.finish()?;
    Ok(files)
}

/// Forward-slash entry name regardless of host separator.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
