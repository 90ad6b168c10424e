//! ---
//! cutover_section: "04-core"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Release resolution from local directories and archives."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
use std::borrow::Cow;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use path_absolutize::Absolutize;
use tracing::{debug, info};
use url::Url;

use crate::error::InstallError;

/// Turns a release specification into an unpacked instance directory.
pub trait ReleaseResolver {
    /// `source` is what the operator supplied, if anything. Returns
    /// [`InstallError::UnpackDisabled`] when unpacking has been switched off.
    fn resolve(&self, source: Option<&str>) -> Result<PathBuf, InstallError>;
}

/// Classification of a user-supplied path or URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalInput {
    File(PathBuf),
    Directory(PathBuf),
    Remote(Url),
    Missing(PathBuf),
}

impl LocalInput {
    pub fn kind(&self) -> &'static str {
        match self {
            LocalInput::File(_) => "file",
            LocalInput::Directory(_) => "directory",
            LocalInput::Remote(_) => "url",
            LocalInput::Missing(_) => "missing",
        }
    }
}

/// Classify `input` without fetching anything. `file://` URLs are mapped to
/// paths; single-letter schemes are treated as drive letters.
pub fn resolve_local_input(input: &str) -> Result<LocalInput, InstallError> {
    let path = match Url::parse(input) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|()| InstallError::Release(format!("not a local file URL: {input}")))?,
        Ok(url) if url.scheme().len() > 1 => return Ok(LocalInput::Remote(url)),
        _ => PathBuf::from(input),
    };
    let absolute = absolutize(&path)?;
    Ok(if absolute.is_file() {
        LocalInput::File(absolute)
    } else if absolute.is_dir() {
        LocalInput::Directory(absolute)
    } else {
        LocalInput::Missing(absolute)
    })
}

fn absolutize(path: &Path) -> Result<PathBuf, InstallError> {
    let absolute: Cow<'_, Path> = path
        .absolutize()
        .map_err(|source| InstallError::io(format!("unable to resolve {}", path.display()), source))?;
    Ok(absolute.into_owned())
}

/// Resolves directories in place and extracts local `.zip` releases.
#[derive(Debug, Clone)]
pub struct LocalReleaseResolver {
    unzip_dir: PathBuf,
    skip_unzip: bool,
}

impl LocalReleaseResolver {
    pub fn new(unzip_dir: impl Into<PathBuf>, skip_unzip: bool) -> Self {
        Self {
            unzip_dir: unzip_dir.into(),
            skip_unzip,
        }
    }

    fn extract(&self, archive: &Path) -> Result<PathBuf, InstallError> {
        let stem = archive
            .file_stem()
            .ok_or_else(|| InstallError::Release(format!("{} has no file name", archive.display())))?;
        let destination = absolutize(&self.unzip_dir)?.join(stem);
        if destination.is_dir() {
            info!(release = %destination.display(), "release already unpacked");
            return Ok(destination);
        }

        let archive_err = |source| InstallError::Archive {
            path: archive.to_path_buf(),
            source,
        };
        let file = File::open(archive)
            .map_err(|source| InstallError::io(format!("unable to open {}", archive.display()), source))?;
        let mut zip = zip::ZipArchive::new(file).map_err(archive_err)?;

        let foreign: Vec<&str> = zip
            .file_names()
            .filter(|name| !in_top_level_dir(name, stem))
            .collect();
        if !foreign.is_empty() {
            return Err(InstallError::Release(format!(
                "{} does not unpack into a single {} directory (found {})",
                archive.display(),
                stem.to_string_lossy(),
                foreign.join(", ")
            )));
        }

        fs::create_dir_all(&self.unzip_dir).map_err(|source| {
            InstallError::io(format!("unable to create {}", self.unzip_dir.display()), source)
        })?;
        info!(archive = %archive.display(), destination = %self.unzip_dir.display(), "unzipping release");
        zip.extract(&self.unzip_dir).map_err(archive_err)?;
        Ok(destination)
    }
}

fn in_top_level_dir(name: &str, stem: &std::ffi::OsStr) -> bool {
    match Path::new(name).components().next() {
        Some(Component::Normal(first)) => first == stem,
        _ => false,
    }
}

impl ReleaseResolver for LocalReleaseResolver {
    fn resolve(&self, source: Option<&str>) -> Result<PathBuf, InstallError> {
        let Some(source) = source else {
            if self.skip_unzip {
                return Err(InstallError::UnpackDisabled);
            }
            return Err(InstallError::Release(
                "no release given and artifact retrieval is not supported".into(),
            ));
        };

        let resolved = match resolve_local_input(source)? {
            LocalInput::Directory(dir) => dir,
            LocalInput::File(_) if self.skip_unzip => return Err(InstallError::UnpackDisabled),
            LocalInput::File(archive) => self.extract(&archive)?,
            LocalInput::Remote(url) => {
                return Err(InstallError::Release(format!(
                    "remote releases are not fetched: {url}"
                )))
            }
            LocalInput::Missing(path) => {
                return Err(InstallError::Release(format!(
                    "release not found: {}",
                    path.display()
                )))
            }
        };
        debug!(release = %resolved.display(), "release directory resolved");
        Ok(resolved)
    }
}
