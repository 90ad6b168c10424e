//! ---
//! cutover_section: "01-common"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Version metadata for banners and --version output."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---

/// Build metadata for the running tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub semver: String,
    pub package: String,
    /// Cargo profile used during compilation.
    pub profile: String,
}

impl VersionInfo {
    #[must_use]
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION").to_owned(),
            package: env!("CARGO_PKG_NAME").to_owned(),
            profile: if cfg!(debug_assertions) {
                "debug".to_owned()
            } else {
                "release".to_owned()
            },
        }
    }

    /// Human readable banner used in logging surfaces.
    #[must_use]
    pub fn banner(&self) -> String {
        format!("Cutover v{}", self.semver)
    }

    /// Extended string suitable for `--version` flags.
    #[must_use]
    pub fn extended(&self) -> String {
        format!(
            "{banner}\nPackage: {package}\nProfile: {profile}",
            banner = self.banner(),
            package = self.package,
            profile = self.profile
        )
    }
}
