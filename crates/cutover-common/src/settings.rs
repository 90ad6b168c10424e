//! ---
//! cutover_section: "01-common"
//! cutover_subsection: "module"
//! cutover_type: "source"
//! cutover_scope: "code"
//! cutover_description: "Layered raw settings with deterministic reference resolution."
//! cutover_version: "v0.0.0-prealpha"
//! cutover_owner: "tbd"
//! ---
//! Raw, string-keyed settings collected from defaults, files, the environment
//! and command-line flags.
//!
//! Values may reference other settings with `${name}`; `$$` produces a literal
//! `$`. [`RawSettings::resolve`] expands every reference exactly once, in key
//! order, and rejects unknown names and reference cycles.

use indexmap::IndexMap;
use thiserror::Error;

/// Prefix applied to upper-cased setting names when reading the environment.
pub const ENV_PREFIX: &str = "CUTOVER_";

/// Built-in defaults, in resolution order.
pub const DEFAULTS: &[(&str, &str)] = &[
    ("prefix", ""),
    ("registry", "${prefix}4061"),
    ("tcp", "${prefix}4063"),
    ("ssl", "${prefix}4064"),
    ("sym", "CURRENT"),
    ("skipweb", "false"),
    ("skipdelete", "false"),
    ("skipdeletezip", "false"),
    ("savevars", "PATH LD_LIBRARY_PATH DYLD_LIBRARY_PATH PYTHONPATH"),
    ("savevarsfile", "${sym}/cutover.envvars"),
    ("admin_binary", "bin/admin"),
    ("config_file", "etc/config.xml"),
    ("unzipdir", "."),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("unknown setting '{0}'")]
    UnknownSetting(String),
    #[error("setting '{key}' references unknown setting '{reference}'")]
    UnknownReference { key: String, reference: String },
    #[error("cyclic setting reference: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("setting '{key}' has an unterminated reference in '{value}'")]
    Unterminated { key: String, value: String },
    #[error("setting '{key}' is not a valid {expected}: '{value}'")]
    Invalid {
        key: String,
        expected: &'static str,
        value: String,
    },
    #[error("setting '{0}' is missing")]
    Missing(String),
}

/// Ordered collection of unresolved setting values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSettings {
    values: IndexMap<String, String>,
}

impl RawSettings {
    /// Settings populated with the built-in defaults.
    pub fn defaults() -> Self {
        let values = DEFAULTS
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Override a known setting. Unknown names are rejected.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), SettingsError> {
        match self.values.get_mut(key) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(SettingsError::UnknownSetting(key.to_owned())),
        }
    }

    /// Apply `CUTOVER_<NAME>` overrides for every known setting.
    pub fn apply_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in vars {
            let Some(stripped) = name.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = stripped.to_ascii_lowercase();
            if let Some(slot) = self.values.get_mut(&key) {
                *slot = value.into();
            }
        }
    }

    /// Expand `${name}` references across all settings.
    pub fn resolve(&self) -> Result<IndexMap<String, String>, SettingsError> {
        let mut resolved = IndexMap::with_capacity(self.values.len());
        for key in self.values.keys() {
            let mut stack = Vec::new();
            self.resolve_key(key, &mut resolved, &mut stack)?;
        }
        // Present results in declaration order rather than completion order.
        let ordered = self
            .values
            .keys()
            .filter_map(|key| resolved.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        Ok(ordered)
    }

    fn resolve_key(
        &self,
        key: &str,
        resolved: &mut IndexMap<String, String>,
        stack: &mut Vec<String>,
    ) -> Result<String, SettingsError> {
        if let Some(done) = resolved.get(key) {
            return Ok(done.clone());
        }
        if let Some(start) = stack.iter().position(|seen| seen == key) {
            let mut chain = stack[start..].to_vec();
            chain.push(key.to_owned());
            return Err(SettingsError::Cycle(chain));
        }
        let raw = self
            .values
            .get(key)
            .ok_or_else(|| SettingsError::Missing(key.to_owned()))?;

        stack.push(key.to_owned());
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw.as_str();
        while let Some(idx) = rest.find('$') {
            out.push_str(&rest[..idx]);
            let tail = &rest[idx + 1..];
            if let Some(after) = tail.strip_prefix('$') {
                out.push('$');
                rest = after;
                continue;
            }
            let Some(body) = tail.strip_prefix('{') else {
                out.push('$');
                rest = tail;
                continue;
            };
            let end = body.find('}').ok_or_else(|| SettingsError::Unterminated {
                key: key.to_owned(),
                value: raw.clone(),
            })?;
            let reference = &body[..end];
            if !self.values.contains_key(reference) {
                return Err(SettingsError::UnknownReference {
                    key: key.to_owned(),
                    reference: reference.to_owned(),
                });
            }
            let value = self.resolve_key(reference, resolved, stack)?;
            out.push_str(&value);
            rest = &body[end + 1..];
        }
        out.push_str(rest);
        stack.pop();

        resolved.insert(key.to_owned(), out.clone());
        Ok(out)
    }
}
