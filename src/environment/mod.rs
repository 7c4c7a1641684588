//! Environment loading.
//!
//! The launcher reads its configuration exclusively from an [`EnvSnapshot`]:
//! the process environment merged with an optional `.env` file. The snapshot
//! is built once at startup by [`EnvLoader`] and handed to everything else by
//! reference, so nothing downstream touches `std::env` again.
//!
//! # Lookup order
//!
//! [`EnvLoader::for_launcher`] checks `<base>/.env` and then
//! `<parent of base>/.env`; the first existing file wins. Values from that
//! file replace values inherited from the process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name looked up in each candidate directory.
pub const ENV_FILE_NAME: &str = ".env";

/// Upper-case proxy variables and the lower-case aliases most HTTP clients read.
const PROXY_ALIASES: [(&str, &str); 3] = [
    ("HTTP_PROXY", "http_proxy"),
    ("HTTPS_PROXY", "https_proxy"),
    ("NO_PROXY", "no_proxy"),
];

/// An immutable view of the environment taken at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Captures the current process environment.
    ///
    /// Entries which are not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();

        EnvSnapshot { vars }
    }

    /// Builds a snapshot from literal key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvSnapshot {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns the value of `key` unless it is missing or empty.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Copies `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY` into their
    /// lower-case counterparts so that child processes pick them up.
    pub fn with_proxy_aliases(mut self) -> Self {
        for (upper, lower) in PROXY_ALIASES {
            if let Some(value) = self.get_non_empty(upper).map(str::to_owned) {
                tracing::info!("Propagating {} to {}: {}", upper, lower, value);
                self.vars.insert(lower.to_owned(), value);
            }
        }

        self
    }

    fn merge(&mut self, key: String, value: String, override_existing: bool) {
        if override_existing || !self.vars.contains_key(&key) {
            self.vars.insert(key, value);
        }
    }
}

/// Result of [`EnvLoader::load`].
#[derive(Debug)]
pub struct EnvLoad {
    pub snapshot: EnvSnapshot,
    /// The `.env` file which was applied, if any.
    pub env_file: Option<PathBuf>,
    /// Number of lines which could not be parsed and were ignored.
    pub skipped_lines: usize,
}

/// Locates and applies an optional `.env` file on top of an environment.
#[derive(Clone, Debug, Default)]
pub struct EnvLoader {
    candidates: Vec<PathBuf>,
    override_existing: bool,
}

impl EnvLoader {
    /// Creates a loader without candidate files which keeps existing values.
    pub fn new() -> Self {
        Self::default()
    }

    /// The launcher setup: `<base>/.env`, then `<parent>/.env`, file values win.
    pub fn for_launcher(base_dir: &Path) -> Self {
        let mut loader = EnvLoader::new()
            .with_candidate(base_dir.join(ENV_FILE_NAME))
            .override_existing(true);

        if let Some(parent) = base_dir.parent() {
            loader = loader.with_candidate(parent.join(ENV_FILE_NAME));
        }

        loader
    }

    pub fn with_candidate(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates.push(path.into());
        self
    }

    pub fn override_existing(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Returns the first candidate which exists on disk.
    pub fn locate(&self) -> Option<&Path> {
        self.candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .map(PathBuf::as_path)
    }

    /// Applies the located file on top of the process environment.
    pub fn load(&self) -> EnvLoad {
        self.load_into(EnvSnapshot::from_process())
    }

    /// Applies the located file on top of `base`.
    ///
    /// A missing or unreadable file is never an error: the launcher then
    /// simply runs on the ambient environment.
    pub fn load_into(&self, mut base: EnvSnapshot) -> EnvLoad {
        let Some(path) = self.locate() else {
            tracing::warn!(
                "No .env file found (looked at {:?}). Using the process environment only.",
                self.candidates
            );
            return EnvLoad {
                snapshot: base,
                env_file: None,
                skipped_lines: 0,
            };
        };

        tracing::info!("Loading environment from {}", path.display());

        let entries = match dotenvy::from_path_iter(path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("Failed to open {}: {}", path.display(), err);
                return EnvLoad {
                    snapshot: base,
                    env_file: None,
                    skipped_lines: 0,
                };
            }
        };

        let mut applied = 0;
        let mut skipped_lines = 0;
        for entry in entries {
            match entry {
                Ok((key, value)) => {
                    base.merge(key, value, self.override_existing);
                    applied += 1;
                }
                Err(dotenvy::Error::Io(err)) => {
                    tracing::warn!("Stopped reading {}: {}", path.display(), err);
                    break;
                }
                Err(err) => {
                    tracing::warn!("Ignoring malformed line in {}: {}", path.display(), err);
                    skipped_lines += 1;
                }
            }
        }

        tracing::debug!(
            "Applied {} entries from {} (override existing: {})",
            applied,
            path.display(),
            self.override_existing
        );

        EnvLoad {
            snapshot: base,
            env_file: Some(path.to_path_buf()),
            skipped_lines,
        }
    }
}
