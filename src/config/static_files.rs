use crate::environment::EnvSnapshot;
use std::path::{Path, PathBuf};

/// Inserted between `/` and `static/` in the static URL.
pub const CONTEXT_PATH_VARIABLE: &str = "LD_CONTEXT_PATH";

/// Collected files carry a content hash in their name and are served with
/// far-future cache headers; everything else gets a short lifetime.
pub const STATIC_STORAGE: &str = "compressed manifest";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticFiles {
    /// Directories static files are collected from.
    pub source_dirs: Vec<PathBuf>,
    /// URL prefix, always starting and ending with `/`.
    pub url: String,
    /// Directory collected files are served from.
    pub root: PathBuf,
}

impl StaticFiles {
    pub fn resolve(env: &EnvSnapshot, base_dir: &Path) -> StaticFiles {
        StaticFiles {
            source_dirs: vec![
                base_dir.join("bookmarks").join("styles"),
                base_dir.join("bookmarks").join("static"),
            ],
            url: format!("/{}static/", env.get_or(CONTEXT_PATH_VARIABLE, "")),
            root: base_dir.join("static"),
        }
    }

    /// Source directories which do not exist on disk.
    pub fn missing_sources(&self) -> Vec<&Path> {
        self.source_dirs
            .iter()
            .filter(|dir| !dir.exists())
            .map(PathBuf::as_path)
            .collect()
    }

    /// Logs a warning for every missing directory and returns how many there
    /// are, `STATIC_ROOT` included. Collection is expected to have run
    /// separately, so nothing here blocks startup.
    pub fn report_missing_directories(&self) -> usize {
        let missing = self.missing_sources();
        for dir in &missing {
            tracing::warn!("Static source directory does not exist: {}", dir.display());
        }

        let root_missing = !self.root.exists();
        if root_missing {
            tracing::warn!(
                "STATIC_ROOT {} does not exist. Static files will not be served.",
                self.root.display()
            );
        } else {
            tracing::info!("Serving static files from {}", self.root.display());
        }

        missing.len() + usize::from(root_missing)
    }
}

#[cfg(test)]
mod tests {
    use super::StaticFiles;
    use crate::environment::EnvSnapshot;
    use std::path::Path;

    #[test]
    fn url_includes_context_path() {
        let base = Path::new("/srv/linkding");

        let plain = StaticFiles::resolve(&EnvSnapshot::default(), base);
        let context_env = EnvSnapshot::from_pairs([("LD_CONTEXT_PATH", "linkding/")]);
        let nested = StaticFiles::resolve(&context_env, base);

        assert_eq!(plain.url, "/static/");
        assert_eq!(nested.url, "/linkding/static/");
    }

    #[test]
    fn directories_are_relative_to_base() {
        let files = StaticFiles::resolve(&EnvSnapshot::default(), Path::new("/srv/linkding"));

        assert_eq!(
            files.source_dirs,
            vec![
                Path::new("/srv/linkding/bookmarks/styles").to_path_buf(),
                Path::new("/srv/linkding/bookmarks/static").to_path_buf(),
            ]
        );
        assert_eq!(files.root, Path::new("/srv/linkding/static"));
    }

    #[test]
    fn missing_sources_lists_absent_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bookmarks/styles")).unwrap();

        let files = StaticFiles::resolve(&EnvSnapshot::default(), dir.path());

        assert_eq!(
            files.missing_sources(),
            vec![dir.path().join("bookmarks/static").as_path()]
        );
    }

    #[test]
    fn missing_directories_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let files = StaticFiles::resolve(&EnvSnapshot::default(), dir.path());

        assert_eq!(files.report_missing_directories(), 3);

        std::fs::create_dir_all(dir.path().join("bookmarks/static")).unwrap();
        std::fs::create_dir_all(dir.path().join("static")).unwrap();

        assert_eq!(files.report_missing_directories(), 1);
    }
}
