use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{TempDir, tempdir};
use tracing::debug;

use pincer_fs::Simplified;

#[cfg(feature = "clap")]
pub use crate::cli::CacheArgs;

mod cli;

/// The main cache abstraction.
///
/// The cache root holds one dependency cache file per interpreter version, since cached
/// dependency lists have already been filtered by that interpreter's markers.
#[derive(Debug, Clone)]
pub struct Cache {
    /// The cache directory.
    root: PathBuf,
    /// A temporary cache directory, if the user requested `--no-cache`.
    ///
    /// Included to ensure that the temporary directory exists for the length of the operation, but
    /// is dropped at the end as appropriate.
    _temp_dir_drop: Option<Arc<TempDir>>,
}

impl Cache {
    /// A persistent cache directory at `root`.
    pub fn from_path(root: impl Into<PathBuf>) -> Result<Self, io::Error> {
        Ok(Self {
            root: Self::init(root)?,
            _temp_dir_drop: None,
        })
    }

    /// Create a temporary cache directory.
    pub fn temp() -> Result<Self, io::Error> {
        let temp_dir = tempdir()?;
        Ok(Self {
            root: Self::init(temp_dir.path())?,
            _temp_dir_drop: Some(Arc::new(temp_dir)),
        })
    }

    /// Return the root of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if the cache is removed when the process exits.
    pub fn is_temporary(&self) -> bool {
        self._temp_dir_drop.is_some()
    }

    /// The dependency cache file for a `major.minor` interpreter, e.g. `depcache-cp3.12.json`.
    pub fn dependency_cache_path(&self, major: u8, minor: u8) -> PathBuf {
        self.root.join(format!("depcache-cp{major}.{minor}.json"))
    }

    /// Initialize a directory for use as a cache.
    fn init(root: impl Into<PathBuf>) -> Result<PathBuf, io::Error> {
        let root = root.into();

        // Create the cache directory, if it doesn't exist.
        fs_err::create_dir_all(&root)?;

        // Add the CACHEDIR.TAG.
        cachedir::ensure_tag(&root)?;

        // Add the .gitignore.
        match fs_err::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(root.join(".gitignore"))
        {
            Ok(mut file) => file.write_all(b"*")?,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => (),
            Err(err) => return Err(err),
        }

        fs_err::canonicalize(root)
    }

    /// Remove every dependency cache file, keeping the directory markers.
    ///
    /// Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, io::Error> {
        let mut removed = 0;
        for entry in fs_err::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with("depcache-") && file_name.ends_with(".json") {
                if pincer_fs::remove_file_if_exists(entry.path())? {
                    debug!("Removed {}", entry.path().user_display());
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

/// Returns an appropriate user-level directory for storing the cache.
///
/// Corresponds to `$XDG_CACHE_HOME/pincer` on Unix.
pub fn user_cache_dir() -> Option<PathBuf> {
    etcetera::base_strategy::choose_base_strategy()
        .ok()
        .map(|dirs| etcetera::BaseStrategy::cache_dir(&dirs).join("pincer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_markers() {
        let dir = tempdir().unwrap();
        let cache = Cache::from_path(dir.path().join("cache")).unwrap();
        assert!(cache.root().join("CACHEDIR.TAG").is_file());
        assert_eq!(
            fs_err::read_to_string(cache.root().join(".gitignore")).unwrap(),
            "*"
        );
        assert!(!cache.is_temporary());
    }

    #[test]
    fn clear_removes_dependency_caches_only() {
        let cache = Cache::temp().unwrap();
        let path = cache.dependency_cache_path(3, 12);
        assert!(path.ends_with("depcache-cp3.12.json"));
        fs_err::write(&path, "{}").unwrap();
        fs_err::write(cache.dependency_cache_path(3, 8), "{}").unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(!path.exists());
        assert!(cache.root().join("CACHEDIR.TAG").is_file());
        assert_eq!(cache.clear().unwrap(), 0);
    }
}
