use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use pincer_fs::Simplified;
use pincer_normalize::PackageName;
use pincer_pep508::Requirement;

use crate::InstallRequirement;

/// The on-disk format version written to `__format__`.
const CACHE_FORMAT: u64 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(
        "The dependency cache seems to have been corrupted.\nInspect, or delete, the following file:\n  {}",
        path.user_display()
    )]
    Corrupt {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },

    #[error("Failed to access the dependency cache at `{}`", path.user_display())]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    #[error(
        "Unknown dependency cache format {found} in `{}` (expected {})",
        path.user_display(),
        CACHE_FORMAT
    )]
    UnknownFormat { path: PathBuf, found: String },

    #[error("The dependency cache at `{}` has an unexpected structure", path.user_display())]
    Json {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },
}

type Dependencies = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Serialize, Deserialize)]
struct CacheDocument<T> {
    #[serde(rename = "__format__")]
    format: u64,
    dependencies: T,
}

/// A persistent map from a pinned requirement (`name`, `version[extras]`) to the dependency
/// specifications it declares.
///
/// Entries are never invalidated: the stored lists have already been filtered by the markers
/// of one interpreter, so callers keep one cache per interpreter version and remove it to
/// rebuild.
#[derive(Debug)]
pub struct DependencyCache {
    /// Where the cache is persisted, if anywhere.
    path: Option<PathBuf>,
    dependencies: RwLock<Dependencies>,
}

impl DependencyCache {
    /// Load the cache persisted at `path`. A missing file is an empty cache.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let dependencies = match fs_err::read(&path) {
            Ok(content) => Self::parse(&path, &content)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No dependency cache at {}", path.user_display());
                Dependencies::default()
            }
            Err(err) => return Err(CacheError::Io { path, err }),
        };
        Ok(Self {
            path: Some(path),
            dependencies: RwLock::new(dependencies),
        })
    }

    /// A cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            dependencies: RwLock::new(Dependencies::default()),
        }
    }

    fn parse(path: &Path, content: &[u8]) -> Result<Dependencies, CacheError> {
        let document: serde_json::Value =
            serde_json::from_slice(content).map_err(|err| CacheError::Corrupt {
                path: path.to_path_buf(),
                err,
            })?;
        let format = document.get("__format__");
        if format.and_then(serde_json::Value::as_u64) != Some(CACHE_FORMAT) {
            return Err(CacheError::UnknownFormat {
                path: path.to_path_buf(),
                found: format.map_or_else(|| "<missing>".to_string(), ToString::to_string),
            });
        }
        let document: CacheDocument<Dependencies> =
            serde_json::from_value(document).map_err(|err| CacheError::Json {
                path: path.to_path_buf(),
                err,
            })?;
        Ok(document.dependencies)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The cached dependencies of a pinned requirement.
    ///
    /// Editable, direct-URL, constraint and unpinned requirements are never cached.
    pub fn get(&self, ireq: &InstallRequirement) -> Option<Vec<String>> {
        let (name, key) = cache_key(ireq)?;
        let dependencies = self
            .dependencies
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        dependencies.get(&name)?.get(&key).cloned()
    }

    /// Store the dependencies of a pinned requirement, persisting the cache.
    ///
    /// Storing the value already present is a no-op; requirements that can't be cache keys are
    /// ignored.
    pub fn insert(&self, ireq: &InstallRequirement, deps: Vec<String>) -> Result<(), CacheError> {
        let Some((name, key)) = cache_key(ireq) else {
            return Ok(());
        };
        let mut dependencies = self
            .dependencies
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let versions = dependencies.entry(name).or_default();
        if versions.get(&key) == Some(&deps) {
            return Ok(());
        }
        trace!("Caching dependencies of {key}: {deps:?}");
        versions.insert(key, deps);
        self.persist(&dependencies)
    }

    fn persist(&self, dependencies: &Dependencies) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let document = CacheDocument {
            format: CACHE_FORMAT,
            dependencies,
        };
        let content = serde_json::to_vec(&document).map_err(|err| CacheError::Json {
            path: path.clone(),
            err,
        })?;
        pincer_fs::write_atomic_sync(path, content).map_err(|err| CacheError::Io {
            path: path.clone(),
            err,
        })
    }

    /// Remove every entry, and the persisted file.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut dependencies = self
            .dependencies
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        dependencies.clear();
        if let Some(path) = &self.path {
            pincer_fs::remove_file_if_exists(path).map_err(|err| CacheError::Io {
                path: path.clone(),
                err,
            })?;
        }
        Ok(())
    }

    /// The number of cached pins.
    pub fn len(&self) -> usize {
        self.dependencies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// For the given pins, map each dependency name to the names of the pins that require it.
    ///
    /// Only the cache entries of the exact `version[extras]` of each pin are consulted, so a
    /// package pulled in by an extra only appears when that extra was requested.
    pub fn reverse_dependencies<'a>(
        &self,
        ireqs: impl IntoIterator<Item = &'a InstallRequirement>,
    ) -> BTreeMap<PackageName, BTreeSet<PackageName>> {
        let dependencies = self
            .dependencies
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut reverse: BTreeMap<PackageName, BTreeSet<PackageName>> = BTreeMap::new();
        for ireq in ireqs {
            let Some((name, key)) = cache_key(ireq) else {
                continue;
            };
            let Some(deps) = dependencies.get(&name).and_then(|versions| versions.get(&key))
            else {
                continue;
            };
            for dep in deps {
                match Requirement::from_str(dep) {
                    Ok(requirement) => {
                        reverse
                            .entry(requirement.name)
                            .or_default()
                            .insert(ireq.name.clone());
                    }
                    Err(err) => debug!("Ignoring unparsable cached dependency `{dep}`: {err}"),
                }
            }
        }
        reverse
    }
}

/// The cache key of a pinned requirement: its name and `version[extras]`, e.g.
/// `("celery", "4.0.2[redis,sqs]")`.
fn cache_key(ireq: &InstallRequirement) -> Option<(String, String)> {
    if ireq.is_direct() || ireq.constraint {
        return None;
    }
    let version = ireq.pinned_version()?;
    let key = if ireq.extras.is_empty() {
        version.to_string()
    } else {
        let extras: Vec<&str> = ireq.extras.iter().map(AsRef::as_ref).collect();
        format!("{version}[{}]", extras.join(","))
    };
    Some((ireq.name.to_string(), key))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pincer_pep508::Requirement;

    use super::*;

    fn ireq(input: &str) -> InstallRequirement {
        InstallRequirement::from_requirement(Requirement::from_str(input).unwrap(), None)
    }

    #[test]
    fn keys() {
        assert_eq!(
            cache_key(&ireq("Celery[sqs,Redis]==4.0.2")),
            Some(("celery".to_string(), "4.0.2[redis,sqs]".to_string()))
        );
        assert_eq!(cache_key(&ireq("celery>=4")), None);
        assert_eq!(cache_key(&ireq("celery==4.0.2").with_constraint(true)), None);
        assert_eq!(cache_key(&ireq("celery @ file:///src/celery")), None);
    }

    #[test]
    fn in_memory_round_trip() {
        let cache = DependencyCache::in_memory();
        let pin = ireq("flask==0.10.1");
        assert_eq!(cache.get(&pin), None);

        let deps = vec!["itsdangerous>=0.21".to_string(), "jinja2>=2.4".to_string()];
        cache.insert(&pin, deps.clone()).unwrap();
        assert_eq!(cache.get(&pin), Some(deps));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reverse_dependencies_respect_extras() {
        let cache = DependencyCache::in_memory();
        cache
            .insert(&ireq("ipython==2.1.0"), vec!["gnureadline".to_string()])
            .unwrap();
        cache
            .insert(
                &ireq("ipython[nbconvert]==2.1.0"),
                vec!["gnureadline".to_string(), "pygments".to_string()],
            )
            .unwrap();

        let plain = cache.reverse_dependencies(&[ireq("ipython==2.1.0")]);
        let names: Vec<&str> = plain.keys().map(PackageName::as_str).collect();
        assert_eq!(names, ["gnureadline"]);

        let with_extra = cache.reverse_dependencies(&[ireq("ipython[nbconvert]==2.1.0")]);
        let names: Vec<&str> = with_extra.keys().map(PackageName::as_str).collect();
        assert_eq!(names, ["gnureadline", "pygments"]);
        assert_eq!(
            with_extra[&PackageName::from_str("pygments").unwrap()]
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            ["ipython"]
        );
    }
}
