use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tracing::debug;

use pincer_normalize::PackageName;
use pincer_pep440::Version;
use pincer_pep508::Requirement;

use crate::specifier::filter_versions;
use crate::{
    BestMatch, InstallRequirement, NoCandidateFound, PlatformFilter, Repository, RepositoryError,
};

const DEFAULT_INDEX_URL: &str = "https://fake.index.invalid/simple";

/// The dependencies of one release, keyed by extra. Unconditional dependencies are stored
/// under the empty string.
type Release = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct IndexDocument {
    #[serde(default)]
    index_urls: Vec<String>,
    #[serde(default)]
    packages: BTreeMap<PackageName, BTreeMap<Version, Release>>,
    /// Dependencies of editable and direct-URL requirements, keyed by URL.
    #[serde(default)]
    links: BTreeMap<String, Vec<String>>,
    /// Hashes keyed by `name==version`.
    #[serde(default)]
    hashes: BTreeMap<String, BTreeSet<String>>,
}

/// A [`Repository`] backed by a fixed table of packages, versions and dependencies.
///
/// ```json
/// {
///   "packages": {
///     "flask": { "0.10.1": { "": ["Jinja2>=2.4", "Werkzeug>=0.7"] } },
///     "ipython": { "2.1.0": { "": ["gnureadline"], "nbconvert": ["pygments"] } }
///   },
///   "links": { "file:///src/app": ["flask"] },
///   "hashes": { "flask==0.10.1": ["sha256:..."] }
/// }
/// ```
#[derive(Debug, Default)]
pub struct StaticRepository {
    index: IndexDocument,
    platform_filter: PlatformFilter,
    dependency_queries: AtomicUsize,
}

impl StaticRepository {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            index: serde_json::from_str(json)?,
            ..Self::default()
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let content = fs_err::read_to_string(path)?;
        Self::from_json(&content).map_err(|err| RepositoryError::Metadata {
            package: path.display().to_string(),
            err: Box::new(err),
        })
    }

    /// How many times dependencies were requested, for checking cache effectiveness.
    pub fn dependency_queries(&self) -> usize {
        self.dependency_queries.load(Ordering::Relaxed)
    }

    fn versions(&self, name: &PackageName) -> Option<&BTreeMap<Version, Release>> {
        self.index.packages.get(name)
    }

    fn parse_all(
        package: &str,
        dependencies: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Vec<Requirement>, RepositoryError> {
        dependencies
            .into_iter()
            .map(|dependency| {
                Requirement::from_str(dependency.as_ref()).map_err(|err| {
                    RepositoryError::Metadata {
                        package: package.to_string(),
                        err: Box::new(err),
                    }
                })
            })
            .collect()
    }
}

impl Repository for StaticRepository {
    async fn find_best_match(
        &self,
        ireq: &InstallRequirement,
        prereleases: bool,
    ) -> Result<BestMatch, RepositoryError> {
        if ireq.is_direct() {
            return Ok(BestMatch::Found(ireq.clone()));
        }

        let candidates: Vec<&Version> = self
            .versions(&ireq.name)
            .map(|versions| versions.keys().collect())
            .unwrap_or_default();
        let filtered = filter_versions(candidates.iter().copied(), &ireq.specifier, prereleases);

        let Some(best) = filtered.best() else {
            return Ok(BestMatch::NotFound(NoCandidateFound {
                ireq: ireq.clone(),
                tried: candidates.into_iter().cloned().collect(),
                index_urls: self.index_urls(),
                prereleases: prereleases || ireq.specifier.any_prerelease(),
            }));
        };
        if filtered.prerelease_fallback {
            debug!("Only pre-releases of {} match {}", ireq.name, ireq.format_specifier());
        }
        Ok(BestMatch::Found(ireq.pin(best.clone())))
    }

    async fn get_dependencies(
        &self,
        ireq: &InstallRequirement,
    ) -> Result<Vec<Requirement>, RepositoryError> {
        self.dependency_queries.fetch_add(1, Ordering::Relaxed);

        if let Some(link) = &ireq.link {
            let dependencies = self
                .index
                .links
                .get(link.raw().as_str())
                .ok_or_else(|| RepositoryError::RequiresBuild(ireq.format_requirement()))?;
            return Self::parse_all(&ireq.format_requirement(), dependencies);
        }

        let Some(version) = ireq.pinned_version() else {
            return Err(RepositoryError::NotPinned(ireq.to_string()));
        };
        let release = self
            .versions(&ireq.name)
            .and_then(|versions| versions.get(version))
            .ok_or_else(|| RepositoryError::UnknownPackage(ireq.format_requirement()))?;

        let mut dependencies = Vec::new();
        dependencies.extend(release.get("").into_iter().flatten());
        for extra in &ireq.extras {
            match release.get(extra.as_ref()) {
                Some(extra_dependencies) => dependencies.extend(extra_dependencies),
                None => debug!("{} does not provide the extra `{extra}`", ireq.format_requirement()),
            }
        }
        Self::parse_all(&ireq.format_requirement(), dependencies)
    }

    async fn get_hashes(
        &self,
        ireq: &InstallRequirement,
    ) -> Result<BTreeSet<String>, RepositoryError> {
        if ireq.is_direct() {
            return Ok(BTreeSet::new());
        }
        let Some(version) = ireq.pinned_version() else {
            return Err(RepositoryError::NotPinned(ireq.to_string()));
        };
        Ok(self
            .index
            .hashes
            .get(&format!("{}=={version}", ireq.name))
            .cloned()
            .unwrap_or_default())
    }

    fn index_urls(&self) -> Vec<String> {
        if self.index.index_urls.is_empty() {
            vec![DEFAULT_INDEX_URL.to_string()]
        } else {
            self.index.index_urls.clone()
        }
    }

    fn platform_filter(&self) -> &PlatformFilter {
        &self.platform_filter
    }

    fn clear_caches(&self) {
        // Nothing is memoized.
    }
}
