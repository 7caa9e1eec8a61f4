use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, trace};
use url::Url;

use pincer_normalize::PackageName;
use pincer_pep440::{Version, VersionSpecifiers};
use pincer_pep508::Requirement;
use pincer_resolver::specifier::filter_versions;
use pincer_resolver::{
    BestMatch, InstallRequirement, NoCandidateFound, PlatformFilter, Repository, RepositoryError,
};
use pincer_warnings::{warn_user, warn_user_once};

use crate::json::{File, ProjectJson, ReleaseJson};
use crate::pyproject::{StaticMetadata, is_project_directory};
use crate::{ClientError, Platform};

/// The index pip uses when none is configured.
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";

/// A builder for a [`PypiRepository`].
#[derive(Debug, Clone)]
pub struct PypiRepositoryBuilder {
    index_url: Option<Url>,
    extra_index_urls: Vec<Url>,
    retries: u32,
    timeout: Duration,
    platform: Platform,
    python_version: Option<Version>,
}

impl Default for PypiRepositoryBuilder {
    fn default() -> Self {
        Self {
            index_url: None,
            extra_index_urls: Vec::new(),
            retries: 3,
            timeout: Duration::from_secs(30),
            platform: Platform::current(),
            python_version: None,
        }
    }
}

impl PypiRepositoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The primary index, `https://pypi.org/simple` by default.
    #[must_use]
    pub fn index_url(mut self, index_url: Url) -> Self {
        self.index_url = Some(index_url);
        self
    }

    /// Indexes consulted after the primary one, in order.
    #[must_use]
    pub fn extra_index_urls(mut self, extra_index_urls: impl IntoIterator<Item = Url>) -> Self {
        self.extra_index_urls.extend(extra_index_urls);
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The platform whose wheels are acceptable while the platform filter is active.
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Skip distributions whose `Requires-Python` excludes this version.
    #[must_use]
    pub fn python_version(mut self, python_version: Version) -> Self {
        self.python_version = Some(python_version);
        self
    }

    pub fn build(self) -> Result<PypiRepository, ClientError> {
        let index_url = match self.index_url {
            Some(index_url) => index_url,
            None => Url::parse(DEFAULT_INDEX_URL)?,
        };

        let client_raw = reqwest::ClientBuilder::new()
            .user_agent(format!("pincer/{}", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(20)
            .timeout(self.timeout)
            .build()
            .map_err(ClientError::ClientBuild)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.retries);
        let retry_strategy = RetryTransientMiddleware::new_with_policy(retry_policy);
        let client = reqwest_middleware::ClientBuilder::new(client_raw)
            .with(retry_strategy)
            .build();

        Ok(PypiRepository {
            index_urls: std::iter::once(index_url)
                .chain(self.extra_index_urls)
                .collect(),
            client,
            platform: self.platform,
            python_version: self.python_version,
            platform_filter: PlatformFilter::default(),
            projects: DashMap::new(),
            releases: DashMap::new(),
        })
    }
}

/// The releases of a project, as listed by the first index that knows it.
#[derive(Debug)]
struct Project {
    index: Url,
    releases: BTreeMap<Version, Release>,
}

#[derive(Debug)]
struct Release {
    /// The version as the index spells it, for building release URLs.
    spelled: String,
    files: Vec<File>,
}

impl Project {
    fn from_json(index: Url, name: &PackageName, json: ProjectJson) -> Self {
        let releases = json
            .releases
            .into_iter()
            .filter_map(|(spelled, files)| match Version::from_str(&spelled) {
                Ok(version) => Some((version, Release { spelled, files })),
                Err(err) => {
                    trace!("Ignoring invalid version `{spelled}` of {name}: {err}");
                    None
                }
            })
            .collect();
        Self { index, releases }
    }
}

/// A [`Repository`] that queries the JSON API of PyPI-compatible indexes.
///
/// Responses are memoized per instance; [`Repository::clear_caches`] drops them.
#[derive(Debug)]
pub struct PypiRepository {
    index_urls: Vec<Url>,
    client: ClientWithMiddleware,
    platform: Platform,
    python_version: Option<Version>,
    platform_filter: PlatformFilter,
    /// `None` when no index has the project.
    projects: DashMap<PackageName, Arc<OnceCell<Option<Arc<Project>>>>>,
    releases: DashMap<(PackageName, Version), Arc<OnceCell<Arc<ReleaseJson>>>>,
}

impl PypiRepository {
    /// The releases of a project, fetched once.
    ///
    /// An index that doesn't know the project, or can't be reached, yields `None`.
    async fn project(&self, name: &PackageName) -> Option<Arc<Project>> {
        let cell = self.projects.entry(name.clone()).or_default().clone();
        cell.get_or_init(|| async {
            match self.fetch_project(name).await {
                Ok(project) => Some(Arc::new(project)),
                Err(err) if err.is_not_found() => {
                    debug!("No index has a project named {name}");
                    None
                }
                Err(err) => {
                    warn_user!("Failed to fetch the releases of `{name}`: {err}");
                    None
                }
            }
        })
        .await
        .clone()
    }

    async fn fetch_project(&self, name: &PackageName) -> Result<Project, ClientError> {
        for index in &self.index_urls {
            let url = api_url(index, &[name.as_str(), "json"])?;
            if let Some(json) = self.get_json::<ProjectJson>(url).await? {
                return Ok(Project::from_json(index.clone(), name, json));
            }
        }
        Err(ClientError::PackageNotFound(name.to_string()))
    }

    /// The metadata of a single release, fetched once.
    async fn release(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Arc<ReleaseJson>, ClientError> {
        let cell = self
            .releases
            .entry((name.clone(), version.clone()))
            .or_default()
            .clone();
        let release = cell
            .get_or_try_init(|| async {
                self.fetch_release(name, version).await.map(Arc::new)
            })
            .await?;
        Ok(release.clone())
    }

    async fn fetch_release(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<ReleaseJson, ClientError> {
        // Ask the index that listed the release, with the version spelled its way.
        let project = self.project(name).await;
        let (indexes, spelled) = match project
            .as_deref()
            .and_then(|project| Some((project, project.releases.get(version)?)))
        {
            Some((project, release)) => (vec![project.index.clone()], release.spelled.clone()),
            None => (self.index_urls.clone(), version.to_string()),
        };

        for index in &indexes {
            let url = api_url(index, &[name.as_str(), &spelled, "json"])?;
            if let Some(json) = self.get_json::<ReleaseJson>(url).await? {
                return Ok(json);
            }
        }
        Err(ClientError::VersionNotFound {
            package: name.to_string(),
            version: spelled,
        })
    }

    /// `GET` a JSON document; `None` on a 404.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, ClientError> {
        trace!("Fetching {url}");
        let response = self.client.get(url.clone()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            trace!("Not found: {url}");
            return Ok(None);
        }
        let bytes = response.error_for_status()?.bytes().await?;
        let json = serde_json::from_slice(&bytes).map_err(|err| ClientError::from_json_err(err, url))?;
        Ok(Some(json))
    }

    /// Whether a file can be used under the current platform filter.
    fn is_acceptable(&self, file: &File) -> bool {
        if file.yanked {
            return false;
        }
        if self.platform_filter.is_unrestricted() {
            return true;
        }
        if let (Some(requires_python), Some(python_version)) =
            (&file.requires_python, &self.python_version)
        {
            match VersionSpecifiers::from_str(requires_python) {
                Ok(specifiers) if !specifiers.contains(python_version) => return false,
                Ok(_) => {}
                Err(err) => trace!("Ignoring invalid `Requires-Python` of {}: {err}", file.filename),
            }
        }
        self.platform.is_compatible_filename(&file.filename)
    }

    /// The versions with at least one acceptable file.
    fn candidates<'a>(&self, project: &'a Project) -> Vec<&'a Version> {
        project
            .releases
            .iter()
            .filter(|(_, release)| release.files.iter().any(|file| self.is_acceptable(file)))
            .map(|(version, _)| version)
            .collect()
    }

    fn parse_requires<'a>(
        ireq: &InstallRequirement,
        requires: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Requirement> {
        requires
            .into_iter()
            .filter_map(|specification| match Requirement::from_str(specification) {
                Ok(requirement) => Some(requirement),
                Err(err) => {
                    warn_user_once!(
                        "Ignoring invalid dependency `{specification}` of {}: {}",
                        ireq.format_requirement(),
                        err.to_string().lines().next().unwrap_or_default()
                    );
                    None
                }
            })
            .collect()
    }
}

impl Repository for PypiRepository {
    #[instrument(skip_all, fields(requirement = %ireq.format_requirement()))]
    async fn find_best_match(
        &self,
        ireq: &InstallRequirement,
        prereleases: bool,
    ) -> Result<BestMatch, RepositoryError> {
        if ireq.is_direct() {
            return Ok(BestMatch::Found(ireq.clone()));
        }

        let project = self.project(&ireq.name).await;
        let candidates = project
            .as_deref()
            .map(|project| self.candidates(project))
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

    #[instrument(skip_all, fields(requirement = %ireq.format_requirement()))]
    async fn get_dependencies(
        &self,
        ireq: &InstallRequirement,
    ) -> Result<Vec<Requirement>, RepositoryError> {
        if let Some(link) = &ireq.link {
            let directory = link
                .to_file_path()
                .filter(|path| path.is_dir())
                .ok_or_else(|| RepositoryError::RequiresBuild(ireq.format_requirement()))?;
            if !is_project_directory(&directory)? {
                return Err(RepositoryError::RequiresBuild(ireq.format_requirement()));
            }
            let metadata = StaticMetadata::read(&directory)?;
            debug!("Read static metadata of {} from `pyproject.toml`", metadata.name);
            return Ok(Self::parse_requires(ireq, metadata.requires(&ireq.extras)));
        }

        let Some(version) = ireq.pinned_version() else {
            return Err(RepositoryError::NotPinned(ireq.to_string()));
        };
        let release = self.release(&ireq.name, version).await?;
        let requires = release
            .info
            .requires_dist
            .iter()
            .flatten()
            .map(String::as_str);
        Ok(Self::parse_requires(ireq, requires))
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
        let release = self
            .project(&ireq.name)
            .await
            .and_then(|project| {
                project
                    .releases
                    .get(version)
                    .map(|release| {
                        release
                            .files
                            .iter()
                            .filter(|file| self.is_acceptable(file))
                            .filter_map(|file| file.digests.sha256.as_ref())
                            .map(|digest| format!("sha256:{digest}"))
                            .collect::<BTreeSet<_>>()
                    })
            })
            .ok_or_else(|| RepositoryError::UnknownPackage(ireq.format_requirement()))?;
        Ok(release)
    }

    fn index_urls(&self) -> Vec<String> {
        self.index_urls.iter().map(ToString::to_string).collect()
    }

    fn platform_filter(&self) -> &PlatformFilter {
        &self.platform_filter
    }

    fn clear_caches(&self) {
        self.projects.clear();
        self.releases.clear();
    }
}

/// The JSON API URL of a project or release on `index`.
///
/// Indexes are configured by their simple API location, `https://pypi.org/simple`; the JSON
/// API lives beside it, at `https://pypi.org/pypi/<project>/json`.
fn api_url(index: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut base: Vec<&str> = index
        .path_segments()
        .ok_or_else(|| ClientError::CannotBeABase(index.clone()))?
        .filter(|segment| !segment.is_empty())
        .collect();
    if base.last() == Some(&"simple") {
        base.pop();
    }

    let mut url = index.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| ClientError::CannotBeABase(index.clone()))?
        .clear()
        .extend(&base)
        .push("pypi")
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("https://pypi.org/simple", "https://pypi.org/pypi/flask/json")]
    #[test_case("https://pypi.org/simple/", "https://pypi.org/pypi/flask/json")]
    #[test_case("https://mirror.example.org/root/pypi/+simple", "https://mirror.example.org/root/pypi/+simple/pypi/flask/json")]
    #[test_case("http://localhost:8080", "http://localhost:8080/pypi/flask/json")]
    fn project_url(index: &str, expected: &str) {
        let url = api_url(&Url::parse(index).unwrap(), &["flask", "json"]).unwrap();
        assert_eq!(url.as_str(), expected);
    }

    #[test]
    fn release_url() {
        let index = Url::parse("https://pypi.org/simple").unwrap();
        let url = api_url(&index, &["flask", "0.10.1", "json"]).unwrap();
        assert_eq!(url.as_str(), "https://pypi.org/pypi/flask/0.10.1/json");
    }
}
